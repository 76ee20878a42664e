//! Proximity reporting endpoint
//!
//! `POST /proximity` - classify an RSSI sample for one of the caller's
//! devices and broadcast the result to the user's channel.

use std::sync::Arc;

use axum::{extract::State, routing::post, Extension, Json, Router};
use serde::Deserialize;

use super::{require_session, ApiState};
use crate::auth::SessionContext;
use crate::hub::AuthEvent;
use crate::proximity::ProximityStatus;
use crate::{Error, Result};

/// Build the proximity router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/proximity", post(report_proximity))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityBody {
    pub device_id: Option<String>,
    pub rssi: Option<i32>,
}

async fn report_proximity(
    State(state): State<Arc<ApiState>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<ProximityBody>,
) -> Result<Json<ProximityStatus>> {
    let device_id = body
        .device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Validation("missing required field: deviceId".to_string()))?;
    let rssi = body
        .rssi
        .ok_or_else(|| Error::Validation("missing required field: rssi".to_string()))?;

    let device = state
        .registry
        .get(&device_id)?
        .filter(|d| d.owner_user_id == session.user_id)
        .ok_or_else(|| Error::DeviceNotFound(device_id.clone()))?;

    let status = state
        .proximity
        .update(
            &device.id,
            &session.user_id,
            rssi,
            Some(session.session_id.clone()),
        )
        .await?;

    state
        .hub
        .broadcast_to_user(&AuthEvent::proximity_changed(
            &device.id,
            &session.user_id,
            rssi,
            &status,
        ))
        .await;

    Ok(Json(status))
}
