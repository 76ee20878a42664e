//! Device registration endpoints
//!
//! - `POST /register` - register or update a device (authenticated)
//! - `POST /register-initial` - unauthenticated bootstrap registration
//! - `GET /devices` - list the caller's devices
//! - `POST /devices/{id}/trust` - approve a pending device
//! - `DELETE /devices/{id}` - revoke a device

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{require_session, ApiState};
use crate::auth::SessionContext;
use crate::hub::AuthEvent;
use crate::registry::{Device, NewDevice, TrustState};
use crate::{Error, Result};

/// Build the devices router
pub fn router(state: Arc<ApiState>) -> Router {
    let protected = Router::new()
        .route("/register", post(register))
        .route("/devices", get(list_devices))
        .route("/devices/{device_id}/trust", post(trust_device))
        .route("/devices/{device_id}", delete(revoke_device))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ))
        .with_state(state.clone());

    let open = Router::new()
        .route("/register-initial", post(register_initial))
        .with_state(state);

    protected.merge(open)
}

// === Request/Response types ===

/// Registration request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterBody {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub device_type: Option<String>,
    pub public_key: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Bootstrap only: the owner the device claims for itself
    pub user_id: Option<String>,
}

impl RegisterBody {
    fn into_new_device(self) -> (NewDevice, Option<String>) {
        let device = NewDevice {
            id: self.device_id.unwrap_or_default(),
            name: self.device_name.unwrap_or_default(),
            device_type: self.device_type.unwrap_or_default(),
            public_key: self.public_key.unwrap_or_default(),
            metadata: self.metadata,
        };
        (device, self.user_id)
    }
}

/// Registration response
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub device_id: String,
    pub message: String,
    pub requires_trust: bool,
}

/// Device info as exposed over the API
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub name: String,
    pub device_type: String,
    pub public_key: String,
    pub metadata: serde_json::Value,
    pub trust_state: TrustState,
    pub registered_at: String,
    pub last_seen_at: String,
}

impl From<Device> for DeviceInfo {
    fn from(d: Device) -> Self {
        Self {
            device_id: d.id,
            name: d.name,
            device_type: d.device_type,
            public_key: d.public_key,
            metadata: d.metadata,
            trust_state: d.trust_state,
            registered_at: d.registered_at.to_rfc3339(),
            last_seen_at: d.last_seen_at.to_rfc3339(),
        }
    }
}

/// Device list response
#[derive(Debug, Serialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceInfo>,
    pub total: usize,
}

// === Handlers ===

/// Register a device for the authenticated user
async fn register(
    State(state): State<Arc<ApiState>>,
    Extension(session): Extension<SessionContext>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<RegisterResponse>> {
    let (device, _) = body.into_new_device();
    let response = register_device(&state, &session.user_id, &device).await?;
    Ok(Json(response))
}

/// Bootstrap registration for a device with no session yet.
///
/// Ownership is self-assigned from the payload; a payload without a
/// `userId` makes the device its own owner until it is claimed.
async fn register_initial(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<RegisterResponse>> {
    let (device, user_id) = body.into_new_device();
    let owner = user_id.unwrap_or_else(|| device.id.clone());
    let response = register_device(&state, &owner, &device).await?;
    Ok(Json(response))
}

async fn register_device(
    state: &ApiState,
    owner: &str,
    device: &NewDevice,
) -> Result<RegisterResponse> {
    let registration = state.registry.register(owner, device)?;

    if !registration.updated {
        state
            .hub
            .broadcast_to_user(&AuthEvent::device_added(&device.id, owner, &device.name))
            .await;
    }

    Ok(RegisterResponse {
        device_id: registration.device_id,
        message: if registration.updated {
            "updated".to_string()
        } else {
            "registered".to_string()
        },
        requires_trust: registration.requires_trust,
    })
}

/// List the authenticated user's devices
async fn list_devices(
    State(state): State<Arc<ApiState>>,
    Extension(session): Extension<SessionContext>,
) -> Result<Json<DeviceListResponse>> {
    let devices: Vec<DeviceInfo> = state
        .registry
        .list(&session.user_id)?
        .into_iter()
        .map(Into::into)
        .collect();

    Ok(Json(DeviceListResponse {
        total: devices.len(),
        devices,
    }))
}

/// Approve a pending device owned by the caller
async fn trust_device(
    State(state): State<Arc<ApiState>>,
    Extension(session): Extension<SessionContext>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    owned_device(&state, &device_id, &session.user_id)?;
    state.registry.mark_trusted(&device_id)?;

    Ok(Json(serde_json::json!({
        "success": true,
        "deviceId": device_id,
        "trustState": TrustState::Trusted,
    })))
}

/// Revoke a device owned by the caller
async fn revoke_device(
    State(state): State<Arc<ApiState>>,
    Extension(session): Extension<SessionContext>,
    Path(device_id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    owned_device(&state, &device_id, &session.user_id)?;
    state.registry.remove(&device_id)?;

    state
        .hub
        .broadcast_to_user(&AuthEvent::device_removed(
            &device_id,
            &session.user_id,
            "revoked",
        ))
        .await;

    Ok(Json(serde_json::json!({
        "success": true,
        "deviceId": device_id,
    })))
}

/// Devices of other owners are indistinguishable from unknown ones
fn owned_device(state: &ApiState, device_id: &str, user_id: &str) -> Result<Device> {
    state
        .registry
        .get(device_id)?
        .filter(|d| d.owner_user_id == user_id)
        .ok_or_else(|| Error::DeviceNotFound(device_id.to_string()))
}
