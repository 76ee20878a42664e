//! Challenge/response pairing endpoints
//!
//! - `POST /challenge` - issue a challenge for a registered device
//! - `POST /verify` - submit the signed challenge, receive a session token

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ApiState;
use crate::auth::{verify_challenge_signature, SESSION_TTL_SECS};
use crate::{Error, Result};

/// Build the pairing router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/challenge", post(issue_challenge))
        .route("/verify", post(verify))
        .with_state(state)
}

// === Request/Response types ===

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBody {
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeResponse {
    pub challenge_id: String,

    /// The nonce the device must sign
    pub challenge: String,

    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyBody {
    pub challenge_id: Option<String>,
    pub signature: Option<String>,

    /// Optional initial RSSI sample submitted alongside verification
    pub proximity: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub token: String,
    pub expires_in: i64,
    pub device_id: String,
    pub user_id: String,
}

// === Handlers ===

/// Issue a time-boxed challenge for a registered device
async fn issue_challenge(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<ChallengeBody>,
) -> Result<Json<ChallengeResponse>> {
    let device_id = body
        .device_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Validation("missing required field: deviceId".to_string()))?;

    let issued = state.challenges.issue(&device_id)?;

    Ok(Json(ChallengeResponse {
        challenge_id: issued.id,
        challenge: issued.nonce,
        expires_at: issued.expires_at,
    }))
}

/// Verify a signed challenge and mint a session.
///
/// Consumption happens before signature verification, so a bad signature
/// still burns the challenge.
async fn verify(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<VerifyResponse>> {
    let challenge_id = body
        .challenge_id
        .ok_or_else(|| Error::Validation("missing required field: challengeId".to_string()))?;
    let signature = body
        .signature
        .ok_or_else(|| Error::Validation("missing required field: signature".to_string()))?;

    let consumed = state.challenges.consume(&challenge_id)?;
    let device = state
        .registry
        .get(&consumed.device_id)?
        .ok_or_else(|| Error::DeviceNotFound(consumed.device_id.clone()))?;

    verify_challenge_signature(&device.public_key, &consumed.nonce, &signature)?;

    let session = state.sessions.issue(&device.id, &device.owner_user_id)?;
    state.registry.touch(&device.id)?;

    // Best-effort initial proximity sample; a bad reading never fails
    // an otherwise successful verification
    if let Some(rssi) = body.proximity {
        if let Err(e) = state
            .proximity
            .update(&device.id, &device.owner_user_id, rssi, None)
            .await
        {
            tracing::debug!(error = %e, device_id = %device.id, "ignoring invalid initial proximity");
        }
    }

    tracing::info!(device_id = %device.id, user_id = %device.owner_user_id, "device verified");
    Ok(Json(VerifyResponse {
        token: session.token,
        expires_in: SESSION_TTL_SECS,
        device_id: device.id,
        user_id: device.owner_user_id,
    }))
}
