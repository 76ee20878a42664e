//! Broadcast auth events
//!
//! An `AuthEvent` describes a change in device presence or proximity. It
//! exists only as a broadcast payload and is never persisted.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::proximity::ProximityStatus;

/// Kind of auth event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEventKind {
    /// A device reported a new proximity classification
    ProximityChanged,

    /// A device disconnected or was revoked
    DeviceRemoved,

    /// A new device registered
    DeviceAdded,
}

impl std::fmt::Display for AuthEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProximityChanged => write!(f, "proximity_changed"),
            Self::DeviceRemoved => write!(f, "device_removed"),
            Self::DeviceAdded => write!(f, "device_added"),
        }
    }
}

/// A broadcast notification about a device's trust/proximity state
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    #[serde(rename = "type")]
    pub kind: AuthEventKind,
    pub device_id: String,
    pub user_id: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuthEvent {
    /// A device's proximity classification changed
    #[must_use]
    pub fn proximity_changed(device_id: &str, user_id: &str, rssi: i32, status: &ProximityStatus) -> Self {
        Self {
            kind: AuthEventKind::ProximityChanged,
            device_id: device_id.to_string(),
            user_id: user_id.to_string(),
            data: serde_json::json!({
                "proximity": status.proximity,
                "locked": status.locked,
                "rssi": rssi,
            }),
            timestamp: Utc::now(),
        }
    }

    /// A device left the mesh
    #[must_use]
    pub fn device_removed(device_id: &str, user_id: &str, reason: &str) -> Self {
        Self {
            kind: AuthEventKind::DeviceRemoved,
            device_id: device_id.to_string(),
            user_id: user_id.to_string(),
            data: serde_json::json!({ "reason": reason }),
            timestamp: Utc::now(),
        }
    }

    /// A new device registered for the user
    #[must_use]
    pub fn device_added(device_id: &str, user_id: &str, device_name: &str) -> Self {
        Self {
            kind: AuthEventKind::DeviceAdded,
            device_id: device_id.to_string(),
            user_id: user_id.to_string(),
            data: serde_json::json!({ "name": device_name }),
            timestamp: Utc::now(),
        }
    }
}
