//! Real-time message envelope
//!
//! JSON messages with a `type` discriminator, decoded once at the
//! connection boundary. Unknown and malformed variants collapse into a
//! single ignore branch; they are never valid domain values.

use serde::{Deserialize, Serialize};

use super::event::AuthEvent;

/// Incoming message from a connected device
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Application-level keepalive; echoed back as `pong`
    Ping {
        #[serde(default)]
        timestamp: Option<serde_json::Value>,
    },

    /// Subscribe to broadcast channels
    Subscribe {
        #[serde(default)]
        channels: Vec<String>,
    },

    /// Unsubscribe from broadcast channels
    Unsubscribe {
        #[serde(default)]
        channels: Vec<String>,
    },

    /// Report a signal-strength sample
    ProximityUpdate { rssi: i32 },
}

/// Outgoing message to a connected device
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Connection established
    Welcome {
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        device_id: Option<String>,
        client_id: String,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Reply to an application-level ping
    Pong {
        #[serde(skip_serializing_if = "Option::is_none")]
        timestamp: Option<serde_json::Value>,
    },

    /// Acknowledges a subscribe with the authorized subset
    Subscribed { channels: Vec<String> },

    /// Acknowledges an unsubscribe with the channels removed
    Unsubscribed { channels: Vec<String> },

    /// A broadcast auth event
    AuthEvent { event: AuthEvent },
}
