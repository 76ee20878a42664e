//! Proximity classification
//!
//! Maps an RSSI sample to a trust/lock decision. Classification is a pure
//! function; the engine only remembers the latest sample per device so the
//! application layer can surface lock state. History is somebody else's
//! problem.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::{Error, Result};

/// RSSI at or above this is immediate proximity
const IMMEDIATE_THRESHOLD_DBM: i32 = -65;

/// RSSI at or above this (but below immediate) is near proximity
const NEAR_THRESHOLD_DBM: i32 = -85;

/// Proximity classification for a signal-strength sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    /// Device is right next to the user
    Immediate,

    /// Device is in range but not adjacent
    Near,

    /// Signal too weak to establish presence
    Unknown,
}

impl Proximity {
    /// Whether this classification locks the device's session surface
    #[must_use]
    pub const fn locked(self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl std::fmt::Display for Proximity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Near => write!(f, "near"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Classify an RSSI reading.
///
/// Total over the physically valid domain; positive dBm readings are not a
/// proximity state and are rejected instead of classified.
///
/// # Errors
///
/// Returns `Validation` for RSSI values above 0 dBm
pub fn classify(rssi: i32) -> Result<Proximity> {
    if rssi > 0 {
        return Err(Error::Validation(format!(
            "rssi out of range: {rssi} dBm"
        )));
    }
    if rssi >= IMMEDIATE_THRESHOLD_DBM {
        Ok(Proximity::Immediate)
    } else if rssi >= NEAR_THRESHOLD_DBM {
        Ok(Proximity::Near)
    } else {
        Ok(Proximity::Unknown)
    }
}

/// The latest proximity sample for a device
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximitySample {
    pub device_id: String,
    pub user_id: String,
    pub rssi: i32,
    pub proximity: Proximity,
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Result of a proximity update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProximityStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub proximity: Proximity,
    pub locked: bool,
}

/// Tracks the latest proximity sample per device
#[derive(Default)]
pub struct ProximityEngine {
    samples: RwLock<HashMap<String, ProximitySample>>,
}

impl ProximityEngine {
    /// Create a new engine with no samples
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a sample and replace the stored one for the device
    ///
    /// # Errors
    ///
    /// Returns `Validation` for out-of-range RSSI
    pub async fn update(
        &self,
        device_id: &str,
        user_id: &str,
        rssi: i32,
        session_id: Option<String>,
    ) -> Result<ProximityStatus> {
        let proximity = classify(rssi)?;
        let locked = proximity.locked();

        let sample = ProximitySample {
            device_id: device_id.to_string(),
            user_id: user_id.to_string(),
            rssi,
            proximity,
            locked,
            session_id: session_id.clone(),
            observed_at: Utc::now(),
        };

        self.samples
            .write()
            .await
            .insert(device_id.to_string(), sample);

        tracing::debug!(device_id, rssi, %proximity, locked, "proximity updated");
        Ok(ProximityStatus {
            session_id,
            proximity,
            locked,
        })
    }

    /// Latest sample for a device, if any
    pub async fn latest(&self, device_id: &str) -> Option<ProximitySample> {
        self.samples.read().await.get(device_id).cloned()
    }
}
