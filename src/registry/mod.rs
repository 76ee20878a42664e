//! Device registry
//!
//! Owns device records and their trust state. Devices register once and
//! re-register freely; a re-registration with a known id updates the
//! record in place rather than creating a duplicate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::DbPool;
use crate::{Error, Result};

/// Trust state of a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustState {
    /// Registered but not yet approved by the user
    #[default]
    Pending,

    /// Approved device
    Trusted,
}

impl TrustState {
    /// Parse from string representation
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "trusted" => Self::Trusted,
            _ => Self::Pending,
        }
    }
}

impl std::fmt::Display for TrustState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Trusted => write!(f, "trusted"),
        }
    }
}

/// A registered device record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier (client-supplied)
    pub id: String,

    /// User who owns this device
    pub owner_user_id: String,

    /// Human-readable device name
    pub name: String,

    /// Device type (e.g., "phone", "laptop")
    pub device_type: String,

    /// Ed25519 public key (base64 encoded, opaque until verification)
    pub public_key: String,

    /// Arbitrary client-supplied metadata
    pub metadata: serde_json::Value,

    /// Trust state of this device
    pub trust_state: TrustState,

    /// When the device was first registered
    pub registered_at: DateTime<Utc>,

    /// When the device was last seen
    pub last_seen_at: DateTime<Utc>,
}

/// Registration payload for a new or re-registering device
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub id: String,
    pub name: String,
    pub device_type: String,
    pub public_key: String,
    pub metadata: serde_json::Value,
}

impl NewDevice {
    fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("deviceId", &self.id),
            ("deviceName", &self.name),
            ("deviceType", &self.device_type),
            ("publicKey", &self.public_key),
        ] {
            if value.trim().is_empty() {
                return Err(Error::Validation(format!("missing required field: {field}")));
            }
        }
        Ok(())
    }
}

/// Outcome of a registration call
#[derive(Debug, Clone)]
pub struct Registration {
    /// The registered device id
    pub device_id: String,

    /// Whether the device still needs user approval
    pub requires_trust: bool,

    /// True when an existing record was updated in place
    pub updated: bool,
}

/// Manages device storage and trust state
#[derive(Clone)]
pub struct DeviceRegistry {
    pool: DbPool,
}

impl DeviceRegistry {
    /// Create a new device registry
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Register a device, or update an existing registration in place.
    ///
    /// A known device id never duplicates: `name`, `metadata`, and
    /// `last_seen_at` are overwritten, ownership and trust state are kept.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if required fields are missing, `Database` on
    /// storage failure
    pub fn register(&self, owner_user_id: &str, device: &NewDevice) -> Result<Registration> {
        device.validate()?;
        if owner_user_id.trim().is_empty() {
            return Err(Error::Validation("missing owner user id".to_string()));
        }

        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        let metadata = serde_json::to_string(&device.metadata)?;

        let existing: Option<String> = conn
            .query_row(
                "SELECT trust_state FROM devices WHERE id = ?1",
                [&device.id],
                |row| row.get(0),
            )
            .ok();

        if let Some(trust_state) = existing {
            conn.execute(
                "UPDATE devices SET name = ?1, metadata = ?2, last_seen_at = ?3 WHERE id = ?4",
                [&device.name, &metadata, &now, &device.id],
            )?;

            tracing::debug!(device_id = %device.id, "device registration updated");
            return Ok(Registration {
                device_id: device.id.clone(),
                requires_trust: TrustState::from_str(&trust_state) == TrustState::Pending,
                updated: true,
            });
        }

        conn.execute(
            "INSERT INTO devices
                 (id, owner_user_id, name, device_type, public_key, metadata,
                  trust_state, registered_at, last_seen_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', ?7, ?7)",
            [
                &device.id,
                owner_user_id,
                &device.name,
                &device.device_type,
                &device.public_key,
                &metadata,
                &now,
            ],
        )?;

        tracing::info!(device_id = %device.id, owner = %owner_user_id, "device registered");
        Ok(Registration {
            device_id: device.id.clone(),
            requires_trust: true,
            updated: false,
        })
    }

    /// Get a device by id
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, device_id: &str) -> Result<Option<Device>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT id, owner_user_id, name, device_type, public_key, metadata,
                    trust_state, registered_at, last_seen_at
             FROM devices WHERE id = ?1",
            [device_id],
            row_to_device,
        );

        match result {
            Ok(device) => Ok(Some(device)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// List all devices owned by a user. Unknown users get an empty list,
    /// never an error.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn list(&self, user_id: &str) -> Result<Vec<Device>> {
        let conn = self.conn()?;

        let mut stmt = conn.prepare(
            "SELECT id, owner_user_id, name, device_type, public_key, metadata,
                    trust_state, registered_at, last_seen_at
             FROM devices WHERE owner_user_id = ?1 ORDER BY last_seen_at DESC",
        )?;

        let devices = stmt
            .query_map([user_id], row_to_device)?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(devices)
    }

    /// Update last seen timestamp for a device
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn touch(&self, device_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let now = Utc::now().to_rfc3339();
        conn.execute(
            "UPDATE devices SET last_seen_at = ?1 WHERE id = ?2",
            [&now, device_id],
        )?;
        Ok(())
    }

    /// Flip a pending device to trusted. Returns false for unknown devices.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn mark_trusted(&self, device_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "UPDATE devices SET trust_state = 'trusted' WHERE id = ?1",
            [device_id],
        )?;

        if rows > 0 {
            tracing::info!(device_id, "device trusted");
        }
        Ok(rows > 0)
    }

    /// Remove a device registration. Returns false for unknown devices.
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn remove(&self, device_id: &str) -> Result<bool> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM challenges WHERE device_id = ?1", [device_id])?;
        let rows = conn.execute("DELETE FROM devices WHERE id = ?1", [device_id])?;

        if rows > 0 {
            tracing::info!(device_id, "device removed");
        }
        Ok(rows > 0)
    }

    fn conn(&self) -> Result<crate::db::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    Ok(Device {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        name: row.get(2)?,
        device_type: row.get(3)?,
        public_key: row.get(4)?,
        metadata: serde_json::from_str(&row.get::<_, String>(5)?)
            .unwrap_or(serde_json::Value::Null),
        trust_state: TrustState::from_str(&row.get::<_, String>(6)?),
        registered_at: parse_datetime(&row.get::<_, String>(7)?),
        last_seen_at: parse_datetime(&row.get::<_, String>(8)?),
    })
}

pub(crate) fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
