//! Time-boxed authentication challenges
//!
//! A challenge is a random nonce bound to a device id. Consumption is a
//! single atomic update, so a challenge can never authenticate twice even
//! under concurrent verification attempts.

use chrono::{DateTime, Duration, Utc};

use crate::db::DbPool;
use crate::registry::parse_datetime;
use crate::{Error, Result};

/// Nonce length in bytes
const NONCE_LENGTH: usize = 32;

/// Challenge validity window in minutes
const CHALLENGE_TTL_MINUTES: i64 = 5;

/// A stored authentication challenge
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: String,
    pub device_id: String,
    pub nonce: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// Result of issuing a challenge
#[derive(Debug, Clone)]
pub struct IssuedChallenge {
    pub id: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of consuming a challenge, carried into signature verification
#[derive(Debug, Clone)]
pub struct ConsumedChallenge {
    pub device_id: String,
    pub nonce: String,
}

/// Issues and consumes authentication challenges
#[derive(Clone)]
pub struct ChallengeManager {
    pool: DbPool,
}

impl ChallengeManager {
    /// Create a new challenge manager
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Issue a challenge for a registered device
    ///
    /// # Errors
    ///
    /// Returns `DeviceNotFound` for unknown device ids, `Database` on
    /// storage failure
    pub fn issue(&self, device_id: &str) -> Result<IssuedChallenge> {
        let conn = self.conn()?;

        let known: bool = conn
            .query_row("SELECT 1 FROM devices WHERE id = ?1", [device_id], |_| {
                Ok(true)
            })
            .unwrap_or(false);
        if !known {
            return Err(Error::DeviceNotFound(device_id.to_string()));
        }

        // Opportunistic cleanup of expired rows
        let now = Utc::now();
        conn.execute(
            "DELETE FROM challenges WHERE expires_at < ?1",
            [now.to_rfc3339()],
        )?;

        let id = uuid::Uuid::new_v4().to_string();
        let nonce = generate_nonce();
        let expires_at = now + Duration::minutes(CHALLENGE_TTL_MINUTES);

        conn.execute(
            "INSERT INTO challenges (id, device_id, nonce, issued_at, expires_at, consumed)
             VALUES (?1, ?2, ?3, ?4, ?5, 0)",
            [
                &id,
                device_id,
                &nonce,
                &now.to_rfc3339(),
                &expires_at.to_rfc3339(),
            ],
        )?;

        tracing::debug!(device_id, challenge_id = %id, "issued challenge");
        Ok(IssuedChallenge {
            id,
            nonce,
            expires_at,
        })
    }

    /// Atomically consume a challenge.
    ///
    /// Exactly one concurrent caller wins; everyone else — and any caller
    /// holding an unknown, expired, or already-consumed id — gets
    /// `ChallengeNotFound` with no further detail.
    ///
    /// # Errors
    ///
    /// Returns `ChallengeNotFound` or `Database`
    pub fn consume(&self, challenge_id: &str) -> Result<ConsumedChallenge> {
        let conn = self.conn()?;

        let rows = conn.execute(
            "UPDATE challenges SET consumed = 1
             WHERE id = ?1 AND consumed = 0 AND expires_at > ?2",
            [challenge_id, &Utc::now().to_rfc3339()],
        )?;

        if rows == 0 {
            return Err(Error::ChallengeNotFound);
        }

        let consumed = conn.query_row(
            "SELECT device_id, nonce FROM challenges WHERE id = ?1",
            [challenge_id],
            |row| {
                Ok(ConsumedChallenge {
                    device_id: row.get(0)?,
                    nonce: row.get(1)?,
                })
            },
        )?;

        tracing::debug!(challenge_id, device_id = %consumed.device_id, "challenge consumed");
        Ok(consumed)
    }

    /// Look up a challenge by id (diagnostics and tests)
    ///
    /// # Errors
    ///
    /// Returns error if database operation fails
    pub fn get(&self, challenge_id: &str) -> Result<Option<Challenge>> {
        let conn = self.conn()?;

        let result = conn.query_row(
            "SELECT id, device_id, nonce, issued_at, expires_at, consumed
             FROM challenges WHERE id = ?1",
            [challenge_id],
            |row| {
                Ok(Challenge {
                    id: row.get(0)?,
                    device_id: row.get(1)?,
                    nonce: row.get(2)?,
                    issued_at: parse_datetime(&row.get::<_, String>(3)?),
                    expires_at: parse_datetime(&row.get::<_, String>(4)?),
                    consumed: row.get::<_, i64>(5)? != 0,
                })
            },
        );

        match result {
            Ok(challenge) => Ok(Some(challenge)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[cfg(test)]
    pub(crate) fn force_expire(&self, challenge_id: &str) -> Result<()> {
        let conn = self.conn()?;
        let past = (Utc::now() - Duration::minutes(1)).to_rfc3339();
        conn.execute(
            "UPDATE challenges SET expires_at = ?1 WHERE id = ?2",
            [&past, challenge_id],
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<crate::db::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }
}

/// Generate a random hex nonce from the OS RNG
fn generate_nonce() -> String {
    use rand::RngCore;

    let mut bytes = [0u8; NONCE_LENGTH];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
