//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Registered devices, one row per device id
        CREATE TABLE IF NOT EXISTS devices (
            id TEXT PRIMARY KEY,
            owner_user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            device_type TEXT NOT NULL,
            public_key TEXT NOT NULL,
            metadata TEXT NOT NULL DEFAULT '{}',
            trust_state TEXT NOT NULL DEFAULT 'pending'
                CHECK(trust_state IN ('pending', 'trusted')),
            registered_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_devices_owner ON devices(owner_user_id);

        -- Authentication challenges, consumed at most once
        CREATE TABLE IF NOT EXISTS challenges (
            id TEXT PRIMARY KEY,
            device_id TEXT NOT NULL REFERENCES devices(id),
            nonce TEXT NOT NULL,
            issued_at TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            consumed INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_challenges_device ON challenges(device_id);
        CREATE INDEX IF NOT EXISTS idx_challenges_expiry ON challenges(expires_at);

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}
