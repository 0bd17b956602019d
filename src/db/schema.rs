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
        -- Devices: one row per registered device, keyed by device id.
        -- JSON-typed columns hold the normalized endpoint and resource maps.
        CREATE TABLE IF NOT EXISTS devices (
            device_id TEXT PRIMARY KEY,
            end_points TEXT NOT NULL,
            available_resources TEXT NOT NULL,
            last_seen INTEGER NOT NULL
        );

        -- Services: same liveness rule as devices, no resource map.
        CREATE TABLE IF NOT EXISTS services (
            service_id TEXT PRIMARY KEY,
            description TEXT NOT NULL,
            end_points TEXT NOT NULL,
            last_seen INTEGER NOT NULL
        );

        -- Users: never evicted; email addresses are last-write-wins.
        CREATE TABLE IF NOT EXISTS users (
            user_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            surname TEXT NOT NULL,
            email_addresses TEXT NOT NULL
        );

        PRAGMA user_version = 1;
        ",
    )?;
    Ok(())
}
