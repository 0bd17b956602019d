//! Catalog persistence: devices, services, and users
//!
//! The store is a plain keyed table per entity kind. Upserts are single
//! conditional writes, so a duplicate-key race degrades to an update
//! instead of erroring.

pub mod device;
mod schema;
pub mod service;
pub mod user;

use std::path::Path;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;

use crate::{Error, Result};

pub use device::{Action, Device, DeviceRepo, Protocol, ProtocolEndpoints};
pub use schema::SCHEMA_VERSION;
pub use service::{
    MqttEndpoints, RestEndpoints, ServiceEndpoints, ServiceRecord, ServiceRepo,
};
pub use user::{EmailLabel, User, UserRepo};

/// Seconds since last registration after which a device or service is
/// considered gone and purged
pub const LIVENESS_WINDOW_SECS: i64 = 120;

/// Cadence of the periodic eviction sweep
pub const EVICTION_PERIOD: std::time::Duration = std::time::Duration::from_secs(60);

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

/// Pooled database connection
pub type DbConn = PooledConnection<SqliteConnectionManager>;

/// Initialize the database
///
/// # Errors
///
/// Returns error if the database cannot be opened or initialized
pub fn init<P: AsRef<Path>>(path: P) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(path);
    let pool = Pool::builder()
        .max_size(4)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    tracing::info!(version = SCHEMA_VERSION, "database initialized");
    Ok(pool)
}

/// Initialize an in-memory database (for testing and ephemeral runs)
///
/// # Errors
///
/// Returns error if the database cannot be initialized
pub fn init_memory() -> Result<DbPool> {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder()
        .max_size(1)
        .build(manager)
        .map_err(|e| Error::Database(e.to_string()))?;

    let conn = pool.get().map_err(|e| Error::Database(e.to_string()))?;
    schema::init(&conn)?;

    Ok(pool)
}
