//! Device model and repository

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{DbPool, LIVENESS_WINDOW_SECS};
use crate::{Error, Result};

/// Protocols a device can speak
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Protocol {
    /// Publish/subscribe transport
    #[serde(rename = "MQTT")]
    Mqtt,
    /// Request/response transport
    #[serde(rename = "REST")]
    Rest,
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mqtt => write!(f, "MQTT"),
            Self::Rest => write!(f, "REST"),
        }
    }
}

/// Concrete actions a resolved endpoint supports, per protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Action {
    /// MQTT topic the device publishes telemetry on (consumers subscribe here)
    #[serde(rename = "subscribe")]
    Subscribe,
    /// MQTT topic the device listens on for commands (consumers publish here)
    #[serde(rename = "publish")]
    Publish,
    /// REST read endpoint
    #[serde(rename = "GET")]
    Get,
    /// REST write endpoint
    #[serde(rename = "POST")]
    Post,
}

/// Per-protocol addressing info with fully-resolved endpoint identifiers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolEndpoints {
    /// Broker host (MQTT) or server host (REST)
    pub ip: String,
    /// Broker or server port
    pub port: u16,
    /// Resolved endpoints: topics for MQTT, URLs for REST
    pub end_points: BTreeMap<Action, Vec<String>>,
}

/// A registered device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Unique device identifier
    #[serde(rename = "deviceID")]
    pub device_id: String,
    /// Addressing info per declared protocol
    pub end_points: BTreeMap<Protocol, ProtocolEndpoints>,
    /// Capability tags per declared protocol
    pub available_resources: BTreeMap<Protocol, Vec<String>>,
    /// Unix timestamp of the last registration
    #[serde(rename = "last_update")]
    pub last_seen: i64,
}

impl Device {
    /// MQTT addressing info, if the device declared the protocol
    #[must_use]
    pub fn mqtt(&self) -> Option<&ProtocolEndpoints> {
        self.end_points.get(&Protocol::Mqtt)
    }

    /// Resolved MQTT topics for one action, empty when absent
    #[must_use]
    pub fn mqtt_topics(&self, action: Action) -> &[String] {
        self.mqtt()
            .and_then(|ep| ep.end_points.get(&action))
            .map_or(&[], Vec::as_slice)
    }
}

/// Device repository
#[derive(Clone)]
pub struct DeviceRepo {
    pool: DbPool,
}

impl DeviceRepo {
    /// Create a new device repository
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Insert a device; if the id already exists, refresh `last_seen` only.
    /// A single conditional write, so a concurrent duplicate-key race
    /// degrades to the update arm.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn upsert(&self, device: &Device) -> Result<()> {
        let end_points = serde_json::to_string(&device.end_points)?;
        let resources = serde_json::to_string(&device.available_resources)?;

        self.conn()?
            .execute(
                "INSERT INTO devices (device_id, end_points, available_resources, last_seen)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(device_id) DO UPDATE SET last_seen = excluded.last_seen",
                rusqlite::params![device.device_id, end_points, resources, device.last_seen],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Retrieve a device by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn find(&self, device_id: &str) -> Result<Option<Device>> {
        let conn = self.conn()?;
        let row = conn.query_row(
            "SELECT device_id, end_points, available_resources, last_seen
             FROM devices WHERE device_id = ?1",
            [device_id],
            row_to_device,
        );
        match row {
            Ok(device) => Ok(Some(device)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    /// Retrieve every registered device
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn list_all(&self) -> Result<Vec<Device>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT device_id, end_points, available_resources, last_seen
                 FROM devices ORDER BY device_id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let devices = stmt
            .query_map([], row_to_device)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(devices)
    }

    /// Delete every device whose registration is older than the liveness window
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn evict_expired(&self, now: i64) -> Result<usize> {
        let purged = self
            .conn()?
            .execute(
                "DELETE FROM devices WHERE last_seen <= ?1",
                [now - LIVENESS_WINDOW_SECS],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(purged)
    }
}

fn row_to_device(row: &rusqlite::Row<'_>) -> rusqlite::Result<Device> {
    let end_points: String = row.get(1)?;
    let resources: String = row.get(2)?;
    Ok(Device {
        device_id: row.get(0)?,
        end_points: serde_json::from_str(&end_points).unwrap_or_default(),
        available_resources: serde_json::from_str(&resources).unwrap_or_default(),
        last_seen: row.get(3)?,
    })
}
