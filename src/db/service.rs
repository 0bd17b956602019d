//! Service model and repository

use serde::{Deserialize, Serialize};

use super::{DbPool, LIVENESS_WINDOW_SECS};
use crate::transport::BrokerAddr;
use crate::{Error, Result};

/// MQTT endpoints a service exposes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MqttEndpoints {
    /// Broker the service is reachable on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub broker: Option<BrokerAddr>,
    /// Topics the service publishes its output on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<Vec<String>>,
    /// Topics the service accepts input on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<Vec<String>>,
}

/// REST endpoints a service exposes, keyed by method
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RestEndpoints {
    #[serde(rename = "GET", skip_serializing_if = "Option::is_none")]
    pub get: Option<Vec<String>>,
    #[serde(rename = "POST", skip_serializing_if = "Option::is_none")]
    pub post: Option<Vec<String>>,
    #[serde(rename = "PUT", skip_serializing_if = "Option::is_none")]
    pub put: Option<Vec<String>>,
    #[serde(rename = "PATCH", skip_serializing_if = "Option::is_none")]
    pub patch: Option<Vec<String>>,
    #[serde(rename = "HEAD", skip_serializing_if = "Option::is_none")]
    pub head: Option<Vec<String>>,
    #[serde(rename = "DELETE", skip_serializing_if = "Option::is_none")]
    pub delete: Option<Vec<String>>,
}

/// Endpoints a service exposes, per protocol
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEndpoints {
    #[serde(rename = "MQTT", skip_serializing_if = "Option::is_none")]
    pub mqtt: Option<MqttEndpoints>,
    #[serde(rename = "REST", skip_serializing_if = "Option::is_none")]
    pub rest: Option<RestEndpoints>,
}

/// A registered service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    /// Unique service identifier
    #[serde(rename = "serviceID")]
    pub service_id: String,
    /// Human-readable description
    pub description: String,
    /// Endpoints to reach the service
    pub end_points: ServiceEndpoints,
    /// Unix timestamp of the last registration
    #[serde(rename = "last_update")]
    pub last_seen: i64,
}

/// Service repository
#[derive(Clone)]
pub struct ServiceRepo {
    pool: DbPool,
}

impl ServiceRepo {
    /// Create a new service repository
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(&self) -> Result<super::DbConn> {
        self.pool.get().map_err(|e| Error::Database(e.to_string()))
    }

    /// Insert a service; if the id already exists, refresh `last_seen` only
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn upsert(&self, service: &ServiceRecord) -> Result<()> {
        let end_points = serde_json::to_string(&service.end_points)?;

        self.conn()?
            .execute(
                "INSERT INTO services (service_id, description, end_points, last_seen)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(service_id) DO UPDATE SET last_seen = excluded.last_seen",
                rusqlite::params![
                    service.service_id,
                    service.description,
                    end_points,
                    service.last_seen
                ],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }

    /// Retrieve a service by id
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn find(&self, service_id: &str) -> Result<Option<ServiceRecord>> {
        let conn = self.conn()?;
        let row = conn.query_row(
            "SELECT service_id, description, end_points, last_seen
             FROM services WHERE service_id = ?1",
            [service_id],
            row_to_service,
        );
        match row {
            Ok(service) => Ok(Some(service)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Error::Database(e.to_string())),
        }
    }

    /// Retrieve every registered service
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails
    pub fn list_all(&self) -> Result<Vec<ServiceRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT service_id, description, end_points, last_seen
                 FROM services ORDER BY service_id",
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        let services = stmt
            .query_map([], row_to_service)
            .map_err(|e| Error::Database(e.to_string()))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(services)
    }

    /// Delete every service whose registration is older than the liveness window
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails
    pub fn evict_expired(&self, now: i64) -> Result<usize> {
        let purged = self
            .conn()?
            .execute(
                "DELETE FROM services WHERE last_seen <= ?1",
                [now - LIVENESS_WINDOW_SECS],
            )
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(purged)
    }
}

fn row_to_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRecord> {
    let end_points: String = row.get(2)?;
    Ok(ServiceRecord {
        service_id: row.get(0)?,
        description: row.get(1)?,
        end_points: serde_json::from_str(&end_points).unwrap_or_default(),
        last_seen: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;

    fn sample_service(id: &str, last_seen: i64) -> ServiceRecord {
        ServiceRecord {
            service_id: id.to_string(),
            description: "temperature average".to_string(),
            end_points: ServiceEndpoints {
                mqtt: Some(MqttEndpoints {
                    broker: Some(BrokerAddr {
                        host: "broker.local".to_string(),
                        port: 1883,
                    }),
                    subscribe: Some(vec!["hearth/temperature/average".to_string()]),
                    publish: None,
                }),
                rest: None,
            },
            last_seen,
        }
    }

    #[test]
    fn upsert_and_find_round_trip() {
        let repo = ServiceRepo::new(db::init_memory().unwrap());
        let service = sample_service("temperature-mean", 50);
        repo.upsert(&service).unwrap();
        assert_eq!(repo.find("temperature-mean").unwrap().unwrap(), service);
    }

    #[test]
    fn re_registration_refreshes_liveness() {
        let repo = ServiceRepo::new(db::init_memory().unwrap());
        repo.upsert(&sample_service("temperature-mean", 50)).unwrap();
        repo.upsert(&sample_service("temperature-mean", 90)).unwrap();

        let found = repo.find("temperature-mean").unwrap().unwrap();
        assert_eq!(found.last_seen, 90);
        assert_eq!(repo.list_all().unwrap().len(), 1);
    }

    #[test]
    fn stale_services_are_purged() {
        let repo = ServiceRepo::new(db::init_memory().unwrap());
        let now = 10_000;
        repo.upsert(&sample_service("stale", now - 300)).unwrap();
        repo.upsert(&sample_service("fresh", now - 10)).unwrap();

        assert_eq!(repo.evict_expired(now).unwrap(), 1);
        assert!(repo.find("stale").unwrap().is_none());
        assert!(repo.find("fresh").unwrap().is_some());
    }
}
