//! Configuration for the hub binary and its services

use crate::transport::BrokerAddr;

/// Default catalog HTTP port
pub const DEFAULT_CATALOG_PORT: u16 = 8080;

/// Default home broker port
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Substring of a device id that marks it as one of ours
pub const DEFAULT_DEVICE_MARKER: &str = "YUN";

/// Hub configuration, shared by the catalog server and the consumer services
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the catalog HTTP server binds to
    pub catalog_port: u16,

    /// Base URL consumer services use to reach the catalog
    pub catalog_url: String,

    /// Home pub/sub broker
    pub broker: BrokerAddr,

    /// Path to the catalog database; `None` means in-memory
    pub db_path: Option<std::path::PathBuf>,

    /// Device-id marker used by every capability predicate
    pub device_marker: String,
}

impl Config {
    /// Build a configuration from environment variables, falling back to
    /// defaults suitable for a local testbed
    #[must_use]
    pub fn from_env() -> Self {
        let catalog_port = std::env::var("HEARTH_CATALOG_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_CATALOG_PORT);

        let catalog_url = std::env::var("HEARTH_CATALOG_URL")
            .unwrap_or_else(|_| format!("http://127.0.0.1:{catalog_port}"));

        let broker_host =
            std::env::var("HEARTH_BROKER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let broker_port = std::env::var("HEARTH_BROKER_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_BROKER_PORT);

        let db_path = std::env::var("HEARTH_DB").ok().map(Into::into);

        let device_marker = std::env::var("HEARTH_DEVICE_MARKER")
            .unwrap_or_else(|_| DEFAULT_DEVICE_MARKER.to_string());

        Self {
            catalog_port,
            catalog_url,
            broker: BrokerAddr {
                host: broker_host,
                port: broker_port,
            },
            db_path,
            device_marker,
        }
    }
}
