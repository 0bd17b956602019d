//! Error types for the hearth hub

use thiserror::Error;

/// Result type alias for hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the hub
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed or incomplete registration payload.
    /// Never partially applied; rejected before any store mutation.
    #[error("invalid payload: {0}")]
    Validation(String),

    /// Entity id absent, or an aggregate query returned nothing
    #[error("not found: {0}")]
    NotFound(String),

    /// Catalog or broker unreachable; drives retry/backoff/reset,
    /// never surfaced to a caller synchronously
    #[error("transport unavailable: {0}")]
    Transport(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// `SQLite` error
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// MQTT client error
    #[error("mqtt error: {0}")]
    Mqtt(String),
}

impl From<rumqttc::v5::ClientError> for Error {
    fn from(e: rumqttc::v5::ClientError) -> Self {
        Self::Mqtt(e.to_string())
    }
}
