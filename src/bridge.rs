//! Pub/sub registration bridge
//!
//! Devices without an HTTP stack register by publishing their registration
//! payload on [`REGISTRATION_TOPIC`]. The bridge validates each payload with
//! the same rules as the HTTP surface and writes the result into the store.
//! Pub/sub offers no response channel, so nothing is reported back: a bad
//! payload is dropped and the catalog keeps serving.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::Result;
use crate::catalog::registration::DeviceRegistration;
use crate::db::DeviceRepo;
use crate::transport::{BrokerAddr, Connection, Connector};

/// Topic devices publish their registrations on
pub const REGISTRATION_TOPIC: &str = "catalog/devices";

/// What became of one bridged payload
#[derive(Debug)]
pub enum IngestOutcome {
    /// Stored; carries the device id
    Stored(String),
    /// Dropped before reaching the store; carries the reason
    Rejected(String),
    /// Valid payload, store write failed
    Failed(crate::Error),
}

/// Validate and store one bridged registration payload
pub fn ingest(devices: &DeviceRepo, payload: &[u8], now: i64) -> IngestOutcome {
    let value: serde_json::Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => return IngestOutcome::Rejected(format!("payload is not JSON: {e}")),
    };
    let registration = match DeviceRegistration::parse(&value) {
        Ok(registration) => registration,
        Err(e) => return IngestOutcome::Rejected(e.to_string()),
    };

    let device = registration.into_device(now);
    let device_id = device.device_id.clone();
    match devices.upsert(&device) {
        Ok(()) => IngestOutcome::Stored(device_id),
        Err(e) => IngestOutcome::Failed(e),
    }
}

/// Listens on the registration topic and feeds the device store
pub struct RegistrationBridge {
    devices: DeviceRepo,
    broker: BrokerAddr,
    cancel: CancellationToken,
}

impl RegistrationBridge {
    /// Create a bridge over the catalog's device store
    #[must_use]
    pub fn new(devices: DeviceRepo, broker: BrokerAddr, cancel: CancellationToken) -> Self {
        Self {
            devices,
            broker,
            cancel,
        }
    }

    /// Subscribe and ingest until cancelled
    ///
    /// # Errors
    ///
    /// Returns an error only if the broker connection or the subscription
    /// cannot be established; once subscribed, every payload outcome is
    /// absorbed and logged
    pub async fn run<C: Connector>(self, connector: &C) -> Result<()> {
        let (tx, mut rx) = mpsc::channel(32);
        let conn = connector.connect(&self.broker, tx).await?;
        conn.subscribe(REGISTRATION_TOPIC).await?;
        debug!(broker = %self.broker, topic = REGISTRATION_TOPIC, "registration bridge up");

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                message = rx.recv() => {
                    let Some(message) = message else { break };
                    match ingest(&self.devices, &message.payload, chrono::Utc::now().timestamp()) {
                        IngestOutcome::Stored(id) => debug!(device = %id, "device registered over bridge"),
                        IngestOutcome::Rejected(reason) => debug!("bridged payload dropped: {reason}"),
                        IngestOutcome::Failed(e) => warn!("bridged registration not stored: {e}"),
                    }
                }
            }
        }

        conn.disconnect().await;
        Ok(())
    }
}
