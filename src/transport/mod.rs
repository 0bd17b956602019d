//! Pub/sub transport: broker addressing and the connection seam
//!
//! The engine talks to brokers through the [`Connector`]/[`Connection`]
//! traits so reconciliation can be exercised without a live broker; the
//! production implementation lives in [`mqtt`].

pub mod mqtt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::Result;

pub use mqtt::{MqttConnection, MqttConnector};

/// Address of a pub/sub broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerAddr {
    /// Broker host, `ip` on the wire
    #[serde(rename = "ip")]
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for BrokerAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// A message delivered by one broker connection
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Host of the broker the message arrived from
    pub broker: String,
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Opens connections to brokers
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Connection;

    /// Open a connection to `addr`; inbound messages are forwarded to
    /// `inbound` until the connection is torn down
    async fn connect(&self, addr: &BrokerAddr, inbound: mpsc::Sender<Inbound>)
    -> Result<Self::Conn>;
}

/// One live broker connection
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Tear the connection down, stopping its delivery task.
    /// In-flight message delivery is allowed to drain.
    async fn disconnect(&self);
}
