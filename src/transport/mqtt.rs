//! MQTT implementation of the transport seam

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rumqttc::v5::{
    AsyncClient, Event, EventLoop, MqttOptions, mqttbytes::QoS, mqttbytes::v5::Packet,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::{BrokerAddr, Connection, Connector, Inbound};
use crate::Result;

// The capacity of the bounded request channel behind each client.
const CLIENT_CHANNEL_CAPACITY: usize = 10;

// Keep alive time to send `pingreq` to the broker when the connection is idle.
const KEEP_ALIVE_TIME: Duration = Duration::from_secs(5);

// Backoff before re-polling after a connection error.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Opens MQTT connections, one event-loop task per broker
pub struct MqttConnector {
    client_prefix: String,
}

impl MqttConnector {
    /// Create a connector whose client ids start with `client_prefix`
    #[must_use]
    pub fn new(client_prefix: impl Into<String>) -> Self {
        Self {
            client_prefix: client_prefix.into(),
        }
    }
}

#[async_trait]
impl Connector for MqttConnector {
    type Conn = MqttConnection;

    async fn connect(
        &self,
        addr: &BrokerAddr,
        inbound: mpsc::Sender<Inbound>,
    ) -> Result<MqttConnection> {
        let client_id = format!(
            "{}{}",
            self.client_prefix,
            rand::thread_rng().gen_range(1..100_000)
        );
        let mut options = MqttOptions::new(client_id, addr.host.clone(), addr.port);
        options.set_keep_alive(KEEP_ALIVE_TIME);

        let (client, eventloop) = AsyncClient::new(options, CLIENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        tokio::spawn(run_delivery_loop(
            eventloop,
            addr.host.clone(),
            inbound,
            cancel.clone(),
        ));

        debug!(broker = %addr, "broker connection opened");
        Ok(MqttConnection { client, cancel })
    }
}

/// One live MQTT connection
pub struct MqttConnection {
    client: AsyncClient,
    cancel: CancellationToken,
}

#[async_trait]
impl Connection for MqttConnection {
    async fn subscribe(&self, topic: &str) -> Result<()> {
        self.client.subscribe(topic, QoS::AtMostOnce).await?;
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.client.unsubscribe(topic).await?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }

    async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("error disconnecting from broker: {e}");
        }
        self.cancel.cancel();
    }
}

/// Poll the event loop, forwarding publishes until cancelled
async fn run_delivery_loop(
    mut eventloop: EventLoop,
    broker: String,
    inbound: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => { break; }
            event = eventloop.poll() => {
                let publish = match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => publish,
                    Ok(_) => continue,
                    Err(e) => {
                        error!(broker = %broker, "connection error, retrying: {e}");
                        tokio::time::sleep(POLL_ERROR_BACKOFF).await;
                        continue;
                    }
                };

                let message = Inbound {
                    broker: broker.clone(),
                    topic: String::from_utf8_lossy(&publish.topic).into_owned(),
                    payload: publish.payload.to_vec(),
                };
                if inbound.send(message).await.is_err() {
                    // Receiver gone, the engine is shutting down.
                    break;
                }
            }
        }
    }
    drop(eventloop);
}
