//! Subscription reconciliation engine
//!
//! A consumer service owns one [`Engine`]. The engine polls the catalog for
//! qualifying devices and converges its broker subscriptions onto that set:
//! topics of departed devices are unsubscribed, connections to brokers with
//! no remaining topics are torn down, new devices get their topics
//! subscribed, opening broker connections on demand. Inbound messages are
//! dispatched to the per-device controller and the resulting commands
//! published back out.
//!
//! The connection to the home broker is opened once at startup and survives
//! resets; only external broker connections come and go.

mod catalog_client;

pub use catalog_client::CatalogClient;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::registration::ServiceRegistration;
use crate::controller::{DeviceController, Route, SensorEvent};
use crate::db::{Action, Device, Protocol};
use crate::transport::{BrokerAddr, Connection, Connector, Inbound};
use crate::{Error, Result};

/// Cadence of the periodic reconcile pass
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(60);

/// Backoff after a catalog transport failure during bootstrap
pub const TRANSPORT_BACKOFF: Duration = Duration::from_secs(30);

/// Backoff while the catalog holds no qualifying device
pub const NO_MATCH_BACKOFF: Duration = Duration::from_secs(10);

const INBOUND_CHANNEL_CAPACITY: usize = 64;

/// Decides which catalog devices a service consumes
#[derive(Debug, Clone)]
pub struct CapabilityPredicate {
    marker: String,
    required: Vec<String>,
}

impl CapabilityPredicate {
    /// A device qualifies when its id contains `marker` and its MQTT
    /// resource list carries every tag in `required`
    pub fn new(
        marker: impl Into<String>,
        required: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            marker: marker.into(),
            required: required.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, device: &Device) -> bool {
        device.device_id.contains(&self.marker)
            && device.mqtt().is_some()
            && device
                .available_resources
                .get(&Protocol::Mqtt)
                .is_some_and(|have| {
                    self.required
                        .iter()
                        .all(|tag| have.iter().any(|h| h == tag))
                })
    }
}

/// What the engine maintains for one consumed device
#[derive(Debug, Clone)]
pub struct DevicePlan {
    /// Broker the device lives on
    pub broker: BrokerAddr,
    /// Topics to hold subscribed
    pub topics: Vec<String>,
}

impl DevicePlan {
    /// Plan covering every telemetry topic of the device's MQTT block
    #[must_use]
    pub fn from_mqtt(device: &Device) -> Option<Self> {
        let mqtt = device.mqtt()?;
        Some(Self {
            broker: BrokerAddr {
                host: mqtt.ip.clone(),
                port: mqtt.port,
            },
            topics: device.mqtt_topics(Action::Subscribe).to_vec(),
        })
    }
}

/// What one consumer service tells the engine: which devices it wants, what
/// to subscribe per device, which controller drives the device, and how the
/// service announces itself
pub trait ServiceProfile: Send + Sync + 'static {
    fn predicate(&self) -> &CapabilityPredicate;

    /// Subscription plan for a qualifying device; `None` skips the device
    fn plan(&self, device: &Device) -> Option<DevicePlan>;

    /// Controller instance for a qualifying device
    fn controller(&self, device: &Device) -> Box<dyn DeviceController>;

    /// Self-registration body, re-sent on every reconcile pass
    fn registration(&self, home: &BrokerAddr) -> ServiceRegistration;

    /// Topic for the connected-device roster, if the service publishes one
    fn roster_topic(&self) -> Option<&str> {
        None
    }
}

struct BrokerEntry<Conn> {
    conn: Arc<Conn>,
    topics: HashSet<String>,
}

struct DeviceEntry {
    plan: DevicePlan,
    controller: Box<dyn DeviceController>,
}

struct EngineState<Conn> {
    home: Option<Arc<Conn>>,
    /// Live broker connections keyed by host; only brokers holding topics
    brokers: HashMap<String, BrokerEntry<Conn>>,
    devices: HashMap<String, DeviceEntry>,
    /// `(broker host, topic)` back to the owning device
    topics: HashMap<(String, String), String>,
}

impl<Conn> Default for EngineState<Conn> {
    fn default() -> Self {
        Self {
            home: None,
            brokers: HashMap::new(),
            devices: HashMap::new(),
            topics: HashMap::new(),
        }
    }
}

/// The engine was cancelled while waiting
struct Stopped;

/// Subscription reconciliation engine for one service
pub struct Engine<C: Connector, P: ServiceProfile> {
    connector: C,
    profile: P,
    catalog: CatalogClient,
    home_addr: BrokerAddr,
    cancel: CancellationToken,
    inbound_tx: mpsc::Sender<Inbound>,
    inbound_rx: std::sync::Mutex<Option<mpsc::Receiver<Inbound>>>,
    state: Mutex<EngineState<C::Conn>>,
}

impl<C: Connector, P: ServiceProfile> Engine<C, P> {
    /// Create an engine; nothing connects until [`Engine::run`]
    #[must_use]
    pub fn new(
        connector: C,
        profile: P,
        catalog: CatalogClient,
        home_addr: BrokerAddr,
        cancel: CancellationToken,
    ) -> Self {
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);
        Self {
            connector,
            profile,
            catalog,
            home_addr,
            cancel,
            inbound_tx,
            inbound_rx: std::sync::Mutex::new(Some(inbound_rx)),
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Drive the service until cancelled: connect home, bootstrap onto the
    /// first qualifying device set, then reconcile periodically while
    /// dispatching inbound events
    ///
    /// # Errors
    ///
    /// Returns an error only when the engine is started twice
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let rx = self
            .inbound_rx
            .lock()
            .ok()
            .and_then(|mut guard| guard.take());
        let Some(mut rx) = rx else {
            return Err(Error::Config("engine already running".to_string()));
        };

        if self.connect_home().await.is_ok() && self.bootstrap().await.is_ok() {
            info!(broker = %self.home_addr, "engine converged onto its first device set");
            let reconciler = {
                let engine = Arc::clone(&self);
                tokio::spawn(async move { engine.run_reconcile_loop().await })
            };

            loop {
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    message = rx.recv() => {
                        let Some(message) = message else { break };
                        self.dispatch(message).await;
                    }
                }
            }

            let _ = reconciler.await;
        }

        self.shutdown().await;
        Ok(())
    }

    /// Sleep unless cancelled first
    async fn pause(&self, period: Duration) -> std::result::Result<(), Stopped> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(Stopped),
            () = tokio::time::sleep(period) => Ok(()),
        }
    }

    /// Open the home broker connection, retrying until it comes up
    async fn connect_home(&self) -> std::result::Result<(), Stopped> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(Stopped);
            }
            match self
                .connector
                .connect(&self.home_addr, self.inbound_tx.clone())
                .await
            {
                Ok(conn) => {
                    self.state.lock().await.home = Some(Arc::new(conn));
                    return Ok(());
                }
                Err(e) => {
                    warn!(broker = %self.home_addr, "home broker not reachable, retrying: {e}");
                    self.pause(TRANSPORT_BACKOFF).await?;
                }
            }
        }
    }

    /// Poll the catalog until it yields a qualifying device set and the
    /// engine has converged onto it
    async fn bootstrap(&self) -> std::result::Result<(), Stopped> {
        loop {
            match self.catalog.devices_all().await {
                Err(e) => {
                    warn!("catalog not reachable, retrying: {e}");
                    self.pause(TRANSPORT_BACKOFF).await?;
                }
                Ok(devices) => {
                    let matching = self.qualifying(devices);
                    if matching.is_empty() {
                        debug!("no qualifying devices in the catalog yet");
                        self.pause(NO_MATCH_BACKOFF).await?;
                    } else {
                        match self.reconcile_with(matching).await {
                            Ok(()) => {
                                self.announce().await;
                                self.publish_roster().await;
                                return Ok(());
                            }
                            Err(e) => {
                                warn!("bootstrap convergence failed, resetting: {e}");
                                self.reset().await;
                                self.pause(TRANSPORT_BACKOFF).await?;
                            }
                        }
                    }
                }
            }
        }
    }

    async fn run_reconcile_loop(&self) {
        let mut timer = tokio::time::interval(RECONCILE_INTERVAL);
        timer.tick().await;
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => break,
                _ = timer.tick() => {
                    if let Err(e) = self.reconcile().await {
                        warn!("reconcile failed, resetting: {e}");
                        self.reset().await;
                        if self.bootstrap().await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    fn qualifying(&self, devices: Vec<Device>) -> Vec<Device> {
        devices
            .into_iter()
            .filter(|d| self.profile.predicate().matches(d))
            .collect()
    }

    /// One reconcile pass: poll, converge, re-announce
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the catalog cannot be polled, the
    /// qualifying set is empty, or a broker operation fails; the caller
    /// resets and re-bootstraps
    pub async fn reconcile(&self) -> Result<()> {
        let matching = self.qualifying(self.catalog.devices_all().await?);
        if matching.is_empty() {
            return Err(Error::Transport(
                "no qualifying devices left in the catalog".to_string(),
            ));
        }
        self.reconcile_with(matching).await?;
        self.announce().await;
        self.publish_roster().await;
        Ok(())
    }

    /// Converge subscriptions onto `matching`. Holds the state lock for the
    /// whole pass, so dispatch never observes a half-applied set.
    ///
    /// # Errors
    ///
    /// Returns an error when a broker connection or subscription fails
    pub async fn reconcile_with(&self, matching: Vec<Device>) -> Result<()> {
        let mut state = self.state.lock().await;
        let EngineState {
            home,
            brokers,
            devices,
            topics,
        } = &mut *state;

        let desired: BTreeSet<String> = matching.iter().map(|d| d.device_id.clone()).collect();
        let current: BTreeSet<String> = devices.keys().cloned().collect();
        if desired == current {
            return Ok(());
        }

        // Departed devices first.
        for device_id in current.difference(&desired) {
            let Some(entry) = devices.remove(device_id) else {
                continue;
            };
            let host = &entry.plan.broker.host;
            for topic in &entry.plan.topics {
                topics.remove(&(host.clone(), topic.clone()));
                if let Some(broker) = brokers.get_mut(host) {
                    if broker.topics.remove(topic) {
                        if let Err(e) = broker.conn.unsubscribe(topic).await {
                            warn!(topic = %topic, "unsubscribe failed: {e}");
                        }
                    }
                }
            }
            debug!(device = %device_id, "device dropped");
        }

        // Brokers left without topics go away; the home connection is kept
        // alive regardless.
        let empty: Vec<String> = brokers
            .iter()
            .filter(|(_, entry)| entry.topics.is_empty())
            .map(|(host, _)| host.clone())
            .collect();
        for host in empty {
            if let Some(entry) = brokers.remove(&host) {
                if host != self.home_addr.host {
                    entry.conn.disconnect().await;
                    debug!(broker = %host, "broker connection torn down");
                }
            }
        }

        // New devices.
        for device in matching {
            if current.contains(&device.device_id) {
                continue;
            }
            let Some(plan) = self.profile.plan(&device) else {
                continue;
            };
            let host = plan.broker.host.clone();

            if !brokers.contains_key(&host) {
                let conn = if plan.broker == self.home_addr {
                    home.clone().ok_or_else(|| {
                        Error::Transport("home broker connection not open".to_string())
                    })?
                } else {
                    Arc::new(
                        self.connector
                            .connect(&plan.broker, self.inbound_tx.clone())
                            .await?,
                    )
                };
                brokers.insert(
                    host.clone(),
                    BrokerEntry {
                        conn,
                        topics: HashSet::new(),
                    },
                );
            }
            let Some(broker) = brokers.get_mut(&host) else {
                continue;
            };
            for topic in &plan.topics {
                if broker.topics.insert(topic.clone()) {
                    broker.conn.subscribe(topic).await?;
                }
                topics.insert((host.clone(), topic.clone()), device.device_id.clone());
            }

            debug!(device = %device.device_id, broker = %host, "device adopted");
            let controller = self.profile.controller(&device);
            devices.insert(device.device_id.clone(), DeviceEntry { plan, controller });
        }

        Ok(())
    }

    /// Drop every subscription and external connection; the home connection
    /// stays open for the next bootstrap
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let EngineState {
            brokers,
            devices,
            topics,
            ..
        } = &mut *state;

        for (host, entry) in brokers.drain() {
            for topic in &entry.topics {
                if let Err(e) = entry.conn.unsubscribe(topic).await {
                    debug!(topic = %topic, "unsubscribe during reset failed: {e}");
                }
            }
            if host != self.home_addr.host {
                entry.conn.disconnect().await;
            }
        }
        devices.clear();
        topics.clear();
        info!("engine reset");
    }

    /// Refresh the service's own catalog registration; failures are logged,
    /// the subscriptions stay as they are
    async fn announce(&self) {
        let registration = self.profile.registration(&self.home_addr);
        if let Err(e) = self.catalog.register_service(&registration).await {
            warn!("service registration not refreshed: {e}");
        }
    }

    /// Publish the connected-device roster, when the profile wants one
    async fn publish_roster(&self) {
        let Some(topic) = self.profile.roster_topic() else {
            return;
        };
        let (conn, body) = {
            let state = self.state.lock().await;
            let Some(conn) = state.home.clone() else {
                return;
            };
            let mut ids: Vec<String> = state.devices.keys().cloned().collect();
            ids.sort();
            (
                conn,
                json!({"devices": ids, "t": chrono::Utc::now().timestamp()}),
            )
        };
        match serde_json::to_vec(&body) {
            Ok(payload) => {
                if let Err(e) = conn.publish(topic, payload).await {
                    warn!(topic, "roster publish failed: {e}");
                }
            }
            Err(e) => warn!("roster not serializable: {e}"),
        }
    }

    /// Route one inbound message through its device's controller
    async fn dispatch(&self, message: Inbound) {
        let mut state = self.state.lock().await;
        let key = (message.broker.clone(), message.topic.clone());
        let Some(device_id) = state.topics.get(&key).cloned() else {
            return;
        };
        let Some(event) = SensorEvent::parse(&message.payload) else {
            debug!(topic = %message.topic, "undecodable event dropped");
            return;
        };

        let EngineState {
            home,
            brokers,
            devices,
            ..
        } = &mut *state;
        let Some(entry) = devices.get_mut(&device_id) else {
            return;
        };

        for command in entry.controller.handle(&event, Instant::now()) {
            let conn = match command.route {
                Route::Device => brokers.get(&message.broker).map(|b| b.conn.clone()),
                Route::Home => home.clone(),
            };
            let Some(conn) = conn else { continue };
            let payload = match serde_json::to_vec(&command.body) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("command not serializable: {e}");
                    continue;
                }
            };
            if let Err(e) = conn.publish(&command.topic, payload).await {
                warn!(topic = %command.topic, "command publish failed: {e}");
            }
        }
    }

    /// Final teardown: every connection goes, home included
    async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        for (host, entry) in state.brokers.drain() {
            if host != self.home_addr.host {
                entry.conn.disconnect().await;
            }
        }
        if let Some(home) = state.home.take() {
            home.disconnect().await;
        }
        state.devices.clear();
        state.topics.clear();
        info!("engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex as StdMutex;

    use crate::controller::Command;
    use crate::db::ProtocolEndpoints;

    /// Records every transport operation as `"<op> <host> [<topic>]"`
    #[derive(Clone, Default)]
    struct RecordingConnector {
        log: Arc<StdMutex<Vec<String>>>,
    }

    struct RecordingConnection {
        host: String,
        log: Arc<StdMutex<Vec<String>>>,
    }

    impl RecordingConnector {
        fn entries(&self, op: &str) -> Vec<String> {
            self.log
                .lock()
                .unwrap()
                .iter()
                .filter(|line| line.starts_with(op))
                .cloned()
                .collect()
        }
    }

    #[async_trait]
    impl Connector for RecordingConnector {
        type Conn = RecordingConnection;

        async fn connect(
            &self,
            addr: &BrokerAddr,
            _inbound: mpsc::Sender<Inbound>,
        ) -> Result<RecordingConnection> {
            self.log
                .lock()
                .unwrap()
                .push(format!("connect {}", addr.host));
            Ok(RecordingConnection {
                host: addr.host.clone(),
                log: self.log.clone(),
            })
        }
    }

    #[async_trait]
    impl Connection for RecordingConnection {
        async fn subscribe(&self, topic: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("subscribe {} {topic}", self.host));
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("unsubscribe {} {topic}", self.host));
            Ok(())
        }

        async fn publish(&self, topic: &str, _payload: Vec<u8>) -> Result<()> {
            self.log
                .lock()
                .unwrap()
                .push(format!("publish {} {topic}", self.host));
            Ok(())
        }

        async fn disconnect(&self) {
            self.log
                .lock()
                .unwrap()
                .push(format!("disconnect {}", self.host));
        }
    }

    struct IdleController;

    impl DeviceController for IdleController {
        fn handle(&mut self, _event: &SensorEvent, _now: Instant) -> Vec<Command> {
            Vec::new()
        }
    }

    struct TestProfile {
        predicate: CapabilityPredicate,
    }

    impl TestProfile {
        fn new() -> Self {
            Self {
                predicate: CapabilityPredicate::new("YUN", ["Temp"]),
            }
        }
    }

    impl ServiceProfile for TestProfile {
        fn predicate(&self) -> &CapabilityPredicate {
            &self.predicate
        }

        fn plan(&self, device: &Device) -> Option<DevicePlan> {
            DevicePlan::from_mqtt(device)
        }

        fn controller(&self, _device: &Device) -> Box<dyn DeviceController> {
            Box::new(IdleController)
        }

        fn registration(&self, _home: &BrokerAddr) -> ServiceRegistration {
            ServiceRegistration {
                service_id: "test".to_string(),
                description: "test".to_string(),
                end_points: crate::db::ServiceEndpoints::default(),
            }
        }
    }

    fn device_on(id: &str, host: &str) -> Device {
        Device {
            device_id: id.to_string(),
            end_points: BTreeMap::from([(
                Protocol::Mqtt,
                ProtocolEndpoints {
                    ip: host.to_string(),
                    port: 1883,
                    end_points: BTreeMap::from([(
                        Action::Subscribe,
                        vec![format!("temperature/{id}")],
                    )]),
                },
            )]),
            available_resources: BTreeMap::from([(Protocol::Mqtt, vec!["Temp".to_string()])]),
            last_seen: 0,
        }
    }

    fn home() -> BrokerAddr {
        BrokerAddr {
            host: "home.local".to_string(),
            port: 1883,
        }
    }

    fn engine(
        connector: RecordingConnector,
    ) -> Engine<RecordingConnector, TestProfile> {
        Engine::new(
            connector,
            TestProfile::new(),
            CatalogClient::new("http://127.0.0.1:9").unwrap(),
            home(),
            CancellationToken::new(),
        )
    }

    async fn open_home<P: ServiceProfile>(engine: &Engine<RecordingConnector, P>) {
        let conn = engine
            .connector
            .connect(&engine.home_addr, engine.inbound_tx.clone())
            .await
            .unwrap();
        engine.state.lock().await.home = Some(Arc::new(conn));
    }

    #[tokio::test]
    async fn overlap_swaps_topics_without_reconnecting() {
        let connector = RecordingConnector::default();
        let engine = engine(connector.clone());
        open_home(&engine).await;

        engine
            .reconcile_with(vec![device_on("YUN-a", "ext.local"), device_on("YUN-b", "ext.local")])
            .await
            .unwrap();
        engine
            .reconcile_with(vec![device_on("YUN-b", "ext.local"), device_on("YUN-c", "ext.local")])
            .await
            .unwrap();

        // One connection to the external broker, ever.
        assert_eq!(connector.entries("connect ext.local").len(), 1);
        assert_eq!(connector.entries("disconnect ext.local").len(), 0);
        assert_eq!(
            connector.entries("unsubscribe"),
            vec!["unsubscribe ext.local temperature/YUN-a"]
        );

        let state = engine.state.lock().await;
        let held = &state.brokers["ext.local"].topics;
        assert_eq!(
            *held,
            HashSet::from([
                "temperature/YUN-b".to_string(),
                "temperature/YUN-c".to_string()
            ])
        );
        assert_eq!(state.devices.len(), 2);
    }

    #[tokio::test]
    async fn emptied_broker_is_torn_down() {
        let connector = RecordingConnector::default();
        let engine = engine(connector.clone());
        open_home(&engine).await;

        engine
            .reconcile_with(vec![device_on("YUN-a", "ext.local")])
            .await
            .unwrap();
        engine.reconcile_with(Vec::new()).await.unwrap();

        assert_eq!(
            connector.entries("disconnect"),
            vec!["disconnect ext.local"]
        );
        let state = engine.state.lock().await;
        assert!(state.brokers.is_empty());
        assert!(state.devices.is_empty());
        assert!(state.topics.is_empty());
    }

    #[tokio::test]
    async fn reset_keeps_the_home_connection() {
        let connector = RecordingConnector::default();
        let engine = engine(connector.clone());
        open_home(&engine).await;

        engine
            .reconcile_with(vec![
                device_on("YUN-a", "ext.local"),
                device_on("YUN-b", "home.local"),
            ])
            .await
            .unwrap();
        engine.reset().await;

        // The external connection went away, home never did.
        assert_eq!(
            connector.entries("disconnect"),
            vec!["disconnect ext.local"]
        );
        let state = engine.state.lock().await;
        assert!(state.home.is_some());
        assert!(state.brokers.is_empty());
        assert!(state.devices.is_empty());

        // Devices on the home broker reuse the standing connection.
        drop(state);
        engine
            .reconcile_with(vec![device_on("YUN-b", "home.local")])
            .await
            .unwrap();
        assert_eq!(connector.entries("connect").len(), 2); // home + ext only
    }

    #[tokio::test]
    async fn predicate_requires_marker_and_every_tag() {
        let predicate = CapabilityPredicate::new("YUN", ["Temp", "Led"]);

        let mut qualifying = device_on("YUN-a", "ext.local");
        qualifying
            .available_resources
            .insert(Protocol::Mqtt, vec!["Temp".to_string(), "Led".to_string()]);
        assert!(predicate.matches(&qualifying));

        // Missing one tag.
        assert!(!predicate.matches(&device_on("YUN-a", "ext.local")));

        // Marker absent from the id.
        let mut unmarked = qualifying.clone();
        unmarked.device_id = "esp-a".to_string();
        assert!(!predicate.matches(&unmarked));
    }

    #[tokio::test]
    async fn dispatch_routes_commands_by_origin() {
        struct EchoController;
        impl DeviceController for EchoController {
            fn handle(&mut self, _event: &SensorEvent, _now: Instant) -> Vec<Command> {
                vec![
                    Command::device("led/YUN-a", json!({"n": "led", "v": 1, "u": null})),
                    Command::home("status", json!({"ok": true})),
                ]
            }
        }

        struct EchoProfile {
            predicate: CapabilityPredicate,
        }
        impl ServiceProfile for EchoProfile {
            fn predicate(&self) -> &CapabilityPredicate {
                &self.predicate
            }
            fn plan(&self, device: &Device) -> Option<DevicePlan> {
                DevicePlan::from_mqtt(device)
            }
            fn controller(&self, _device: &Device) -> Box<dyn DeviceController> {
                Box::new(EchoController)
            }
            fn registration(&self, _home: &BrokerAddr) -> ServiceRegistration {
                ServiceRegistration {
                    service_id: "echo".to_string(),
                    description: "echo".to_string(),
                    end_points: crate::db::ServiceEndpoints::default(),
                }
            }
        }

        let connector = RecordingConnector::default();
        let engine = Engine::new(
            connector.clone(),
            EchoProfile {
                predicate: CapabilityPredicate::new("YUN", ["Temp"]),
            },
            CatalogClient::new("http://127.0.0.1:9").unwrap(),
            home(),
            CancellationToken::new(),
        );
        open_home(&engine).await;
        engine
            .reconcile_with(vec![device_on("YUN-a", "ext.local")])
            .await
            .unwrap();

        engine
            .dispatch(Inbound {
                broker: "ext.local".to_string(),
                topic: "temperature/YUN-a".to_string(),
                payload: json!({"n": "temperature", "v": 23.0, "u": "C"})
                    .to_string()
                    .into_bytes(),
            })
            .await;

        // The actuator command went to the device's broker, the status to home.
        assert_eq!(
            connector.entries("publish"),
            vec![
                "publish ext.local led/YUN-a".to_string(),
                "publish home.local status".to_string(),
            ]
        );
    }
}
