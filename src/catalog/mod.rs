//! Resource catalog: HTTP registration surface plus background upkeep
//!
//! Every participant of the testbed registers here and re-registers
//! periodically; devices and services that stop doing so are purged by the
//! eviction sweep. Devices may alternatively register through the pub/sub
//! bridge in [`crate::bridge`].

pub mod registration;
mod routes;

pub use routes::router;

use std::sync::Arc;

use axum::Router;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::bridge::RegistrationBridge;
use crate::db::{DbPool, DeviceRepo, EVICTION_PERIOD, ServiceRepo, UserRepo};
use crate::transport::{BrokerAddr, MqttConnector};
use crate::{Error, Result};

/// Shared state for catalog handlers
pub struct CatalogState {
    pub devices: DeviceRepo,
    pub services: ServiceRepo,
    pub users: UserRepo,
    /// Broker address handed out to clients on `/catalog/broker`
    pub broker: BrokerAddr,
}

impl CatalogState {
    /// Build catalog state over a database pool
    #[must_use]
    pub fn new(db: DbPool, broker: BrokerAddr) -> Self {
        Self {
            devices: DeviceRepo::new(db.clone()),
            services: ServiceRepo::new(db.clone()),
            users: UserRepo::new(db),
            broker,
        }
    }
}

/// Catalog server
pub struct CatalogServer {
    state: Arc<CatalogState>,
    port: u16,
}

impl CatalogServer {
    /// Create a catalog server
    #[must_use]
    pub fn new(db: DbPool, broker: BrokerAddr, port: u16) -> Self {
        Self {
            state: Arc::new(CatalogState::new(db, broker)),
            port,
        }
    }

    fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        routes::router(self.state.clone())
            .layer(cors)
            .layer(TraceLayer::new_for_http())
    }

    /// Run the catalog: one eviction sweep up front, then the HTTP server
    /// with the periodic sweep and the registration bridge alongside
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind or run
    pub async fn run(self) -> Result<()> {
        sweep(&self.state);

        let cancel = CancellationToken::new();
        let sweeper = tokio::spawn(run_eviction_sweep(self.state.clone(), cancel.clone()));

        let bridge = RegistrationBridge::new(
            self.state.devices.clone(),
            self.state.broker.clone(),
            cancel.clone(),
        );
        let connector = MqttConnector::new("hearth-catalog-");
        let bridge_task = tokio::spawn(async move {
            if let Err(e) = bridge.run(&connector).await {
                warn!("registration bridge unavailable: {e}");
            }
        });

        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| Error::Config(format!("failed to bind catalog server: {e}")))?;
        info!(port = self.port, "catalog listening");

        let served = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Config(format!("catalog server error: {e}")));

        cancel.cancel();
        let _ = sweeper.await;
        let _ = bridge_task.await;
        served
    }
}

/// Purge devices and services past the liveness window
fn sweep(state: &CatalogState) {
    let now = Utc::now().timestamp();
    match state.devices.evict_expired(now) {
        Ok(0) => {}
        Ok(purged) => debug!(purged, "expired devices purged"),
        Err(e) => warn!("device eviction failed: {e}"),
    }
    match state.services.evict_expired(now) {
        Ok(0) => {}
        Ok(purged) => debug!(purged, "expired services purged"),
        Err(e) => warn!("service eviction failed: {e}"),
    }
}

async fn run_eviction_sweep(state: Arc<CatalogState>, cancel: CancellationToken) {
    let mut timer = tokio::time::interval(EVICTION_PERIOD);
    timer.tick().await;
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = timer.tick() => sweep(&state),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
    }
}
