//! Shared test utilities

use std::sync::Arc;

use hearth_hub::catalog::{self, CatalogState};
use hearth_hub::db::{self, DbPool};
use hearth_hub::transport::BrokerAddr;

/// Set up an in-memory test database
#[must_use]
pub fn setup_test_db() -> DbPool {
    db::init_memory().expect("failed to init test db")
}

/// Broker address handed out by the test catalog
#[must_use]
pub fn test_broker() -> BrokerAddr {
    BrokerAddr {
        host: "broker.test".to_string(),
        port: 1883,
    }
}

/// Build a catalog router over an in-memory store
#[must_use]
pub fn build_test_router(db: DbPool) -> axum::Router {
    catalog::router(Arc::new(CatalogState::new(db, test_broker())))
}
