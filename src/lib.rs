//! hearth-hub: an IoT testbed hub
//!
//! One binary, four roles: the resource catalog (device, service, and user
//! registry with liveness-based eviction and a pub/sub registration bridge)
//! and three consumer services (temperature mean, alarm, smart home) that
//! discover devices through the catalog and converge their broker
//! subscriptions onto the qualifying set.

pub mod bridge;
pub mod catalog;
pub mod config;
pub mod controller;
pub mod db;
pub mod engine;
pub mod error;
pub mod services;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
