//! HTTP client for the catalog

use std::time::Duration;

use tracing::debug;

use crate::catalog::registration::ServiceRegistration;
use crate::db::Device;
use crate::transport::BrokerAddr;
use crate::{Error, Result};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the catalog HTTP surface
#[derive(Clone)]
pub struct CatalogClient {
    base: String,
    http: reqwest::Client,
}

impl CatalogClient {
    /// Create a client against `base`, e.g. `http://127.0.0.1:8080`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built
    pub fn new(base: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::Config(format!("failed to build catalog client: {e}")))?;
        Ok(Self {
            base: base.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    /// Fetch every registered device. An empty catalog answers 404, which is
    /// an empty list here, not a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the catalog is unreachable or
    /// answers with an unexpected status
    pub async fn devices_all(&self) -> Result<Vec<Device>> {
        let url = format!("{}/catalog/devices/all", self.base);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("catalog unreachable: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "catalog answered {} for {url}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| Error::Transport(format!("catalog sent an unreadable device list: {e}")))
    }

    /// Register (or refresh) a service
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the catalog is unreachable or
    /// rejects the registration
    pub async fn register_service(&self, registration: &ServiceRegistration) -> Result<()> {
        let url = format!("{}/catalog/services", self.base);
        let response = self
            .http
            .post(&url)
            .json(registration)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("catalog unreachable: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Transport(format!(
                "catalog rejected the service registration with {}",
                response.status()
            )));
        }
        debug!(service = %registration.service_id, "service registration refreshed");
        Ok(())
    }

    /// Ask the catalog which broker coordinates the testbed
    ///
    /// # Errors
    ///
    /// Returns [`Error::Transport`] when the catalog is unreachable or the
    /// answer is unreadable
    pub async fn broker(&self) -> Result<BrokerAddr> {
        let url = format!("{}/catalog/broker", self.base);
        self.http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("catalog unreachable: {e}")))?
            .error_for_status()
            .map_err(|e| Error::Transport(format!("broker lookup failed: {e}")))?
            .json()
            .await
            .map_err(|e| Error::Transport(format!("catalog sent an unreadable broker: {e}")))
    }
}
