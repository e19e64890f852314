//! Pull Client
//!
//! HTTP implementation of [`PullSource`] against the hub's
//! `GET /api/market-data` endpoint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::application::ports::{PullError, PullSource};
use crate::domain::fallback::TieredSnapshot;
use crate::infrastructure::server::PullResponse;

/// Reqwest-backed pull client.
#[derive(Debug, Clone)]
pub struct PullClient {
    client: Client,
    url: String,
}

impl PullClient {
    /// Create a client for the full endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ticker-viewer/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PullSource for PullClient {
    async fn pull(&self) -> Result<TieredSnapshot, PullError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PullError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PullError::Status {
                code: status.as_u16(),
            });
        }

        let body: PullResponse = response.json().await.map_err(|e| PullError::Decode {
            message: e.to_string(),
        })?;
        Ok(body.into_tiered())
    }
}
