//! Chart API Source
//!
//! Fetches `GET {base}/v8/finance/chart/{symbol}?region=..&interval=1d&range=1d`
//! and derives a quote from `chart.result[0].meta`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Url;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::quote::Quote;
use crate::domain::symbols::TrackedSymbol;

const DEFAULT_CURRENCY: &str = "USD";
const MAX_ERROR_BODY: usize = 512;

/// Provider construction error.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Base URL is not a usable HTTP base.
    #[error("Invalid upstream URL {url}: {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Chart API connection settings.
#[derive(Debug, Clone)]
pub struct ChartApiConfig {
    /// Base URL, e.g. `https://query1.finance.yahoo.com`.
    pub base_url: String,
    /// Region query parameter.
    pub region: String,
    /// Overall request timeout.
    pub timeout: Duration,
}

impl ChartApiConfig {
    /// Create settings for a base URL with the US region.
    #[must_use]
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            region: "US".to_string(),
            timeout,
        }
    }

    /// Override the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
}

// =============================================================================
// Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
    #[serde(default)]
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: ChartMeta,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChartMeta {
    #[serde(default, with = "rust_decimal::serde::float_option")]
    regular_market_price: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    previous_close: Option<Decimal>,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    chart_previous_close: Option<Decimal>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    description: String,
}

// =============================================================================
// Source
// =============================================================================

/// Quote source backed by the chart API.
#[derive(Debug, Clone)]
pub struct ChartApiSource {
    http_client: reqwest::Client,
    base_url: Url,
    region: String,
}

impl ChartApiSource {
    /// Create a source.
    ///
    /// # Errors
    ///
    /// Returns error if the base URL is invalid or the client cannot be built.
    pub fn new(config: &ChartApiConfig) -> Result<Self, ProviderError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| ProviderError::InvalidUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProviderError::InvalidUrl {
                url: config.base_url.clone(),
                reason: "cannot be a base".to_string(),
            });
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("ticker-hub/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http_client,
            base_url,
            region: config.region.clone(),
        })
    }

    fn chart_url(&self, symbol: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v8", "finance", "chart", symbol]);
        }
        url
    }
}

#[async_trait]
impl QuoteSource for ChartApiSource {
    async fn fetch_quote(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError> {
        let url = self.chart_url(&symbol.symbol);
        tracing::debug!(symbol = %symbol.symbol, %url, "Fetching chart");

        let response = self
            .http_client
            .get(url)
            .query(&[
                ("region", self.region.as_str()),
                ("interval", "1d"),
                ("range", "1d"),
            ])
            .send()
            .await
            .map_err(|e| SourceError::Http {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: String = response
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(MAX_ERROR_BODY)
                .collect();
            return Err(SourceError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let envelope: ChartEnvelope = response.json().await.map_err(|e| SourceError::Decode {
            message: e.to_string(),
        })?;

        quote_from_chart(symbol, envelope.chart)
    }
}

fn quote_from_chart(symbol: &TrackedSymbol, chart: ChartBody) -> Result<Quote, SourceError> {
    if let Some(error) = chart.error {
        return Err(SourceError::Upstream {
            code: error.code,
            description: error.description,
        });
    }

    let meta = chart
        .result
        .and_then(|results| results.into_iter().next())
        .map(|result| result.meta)
        .ok_or_else(|| SourceError::NoResult {
            symbol: symbol.symbol.clone(),
        })?;

    let price = meta
        .regular_market_price
        .ok_or_else(|| SourceError::MissingField {
            symbol: symbol.symbol.clone(),
            field: "regularMarketPrice",
        })?;
    let previous_close = meta
        .previous_close
        .or(meta.chart_previous_close)
        .unwrap_or(Decimal::ZERO);
    let currency = meta
        .currency
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

    Ok(Quote::from_prices(symbol, price, previous_close, currency))
}
