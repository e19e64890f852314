//! Hub and Viewer Configuration Settings
//!
//! Both binaries read their settings from environment variables (after a
//! `.env` file has been loaded). Unset or unparseable numeric values fall
//! back to defaults; empty URLs and unknown symbols are errors.

use std::path::PathBuf;
use std::time::Duration;

use crate::domain::display::Locale;
use crate::domain::symbols::{TrackedSymbol, catalog, select};

/// Default upstream chart API host.
pub const DEFAULT_UPSTREAM_URL: &str = "https://query1.finance.yahoo.com";

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("environment variable {key} has invalid value {value:?}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },
}

// =============================================================================
// Server
// =============================================================================

/// Listener and timing settings for the hub.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Market data HTTP/WebSocket port.
    pub port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Time between refresh cycles.
    pub refresh_interval: Duration,
    /// Per-symbol fetch deadline.
    pub fetch_timeout: Duration,
    /// Age after which the stored snapshot is reported as cached.
    pub stale_after: Duration,
    /// Time between heartbeat sweeps.
    pub heartbeat_interval: Duration,
    /// Pull endpoint memo lifetime.
    pub pull_memo_ttl: Duration,
    /// Capacity of each subscriber's outbound queue.
    pub subscriber_buffer: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: 3000,
            health_port: 8082,
            refresh_interval: Duration::from_secs(30),
            fetch_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(90),
            heartbeat_interval: Duration::from_secs(30),
            pull_memo_ttl: Duration::from_secs(900),
            subscriber_buffer: 32,
        }
    }
}

/// Upstream quote provider settings.
#[derive(Debug, Clone)]
pub struct UpstreamSettings {
    /// Primary chart API base URL.
    pub primary_url: String,
    /// Optional backup chart API base URL.
    pub backup_url: Option<String>,
    /// Region query parameter.
    pub region: String,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            primary_url: DEFAULT_UPSTREAM_URL.to_string(),
            backup_url: None,
            region: "US".to_string(),
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Ports and timings.
    pub server: ServerSettings,
    /// Quote provider.
    pub upstream: UpstreamSettings,
    /// Symbols refreshed each cycle, in display order.
    pub symbols: Vec<TrackedSymbol>,
}

impl RelayConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is empty or `TICKER_SYMBOLS` names a symbol
    /// outside the catalog.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ServerSettings::default();
        let server = ServerSettings {
            port: parse_or(&lookup, "TICKER_HUB_PORT", defaults.port),
            health_port: parse_or(&lookup, "TICKER_HUB_HEALTH_PORT", defaults.health_port),
            refresh_interval: secs_or(
                &lookup,
                "TICKER_REFRESH_INTERVAL_SECS",
                defaults.refresh_interval,
            ),
            fetch_timeout: secs_or(&lookup, "TICKER_FETCH_TIMEOUT_SECS", defaults.fetch_timeout),
            stale_after: secs_or(&lookup, "TICKER_STALE_AFTER_SECS", defaults.stale_after),
            heartbeat_interval: secs_or(
                &lookup,
                "TICKER_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            pull_memo_ttl: secs_or(&lookup, "TICKER_PULL_MEMO_SECS", defaults.pull_memo_ttl),
            subscriber_buffer: parse_or(
                &lookup,
                "TICKER_SUBSCRIBER_BUFFER",
                defaults.subscriber_buffer,
            ),
        };

        let upstream = UpstreamSettings {
            primary_url: url_or(&lookup, "MARKET_UPSTREAM_URL", DEFAULT_UPSTREAM_URL)?,
            backup_url: optional_url(&lookup, "MARKET_BACKUP_UPSTREAM_URL")?,
            region: lookup("MARKET_UPSTREAM_REGION")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| UpstreamSettings::default().region),
        };

        let symbols = match lookup("TICKER_SYMBOLS").filter(|v| !v.trim().is_empty()) {
            Some(list) => parse_symbols(&list)?,
            None => catalog(),
        };

        Ok(Self {
            server,
            upstream,
            symbols,
        })
    }
}

fn parse_symbols(list: &str) -> Result<Vec<TrackedSymbol>, ConfigError> {
    let requested: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if requested.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "TICKER_SYMBOLS".to_string(),
            value: list.to_string(),
            reason: "no symbols listed".to_string(),
        });
    }

    select(&requested).map_err(|unknown| ConfigError::InvalidValue {
        key: "TICKER_SYMBOLS".to_string(),
        value: list.to_string(),
        reason: format!("unknown symbol {unknown}"),
    })
}

// =============================================================================
// Viewer
// =============================================================================

/// Complete viewer configuration.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    /// Push channel URL.
    pub ws_url: String,
    /// Pull endpoint URL.
    pub pull_url: String,
    /// Delay between reconnect attempts.
    pub reconnect_delay: Duration,
    /// Reconnect attempts before falling back to pull.
    pub max_reconnect_attempts: u32,
    /// Time between client pings.
    pub ping_interval: Duration,
    /// Dead-peer deadline for pongs, off when `None`.
    pub pong_timeout: Option<Duration>,
    /// Pull interval in degraded mode.
    pub pull_interval: Duration,
    /// Snapshot cache file.
    pub cache_path: PathBuf,
    /// Display language.
    pub locale: Locale,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:3000/ws/market-data".to_string(),
            pull_url: "http://localhost:3000/api/market-data".to_string(),
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 10,
            ping_interval: Duration::from_secs(30),
            pong_timeout: None,
            pull_interval: Duration::from_secs(60),
            cache_path: PathBuf::from(".ticker-hub/market-ticker.json"),
            locale: Locale::default(),
        }
    }
}

impl ViewerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a URL is set but empty or the locale is unknown.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// See [`Self::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let locale = match lookup("TICKER_LOCALE").filter(|v| !v.trim().is_empty()) {
            Some(tag) => Locale::parse(&tag).ok_or_else(|| ConfigError::InvalidValue {
                key: "TICKER_LOCALE".to_string(),
                value: tag.clone(),
                reason: "expected zh or en".to_string(),
            })?,
            None => defaults.locale,
        };

        Ok(Self {
            ws_url: url_or(&lookup, "TICKER_WS_URL", &defaults.ws_url)?,
            pull_url: url_or(&lookup, "TICKER_PULL_URL", &defaults.pull_url)?,
            reconnect_delay: lookup("TICKER_RECONNECT_DELAY_MS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map_or(defaults.reconnect_delay, Duration::from_millis),
            max_reconnect_attempts: parse_or(
                &lookup,
                "TICKER_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            ping_interval: secs_or(&lookup, "TICKER_PING_INTERVAL_SECS", defaults.ping_interval),
            pong_timeout: lookup("TICKER_PONG_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            pull_interval: secs_or(&lookup, "TICKER_PULL_INTERVAL_SECS", defaults.pull_interval),
            cache_path: lookup("TICKER_CACHE_PATH")
                .filter(|v| !v.trim().is_empty())
                .map_or(defaults.cache_path, PathBuf::from),
            locale,
        })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn secs_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .map_or(default, Duration::from_secs)
}

fn url_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: &str,
) -> Result<String, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(value.trim().trim_end_matches('/').to_string()),
        None => Ok(default.to_string()),
    }
}

fn optional_url(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<String>, ConfigError> {
    match lookup(key) {
        Some(value) if value.trim().is_empty() => Err(ConfigError::EmptyValue(key.to_string())),
        Some(value) => Ok(Some(value.trim().trim_end_matches('/').to_string())),
        None => Ok(None),
    }
}
