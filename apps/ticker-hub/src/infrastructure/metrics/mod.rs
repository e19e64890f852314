//! Prometheus Metrics Module
//!
//! Exposes hub metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Refresh**: Cycle outcomes, durations and per-symbol failures
//! - **Fan-out**: Snapshots published, frames dropped, subscriber evictions
//! - **Pull**: Pull endpoint responses by source
//! - **Client**: Channel reconnect attempts (viewer side)
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Later calls return the handle installed by the first.
///
/// # Errors
///
/// Returns error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    // Refresh cycle
    describe_counter!(
        "ticker_hub_refresh_cycles_total",
        "Refresh cycles by outcome"
    );
    describe_histogram!(
        "ticker_hub_refresh_duration_seconds",
        "Wall time of a refresh cycle from fetch to publish"
    );
    describe_counter!(
        "ticker_hub_symbol_failures_total",
        "Per-symbol fetch failures by error kind"
    );
    describe_gauge!(
        "ticker_hub_snapshot_quotes",
        "Number of quotes in the current snapshot"
    );

    // Fan-out
    describe_counter!(
        "ticker_hub_snapshots_published_total",
        "Snapshot frames queued to subscribers"
    );
    describe_counter!(
        "ticker_hub_messages_dropped_total",
        "Frames dropped because a subscriber queue was full or closed"
    );
    describe_counter!(
        "ticker_hub_subscriber_evictions_total",
        "Subscribers removed by reason"
    );
    describe_gauge!(
        "ticker_hub_subscribers",
        "Number of connected push-channel subscribers"
    );

    // Pull endpoint
    describe_counter!(
        "ticker_hub_pull_requests_total",
        "Pull endpoint responses by source"
    );

    // Client
    describe_counter!(
        "ticker_hub_client_reconnects_total",
        "Push-channel reconnect attempts scheduled by the client"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Metric labels for refresh outcomes.
#[derive(Debug, Clone, Copy)]
pub enum RefreshLabel {
    /// Store replaced.
    Updated,
    /// Every symbol failed.
    NoData,
    /// Another cycle was in flight.
    Skipped,
}

impl RefreshLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Updated => "updated",
            Self::NoData => "no_data",
            Self::Skipped => "skipped",
        }
    }
}

/// Metric labels for subscriber removal.
#[derive(Debug, Clone, Copy)]
pub enum EvictionReason {
    /// Outbound queue full or closed.
    SendFailed,
    /// No pong between two sweeps.
    HeartbeatTimeout,
    /// Peer closed the connection.
    Disconnected,
    /// Transport error.
    Error,
}

impl EvictionReason {
    const fn as_str(self) -> &'static str {
        match self {
            Self::SendFailed => "send_failed",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::Disconnected => "disconnected",
            Self::Error => "error",
        }
    }
}

/// Metric labels for pull responses.
#[derive(Debug, Clone, Copy)]
pub enum PullLabel {
    /// Served from the memo.
    Memo,
    /// Served from the snapshot store.
    Store,
    /// Served from the bootstrap snapshot.
    Bootstrap,
}

impl PullLabel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Memo => "memo",
            Self::Store => "store",
            Self::Bootstrap => "bootstrap",
        }
    }
}

/// Record a finished refresh cycle.
pub fn record_refresh(outcome: RefreshLabel) {
    counter!(
        "ticker_hub_refresh_cycles_total",
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record refresh cycle duration.
pub fn record_refresh_duration(duration: Duration) {
    histogram!("ticker_hub_refresh_duration_seconds").record(duration.as_secs_f64());
}

/// Record a per-symbol fetch failure.
pub fn record_symbol_failure(symbol: &str, kind: &'static str) {
    counter!(
        "ticker_hub_symbol_failures_total",
        "symbol" => symbol.to_string(),
        "kind" => kind
    )
    .increment(1);
}

/// Update the current snapshot size.
pub fn set_snapshot_quotes(count: f64) {
    gauge!("ticker_hub_snapshot_quotes").set(count);
}

/// Record snapshot frames queued to subscribers.
pub fn record_snapshots_published(count: u64) {
    counter!("ticker_hub_snapshots_published_total").increment(count);
}

/// Record frames dropped for unhealthy subscribers.
pub fn record_messages_dropped(count: u64) {
    counter!("ticker_hub_messages_dropped_total").increment(count);
}

/// Record subscriber removal.
pub fn record_eviction(reason: EvictionReason) {
    counter!(
        "ticker_hub_subscriber_evictions_total",
        "reason" => reason.as_str()
    )
    .increment(1);
}

/// Update the subscriber count.
pub fn set_subscribers(count: f64) {
    gauge!("ticker_hub_subscribers").set(count);
}

/// Record a pull endpoint response.
pub fn record_pull(source: PullLabel) {
    counter!(
        "ticker_hub_pull_requests_total",
        "source" => source.as_str()
    )
    .increment(1);
}

/// Record a scheduled client reconnect.
pub fn record_client_reconnect() {
    counter!("ticker_hub_client_reconnects_total").increment(1);
}

// =============================================================================
// Tests
// =============================================================================
