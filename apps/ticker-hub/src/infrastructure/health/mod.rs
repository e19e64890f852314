//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, snapshot freshness reporting, and
//! Prometheus metrics. Served on its own port, separate from the public
//! market data endpoints.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (ready once a snapshot exists)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::RefreshCycle;
use crate::domain::fallback::FallbackTier;
use crate::infrastructure::hub::BroadcastHub;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Hub version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Snapshot freshness.
    pub snapshot: SnapshotStatus,
    /// Push channel subscribers.
    pub subscribers: SubscriberStatus,
    /// Refresh cycle status.
    pub refresh: RefreshStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Serving live data.
    Healthy,
    /// Serving a retained snapshot past its freshness window.
    Degraded,
    /// Serving reference data only.
    Unhealthy,
}

impl From<FallbackTier> for HealthStatus {
    fn from(tier: FallbackTier) -> Self {
        match tier {
            FallbackTier::Live => Self::Healthy,
            FallbackTier::Cached => Self::Degraded,
            FallbackTier::Bootstrap => Self::Unhealthy,
        }
    }
}

/// Snapshot freshness.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotStatus {
    /// Tier a subscriber would receive now.
    pub tier: FallbackTier,
    /// Quotes in the stored snapshot.
    pub quotes: usize,
    /// Seconds since the last accepted write, if any.
    pub age_secs: Option<u64>,
    /// Capture time of the stored snapshot, if any.
    pub captured_at: Option<DateTime<Utc>>,
}

/// Subscriber counts.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberStatus {
    /// Currently registered.
    pub connected: usize,
    /// Accepted since start.
    pub connected_total: u64,
    /// Evicted since start.
    pub evicted_total: u64,
}

/// Refresh cycle status.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshStatus {
    /// Current phase.
    pub state: &'static str,
    /// Tracked symbol count.
    pub symbols: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    hub: Arc<BroadcastHub>,
    cycle: Arc<RefreshCycle>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, hub: Arc<BroadcastHub>, cycle: Arc<RefreshCycle>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            hub,
            cycle,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, health_router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the health router.
pub fn health_router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    // Ready once the first refresh has produced data
    if state.cycle.reader().read().is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let view = state.cycle.reader().read();
    let tier = state.hub.current().tier;
    let stats = state.hub.stats();

    let snapshot = SnapshotStatus {
        tier,
        quotes: view.snapshot.len(),
        age_secs: view.age.map(|age| age.as_secs()),
        captured_at: (!view.is_empty()).then_some(view.snapshot.captured_at),
    };

    HealthResponse {
        status: HealthStatus::from(tier),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        snapshot,
        subscribers: SubscriberStatus {
            connected: state.hub.subscriber_count(),
            connected_total: stats.connected_total,
            evicted_total: stats.evicted_total,
        },
        refresh: RefreshStatus {
            state: state.cycle.state().as_str(),
            symbols: state.cycle.symbols().len(),
        },
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
