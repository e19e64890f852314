//! Relay HTTP Server
//!
//! Public endpoints of the hub.
//!
//! # Endpoints
//!
//! - `GET /ws/market-data` - WebSocket push channel
//! - `GET /api/market-data` - Memoized pull fallback

mod pull;
mod socket;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use pull::{PullEndpoint, PullResponse};

use crate::application::services::RefreshCycle;
use crate::infrastructure::hub::BroadcastHub;

// =============================================================================
// State
// =============================================================================

/// Shared state for the relay endpoints.
#[derive(Debug)]
pub struct RelayState {
    hub: Arc<BroadcastHub>,
    cycle: Arc<RefreshCycle>,
    pull: PullEndpoint,
    cancel: CancellationToken,
}

impl RelayState {
    /// Create relay state.
    #[must_use]
    pub fn new(
        hub: Arc<BroadcastHub>,
        cycle: Arc<RefreshCycle>,
        pull_memo_ttl: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            hub,
            cycle,
            pull: PullEndpoint::new(pull_memo_ttl),
            cancel,
        }
    }
}

/// Build the relay router.
pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/ws/market-data", get(market_data_ws))
        .route("/api/market-data", get(market_data_pull))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

/// Relay HTTP server.
#[derive(Debug)]
pub struct RelayServer {
    port: u16,
    state: Arc<RelayState>,
}

impl RelayServer {
    /// Create a relay server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<RelayState>) -> Self {
        Self { port, state }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `ServerError` if binding fails or the server stops abnormally.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(self.port, e.to_string()))?;
        serve(listener, self.state).await
    }
}

/// Serve the relay endpoints on an already-bound listener until the state's
/// cancellation token fires.
///
/// # Errors
///
/// Returns `ServerError` if the server stops abnormally.
pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> Result<(), ServerError> {
    let cancel = state.cancel.clone();
    let local_addr = listener.local_addr().ok();
    tracing::info!(addr = ?local_addr, "Relay server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ServerError::ServerFailed(e.to_string()))?;

    tracing::info!("Relay server stopped");
    Ok(())
}

// =============================================================================
// Handlers
// =============================================================================

async fn market_data_ws(ws: WebSocketUpgrade, State(state): State<Arc<RelayState>>) -> Response {
    let hub = Arc::clone(&state.hub);
    let cancel = state.cancel.child_token();
    ws.on_upgrade(move |socket| socket::serve_subscriber(socket, hub, cancel))
}

async fn market_data_pull(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let tiered = state.pull.respond(&state.cycle, &state.hub).await;
    Json(PullResponse::from_tiered(&tiered))
}

// =============================================================================
// Errors
// =============================================================================

/// Relay server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{MockQuoteSource, MockSnapshotPublisher};
    use crate::application::services::QuoteSourceAdapter;
    use crate::domain::fallback::{FallbackTier, bootstrap_snapshot};
    use crate::domain::quote::{AssetClass, Quote};
    use crate::domain::snapshot::SnapshotStore;
    use crate::domain::symbols::TrackedSymbol;
    use crate::infrastructure::hub::HubConfig;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    #[tokio::test]
    async fn pull_route_returns_json() {
        let mut source = MockQuoteSource::new();
        source
            .expect_fetch_quote()
            .returning(|s| Ok(Quote::from_prices(s, dec!(3), dec!(2), "USD")));
        let mut publisher = MockSnapshotPublisher::new();
        publisher.expect_publish().returning(|_| Default::default());

        let store = SnapshotStore::new();
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            store.reader(),
            bootstrap_snapshot(),
        ));
        let cycle = Arc::new(RefreshCycle::new(
            QuoteSourceAdapter::new(Arc::new(source), Duration::from_secs(5)),
            vec![TrackedSymbol::new("IDX1", AssetClass::Index, "IDX1", "IDX1")],
            store,
            Arc::new(publisher),
            Duration::from_secs(30),
        ));
        let state = Arc::new(RelayState::new(
            hub,
            cycle,
            Duration::from_secs(900),
            CancellationToken::new(),
        ));

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/market-data")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: PullResponse = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.tier, FallbackTier::Live);
        assert!(!body.stale);
        assert_eq!(body.data.len(), 1);
    }

    #[tokio::test]
    async fn ws_route_requires_upgrade() {
        let mut publisher = MockSnapshotPublisher::new();
        publisher.expect_publish().never();
        let store = SnapshotStore::new();
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            store.reader(),
            bootstrap_snapshot(),
        ));
        let cycle = Arc::new(RefreshCycle::new(
            QuoteSourceAdapter::new(Arc::new(MockQuoteSource::new()), Duration::from_secs(5)),
            Vec::new(),
            store,
            Arc::new(publisher),
            Duration::from_secs(30),
        ));
        let state = Arc::new(RelayState::new(
            hub,
            cycle,
            Duration::from_secs(900),
            CancellationToken::new(),
        ));

        let response = router(state)
            .oneshot(
                Request::builder()
                    .uri("/ws/market-data")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
    }
}
