#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Ticker Hub - Resilient Market Quote Distribution
//!
//! Refreshes a small catalog of index, FX and commodity quotes from an
//! upstream chart API and distributes the snapshot to viewers over a
//! WebSocket push channel, with a memoized pull endpoint as fallback.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Quote, snapshot and fallback types
//!   - `quote`, `symbols`: quote arithmetic and the tracked catalog
//!   - `snapshot`: single-writer snapshot store
//!   - `fallback`: live / cached / bootstrap tier selection
//!   - `display`: ticker line formatting
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: quote source, publisher, cache and pull interfaces
//!   - `services`: batch fetching and the refresh cycle
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `provider`: chart API sources with failover
//!   - `hub`, `server`: subscriber fan-out, heartbeat sweep, HTTP endpoints
//!   - `client`: reconnecting channel manager for viewers
//!   - `cache`, `config`, `health`, `metrics`, `telemetry`
//!
//! # Data Flow
//!
//! ```text
//!                 ┌──────────────┐     ┌───────────────┐
//! Chart API ─────►│ RefreshCycle │────►│ BroadcastHub  │──► viewer 1
//! (per symbol)    │  (store)     │     │ (WS fan-out)  │──► viewer 2
//!                 └──────┬───────┘     └───────────────┘──► viewer N
//!                        │
//!                        └──► GET /api/market-data (memoized pull)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Quote, snapshot and fallback types with no I/O.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::fallback::{
    FallbackController, FallbackTier, TieredSnapshot, bootstrap_snapshot, bootstrap_snapshot_for,
};
pub use domain::quote::{AssetClass, Quote};
pub use domain::snapshot::{Snapshot, SnapshotReader, SnapshotStore};
pub use domain::symbols::{Symbol, TrackedSymbol};

// Application services
pub use application::services::{CycleOutcome, CycleState, QuoteSourceAdapter, RefreshCycle};

// Infrastructure config
pub use infrastructure::config::{ConfigError, RelayConfig, ViewerConfig};

// Hub and servers (for integration tests)
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};
pub use infrastructure::hub::{BroadcastHub, HeartbeatSweep, HubConfig};
pub use infrastructure::server::{RelayServer, RelayState, ServerError};

// Client
pub use infrastructure::client::{
    ChannelConfig, ChannelEvent, ChannelHandle, ChannelManager, ChannelState,
};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
