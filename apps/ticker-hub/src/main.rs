//! Ticker Hub Binary
//!
//! Starts the quote refresh cycle, the WebSocket/pull relay and the health
//! server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-hub
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_HUB_PORT`: Market data HTTP/WebSocket port (default: 3000)
//! - `TICKER_HUB_HEALTH_PORT`: Health check HTTP port (default: 8082)
//! - `TICKER_REFRESH_INTERVAL_SECS`: Refresh period (default: 30)
//! - `TICKER_FETCH_TIMEOUT_SECS`: Per-symbol fetch deadline (default: 10)
//! - `TICKER_STALE_AFTER_SECS`: Age at which data is reported cached (default: 90)
//! - `TICKER_HEARTBEAT_INTERVAL_SECS`: Heartbeat sweep period (default: 30)
//! - `TICKER_PULL_MEMO_SECS`: Pull endpoint memo lifetime (default: 900)
//! - `TICKER_SUBSCRIBER_BUFFER`: Per-subscriber queue size (default: 32)
//! - `MARKET_UPSTREAM_URL`: Chart API host (default: <https://query1.finance.yahoo.com>)
//! - `MARKET_BACKUP_UPSTREAM_URL`: Optional second chart API host
//! - `MARKET_UPSTREAM_REGION`: Region parameter (default: US)
//! - `TICKER_SYMBOLS`: Comma list narrowing the catalog
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4318>)
//! - `OTEL_SERVICE_NAME`: Service name (default: ticker-hub)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use ticker_hub::application::ports::{QuoteSource, SnapshotPublisher};
use ticker_hub::infrastructure::provider::{
    ChartApiConfig, ChartApiSource, FailoverQuoteSource, ProviderError,
};
use ticker_hub::infrastructure::telemetry;
use ticker_hub::{
    BroadcastHub, HealthServer, HealthServerState, HeartbeatSweep, HubConfig, QuoteSourceAdapter,
    RefreshCycle, RelayConfig, RelayServer, RelayState, SnapshotStore, bootstrap_snapshot_for,
    init_metrics,
};
use tokio::signal;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Ticker Hub");

    // Initialize Prometheus metrics
    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = RelayConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Upstream sources
    let source = build_source(&config)?;

    // Store, hub and refresh cycle. The cycle owns the only writer.
    let store = SnapshotStore::new();
    let hub = Arc::new(BroadcastHub::new(
        HubConfig {
            outbound_buffer: config.server.subscriber_buffer,
            stale_after: config.server.stale_after,
        },
        store.reader(),
        bootstrap_snapshot_for(&config.symbols),
    ));
    let publisher: Arc<dyn SnapshotPublisher> = Arc::clone(&hub) as Arc<dyn SnapshotPublisher>;
    let cycle = Arc::new(RefreshCycle::new(
        QuoteSourceAdapter::new(source, config.server.fetch_timeout),
        config.symbols.clone(),
        store,
        publisher,
        config.server.refresh_interval,
    ));

    let mut tasks = JoinSet::new();

    // Refresh timer
    tasks.spawn(Arc::clone(&cycle).run(shutdown_token.clone()));

    // Heartbeat sweep
    tasks.spawn(
        HeartbeatSweep::new(
            Arc::clone(&hub),
            config.server.heartbeat_interval,
            shutdown_token.clone(),
        )
        .run(),
    );

    // Relay server
    let relay_state = Arc::new(RelayState::new(
        Arc::clone(&hub),
        Arc::clone(&cycle),
        config.server.pull_memo_ttl,
        shutdown_token.clone(),
    ));
    let relay_server = RelayServer::new(config.server.port, relay_state);
    let relay_shutdown = shutdown_token.clone();
    tasks.spawn(async move {
        if let Err(e) = relay_server.run().await {
            tracing::error!(error = %e, "Relay server error");
            relay_shutdown.cancel();
        }
    });

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&hub),
        Arc::clone(&cycle),
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tasks.spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Ticker hub ready");

    await_shutdown(shutdown_token).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        while tasks.join_next().await.is_some() {}
    })
    .await
    .is_err()
    {
        tracing::warn!("Shutdown timed out, aborting remaining tasks");
        tasks.abort_all();
    }

    tracing::info!("Ticker hub stopped");
    Ok(())
}

/// Build the primary source, wrapped in failover when a backup is set.
///
/// With a backup, each source gets half the per-symbol deadline so the
/// backup still has time when the primary hangs.
fn build_source(config: &RelayConfig) -> Result<Arc<dyn QuoteSource>, ProviderError> {
    let chart_config = |url: &str, timeout: Duration| {
        ChartApiConfig::new(url, timeout).with_region(config.upstream.region.clone())
    };

    let Some(backup_url) = &config.upstream.backup_url else {
        let primary = ChartApiSource::new(&chart_config(
            &config.upstream.primary_url,
            config.server.fetch_timeout,
        ))?;
        return Ok(Arc::new(primary));
    };

    let share = FailoverQuoteSource::attempt_share(config.server.fetch_timeout, 2);
    let primary = ChartApiSource::new(&chart_config(&config.upstream.primary_url, share))?;
    let backup = ChartApiSource::new(&chart_config(backup_url, share))?;
    Ok(Arc::new(
        FailoverQuoteSource::new(vec![Arc::new(primary), Arc::new(backup)])
            .with_attempt_timeout(share),
    ))
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_err() {
        load_dotenv_from_ancestors();
    }
}

/// Load .env file from any ancestor directory.
fn load_dotenv_from_ancestors() {
    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &RelayConfig) {
    tracing::info!(
        port = config.server.port,
        health_port = config.server.health_port,
        refresh_interval_secs = config.server.refresh_interval.as_secs(),
        stale_after_secs = config.server.stale_after.as_secs(),
        heartbeat_interval_secs = config.server.heartbeat_interval.as_secs(),
        symbols = config.symbols.len(),
        "Configuration loaded"
    );
    tracing::debug!(
        upstream = %config.upstream.primary_url,
        backup = ?config.upstream.backup_url,
        region = %config.upstream.region,
        "Upstream endpoints"
    );
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
        () = shutdown_token.cancelled() => {
            tracing::info!("Fatal task error, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
