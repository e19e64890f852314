//! Ticker Viewer Binary
//!
//! Terminal viewer for the hub's push channel. Prints the ticker line every
//! time the displayed snapshot changes, falling back to the local cache and
//! the reference snapshot while the hub is unreachable.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ticker-viewer
//! ```
//!
//! # Environment Variables
//!
//! - `TICKER_WS_URL`: Push channel URL (default: ws://localhost:3000/ws/market-data)
//! - `TICKER_PULL_URL`: Pull endpoint URL (default: <http://localhost:3000/api/market-data>)
//! - `TICKER_RECONNECT_DELAY_MS`: Delay between reconnects (default: 3000)
//! - `TICKER_MAX_RECONNECT_ATTEMPTS`: Attempts before pull mode (default: 10)
//! - `TICKER_PING_INTERVAL_SECS`: Client ping period (default: 30)
//! - `TICKER_PONG_TIMEOUT_SECS`: Dead-peer deadline (default: off)
//! - `TICKER_PULL_INTERVAL_SECS`: Pull period in degraded mode (default: 60)
//! - `TICKER_CACHE_PATH`: Snapshot cache file (default: .ticker-hub/market-ticker.json)
//! - `TICKER_LOCALE`: zh | en (default: zh)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use ticker_hub::domain::display::{Locale, ticker_line};
use ticker_hub::infrastructure::cache::FileSnapshotCache;
use ticker_hub::infrastructure::client::{
    HeartbeatConfig, PullClient, ReconnectConfig, WebSocketConnector,
};
use ticker_hub::infrastructure::telemetry::{self, TelemetryConfig, VIEWER_SERVICE_NAME};
use ticker_hub::{
    ChannelConfig, ChannelEvent, ChannelHandle, ChannelManager, ViewerConfig, bootstrap_snapshot,
};
use tokio::signal;

/// Re-render period, so the freshness label keeps ageing between updates.
const RENDER_INTERVAL: Duration = Duration::from_secs(60);

/// Pull request timeout.
const PULL_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    load_dotenv();

    let _telemetry_guard = telemetry::init_with_config(TelemetryConfig {
        log_to_stderr: true,
        ..TelemetryConfig::from_env(VIEWER_SERVICE_NAME)
    });

    let config = ViewerConfig::from_env().context("invalid viewer configuration")?;
    tracing::info!(
        ws_url = %config.ws_url,
        pull_url = %config.pull_url,
        cache = %config.cache_path.display(),
        "Starting Ticker Viewer"
    );

    let pull = PullClient::new(config.pull_url.clone(), PULL_TIMEOUT)
        .context("failed to build pull client")?;
    let channel_config = ChannelConfig {
        reconnect: ReconnectConfig::fixed(config.reconnect_delay, config.max_reconnect_attempts),
        heartbeat: HeartbeatConfig {
            ping_interval: config.ping_interval,
            pong_timeout: config.pong_timeout,
        },
        pull_interval: config.pull_interval,
        ..ChannelConfig::default()
    };

    let (handle, mut events) = ChannelManager::new(
        Arc::new(WebSocketConnector::new(config.ws_url.clone())),
        bootstrap_snapshot(),
        channel_config,
    )
    .with_cache(Arc::new(FileSnapshotCache::new(config.cache_path.clone())))
    .with_pull_source(Arc::new(pull))
    .start();

    render(&handle, config.locale);

    let mut render_tick = tokio::time::interval(RENDER_INTERVAL);
    render_tick.tick().await;

    loop {
        tokio::select! {
            biased;
            result = signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!(error = %e, "Signal handler failed");
                }
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                handle_event(&handle, &event, config.locale);
            }
            _ = render_tick.tick() => render(&handle, config.locale),
        }
    }

    handle.teardown().await;
    tracing::info!("Ticker viewer stopped");
    Ok(())
}

fn handle_event(handle: &ChannelHandle, event: &ChannelEvent, locale: Locale) {
    match event {
        ChannelEvent::Snapshot(_) => render(handle, locale),
        ChannelEvent::StateChanged(state) => {
            tracing::debug!(state = state.as_str(), "Channel state");
        }
        ChannelEvent::Connected => tracing::info!("Connected to hub"),
        ChannelEvent::Disconnected { reason } => {
            tracing::warn!(reason = %reason, "Disconnected from hub");
        }
        ChannelEvent::Reconnecting { attempt, delay } => {
            tracing::info!(
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting"
            );
        }
        ChannelEvent::ReconnectExhausted { attempts } => {
            tracing::warn!(attempts, "Hub unreachable, polling the pull endpoint");
            render(handle, locale);
        }
        ChannelEvent::ServerError(message) => {
            tracing::warn!(message = %message, "Hub error");
        }
    }
}

fn render(handle: &ChannelHandle, locale: Locale) {
    println!("{}", ticker_line(&handle.display(), Utc::now(), locale));
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

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
