//! Client Channel Manager
//!
//! Keeps a viewer attached to the hub's push channel and always has a
//! snapshot to show.
//!
//! # State Machine
//!
//! ```text
//! Disconnected ─► Connecting ──ok──► Connected ──lost──► Reconnecting
//!                     │                                     │   │
//!                     └──────────failed─────────────────────┘   │
//!                     ▲                                         │
//!                     └──────────── delay elapsed ──────────────┘
//!
//! Reconnecting ──budget spent──► Disconnected (pull mode)
//! any state ──manual reconnect──► Connecting (fresh budget)
//! ```
//!
//! The display snapshot is resolved by a [`FallbackController`]: data from
//! the channel or the pull endpoint, then the local cache, then the
//! compiled-in reference snapshot. Every live snapshot is persisted to the
//! cache when one is configured.
//!
//! # Teardown
//!
//! [`ChannelHandle::teardown`] cancels the worker and waits for it. No
//! reconnect, ping or pull timer outlives it.

mod heartbeat;
mod pull;
mod reconnect;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use heartbeat::{HeartbeatConfig, PongTracker};
pub use pull::PullClient;
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use transport::{
    ChannelConnector, ChannelError, ChannelLink, FrameSink, FrameStream, WebSocketConnector,
};

use crate::application::ports::{PullSource, SnapshotCache};
use crate::domain::fallback::{FallbackController, FallbackTier, TieredSnapshot};
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::metrics;
use crate::infrastructure::protocol::{Envelope, MessageKind};

// =============================================================================
// Types
// =============================================================================

/// Connection state of the push channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not connected and not trying (initial, exhausted or torn down).
    Disconnected,
    /// Connect in progress.
    Connecting,
    /// Link open.
    Connected,
    /// Waiting out the delay before the next attempt.
    Reconnecting,
}

impl ChannelState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

/// Notification from the channel worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// State transition.
    StateChanged(ChannelState),
    /// Link opened.
    Connected,
    /// Link lost or connect failed.
    Disconnected {
        /// Why the link ended.
        reason: String,
    },
    /// Reconnect attempt scheduled.
    Reconnecting {
        /// 1-based attempt number in this episode.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
    /// Attempt budget spent; pull mode until a manual reconnect.
    ReconnectExhausted {
        /// Attempts made in the episode.
        attempts: u32,
    },
    /// The display snapshot changed.
    Snapshot(TieredSnapshot),
    /// The hub sent an error notice.
    ServerError(String),
}

/// Channel manager settings.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// Reconnect schedule.
    pub reconnect: ReconnectConfig,
    /// Ping schedule.
    pub heartbeat: HeartbeatConfig,
    /// Pull interval once reconnecting has given up.
    pub pull_interval: Duration,
    /// Capacity of the event queue.
    pub event_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            pull_interval: Duration::from_secs(60),
            event_buffer: 64,
        }
    }
}

#[derive(Debug)]
enum Command {
    Reconnect,
    Send(Envelope),
}

#[derive(Debug)]
struct Shared {
    state: RwLock<ChannelState>,
    fallback: RwLock<FallbackController>,
}

enum LinkEnd {
    Cancelled,
    Reconnect,
    Lost(String),
}

#[derive(Debug)]
enum Pause {
    Elapsed,
    Reconnect,
    Cancelled,
}

// =============================================================================
// Manager
// =============================================================================

/// Builder for a channel worker.
pub struct ChannelManager {
    connector: Arc<dyn ChannelConnector>,
    cache: Option<Arc<dyn SnapshotCache>>,
    pull: Option<Arc<dyn PullSource>>,
    bootstrap: Snapshot,
    config: ChannelConfig,
}

impl std::fmt::Debug for ChannelManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelManager")
            .field("has_cache", &self.cache.is_some())
            .field("has_pull", &self.pull.is_some())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ChannelManager {
    /// Create a manager with bootstrap-only fallback.
    #[must_use]
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        bootstrap: Snapshot,
        config: ChannelConfig,
    ) -> Self {
        Self {
            connector,
            cache: None,
            pull: None,
            bootstrap,
            config,
        }
    }

    /// Load from and persist to `cache`.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn SnapshotCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Poll `pull` once reconnecting has given up.
    #[must_use]
    pub fn with_pull_source(mut self, pull: Arc<dyn PullSource>) -> Self {
        self.pull = Some(pull);
        self
    }

    /// Load the cache and spawn the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
        let mut fallback = FallbackController::new(self.bootstrap);
        if let Some(cache) = &self.cache {
            match cache.load() {
                Ok(Some(snapshot)) => {
                    let quotes = snapshot.len();
                    if fallback.load_cached(snapshot) {
                        info!(quotes, "Loaded cached snapshot");
                    }
                }
                Ok(None) => debug!("No cached snapshot"),
                Err(e) => warn!(error = %e, "Ignoring unreadable snapshot cache"),
            }
        }

        let shared = Arc::new(Shared {
            state: RwLock::new(ChannelState::Disconnected),
            fallback: RwLock::new(fallback),
        });
        let (command_tx, command_rx) = mpsc::channel(16);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer.max(1));
        let cancel = CancellationToken::new();

        let worker = Worker {
            connector: self.connector,
            cache: self.cache,
            pull: self.pull,
            config: self.config,
            shared: Arc::clone(&shared),
            commands: command_rx,
            events: event_tx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(worker.run());

        let handle = ChannelHandle {
            shared,
            commands: command_tx,
            cancel,
            worker: Mutex::new(Some(task)),
        };
        (handle, event_rx)
    }
}

// =============================================================================
// Handle
// =============================================================================

/// Control surface for a running channel worker.
///
/// Dropping the handle cancels the worker without waiting for it.
#[derive(Debug)]
pub struct ChannelHandle {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelHandle {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ChannelState {
        *self.shared.state.read()
    }

    /// The snapshot to show, with its tier.
    #[must_use]
    pub fn display(&self) -> TieredSnapshot {
        self.shared.fallback.read().current()
    }

    /// Tier of [`Self::display`].
    #[must_use]
    pub fn tier(&self) -> FallbackTier {
        self.shared.fallback.read().tier()
    }

    /// Drop the current link (if any) and connect now with a fresh attempt
    /// budget. Returns `false` after teardown.
    pub fn reconnect(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.commands.try_send(Command::Reconnect).is_ok()
    }

    /// Queue a frame to the hub. Frames queued while disconnected are
    /// dropped.
    pub fn send(&self, envelope: Envelope) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.commands.try_send(Command::Send(envelope)).is_ok()
    }

    /// Whether [`Self::teardown`] has been called.
    #[must_use]
    pub fn is_torn_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop the worker and wait for it to exit. Idempotent.
    pub async fn teardown(&self) {
        self.cancel.cancel();
        let task = self.worker.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Channel worker ended abnormally");
            }
            info!("Channel torn down");
        }
        *self.shared.state.write() = ChannelState::Disconnected;
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Worker
// =============================================================================

struct Worker {
    connector: Arc<dyn ChannelConnector>,
    cache: Option<Arc<dyn SnapshotCache>>,
    pull: Option<Arc<dyn PullSource>>,
    config: ChannelConfig,
    shared: Arc<Shared>,
    commands: mpsc::Receiver<Command>,
    events: mpsc::Sender<ChannelEvent>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        let mut policy = ReconnectPolicy::new(self.config.reconnect);

        loop {
            self.set_state(ChannelState::Connecting);
            let connected = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            match connected {
                Ok(link) => {
                    policy.reset();
                    self.set_state(ChannelState::Connected);
                    self.emit(ChannelEvent::Connected);
                    info!("Push channel connected");

                    match self.drive(link).await {
                        LinkEnd::Cancelled => break,
                        LinkEnd::Reconnect => continue,
                        LinkEnd::Lost(reason) => {
                            warn!(reason = %reason, "Push channel lost");
                            self.emit(ChannelEvent::Disconnected { reason });
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Push channel connect failed");
                    self.emit(ChannelEvent::Disconnected {
                        reason: e.to_string(),
                    });
                }
            }

            let pause = if let Some(delay) = policy.next_delay() {
                let attempt = policy.attempt_count();
                self.set_state(ChannelState::Reconnecting);
                self.emit(ChannelEvent::Reconnecting { attempt, delay });
                metrics::record_client_reconnect();
                info!(
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Scheduling reconnect"
                );
                self.pause(delay).await
            } else {
                let attempts = policy.attempt_count();
                self.set_state(ChannelState::Disconnected);
                warn!(attempts, "Reconnect attempts exhausted, falling back to pull");
                self.emit(ChannelEvent::ReconnectExhausted { attempts });
                self.degraded().await
            };

            match pause {
                Pause::Elapsed => {}
                Pause::Reconnect => policy.reset(),
                Pause::Cancelled => break,
            }
        }

        self.set_state(ChannelState::Disconnected);
        debug!("Channel worker stopped");
    }

    async fn drive(&mut self, mut link: ChannelLink) -> LinkEnd {
        let heartbeat = self.config.heartbeat;
        let mut ping = tokio::time::interval_at(
            Instant::now() + heartbeat.ping_interval,
            heartbeat.ping_interval,
        );
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pongs = PongTracker::default();

        let end = loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break LinkEnd::Cancelled,
                command = self.commands.recv() => match command {
                    Some(Command::Reconnect) => {
                        info!("Manual reconnect requested");
                        break LinkEnd::Reconnect;
                    }
                    Some(Command::Send(envelope)) => {
                        if let Err(e) = send_envelope(&mut link, &envelope).await {
                            break LinkEnd::Lost(e.to_string());
                        }
                    }
                    None => break LinkEnd::Cancelled,
                },
                _ = ping.tick() => {
                    let now = Instant::now();
                    if let Some(timeout) = heartbeat.pong_timeout
                        && pongs.is_overdue(now, timeout)
                    {
                        break LinkEnd::Lost("pong timeout".to_string());
                    }
                    if let Err(e) = send_envelope(&mut link, &Envelope::ping()).await {
                        break LinkEnd::Lost(e.to_string());
                    }
                    pongs.ping_sent(now);
                }
                frame = link.stream.next() => match frame {
                    Some(Ok(text)) => {
                        if let Some(reply) = self.dispatch(&text, &mut pongs)
                            && let Err(e) = send_envelope(&mut link, &reply).await
                        {
                            break LinkEnd::Lost(e.to_string());
                        }
                    }
                    Some(Err(e)) => break LinkEnd::Lost(e.to_string()),
                    None => break LinkEnd::Lost("closed by peer".to_string()),
                },
            }
        };

        if let Err(e) = link.sink.close().await {
            debug!(error = %e, "Link close failed");
        }
        end
    }

    fn dispatch(&self, text: &str, pongs: &mut PongTracker) -> Option<Envelope> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed frame");
                return None;
            }
        };

        match envelope.kind {
            MessageKind::MarketData => {
                match envelope.snapshot() {
                    Ok(tiered) => self.accept(tiered),
                    Err(e) => warn!(error = %e, "Ignoring market_data frame"),
                }
                None
            }
            MessageKind::Ping => Some(Envelope::pong()),
            MessageKind::Pong => {
                pongs.pong_received();
                None
            }
            MessageKind::Error => {
                let message = envelope.message.unwrap_or_default();
                warn!(message = %message, "Hub reported an error");
                self.emit(ChannelEvent::ServerError(message));
                None
            }
        }
    }

    /// Take a snapshot from the channel or the pull endpoint.
    fn accept(&self, tiered: TieredSnapshot) {
        // Reference data from the hub never displaces anything we hold.
        if tiered.tier == FallbackTier::Bootstrap {
            debug!("Hub has only reference data, keeping local tiers");
            return;
        }

        let snapshot = tiered.snapshot;
        if !self.shared.fallback.write().accept_live(snapshot.clone()) {
            return;
        }
        if let Some(cache) = &self.cache
            && let Err(e) = cache.store(&snapshot)
        {
            warn!(error = %e, "Failed to persist snapshot");
        }
        let display = self.shared.fallback.read().current();
        self.emit(ChannelEvent::Snapshot(display));
    }

    async fn pause(&mut self, delay: Duration) -> Pause {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Pause::Cancelled,
                command = self.commands.recv() => {
                    if let Some(pause) = idle_command(command) {
                        return pause;
                    }
                }
                () = &mut sleep => return Pause::Elapsed,
            }
        }
    }

    async fn degraded(&mut self) -> Pause {
        let pull = self.pull.clone();
        let mut ticker = tokio::time::interval(self.config.pull_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Pause::Cancelled,
                command = self.commands.recv() => {
                    if let Some(pause) = idle_command(command) {
                        return pause;
                    }
                }
                _ = ticker.tick(), if pull.is_some() => {
                    if let Some(pull) = &pull {
                        let result = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => return Pause::Cancelled,
                            result = pull.pull() => result,
                        };
                        match result {
                            Ok(tiered) => self.accept(tiered),
                            Err(e) => warn!(error = %e, "Pull fallback failed"),
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, next: ChannelState) {
        let previous = std::mem::replace(&mut *self.shared.state.write(), next);
        if previous != next {
            debug!(from = previous.as_str(), to = next.as_str(), "Channel state changed");
            self.emit(ChannelEvent::StateChanged(next));
        }
    }

    fn emit(&self, event: ChannelEvent) {
        if let Err(TrySendError::Full(event)) = self.events.try_send(event) {
            debug!(?event, "Event queue full, dropping event");
        }
    }
}

fn idle_command(command: Option<Command>) -> Option<Pause> {
    match command {
        Some(Command::Reconnect) => {
            info!("Manual reconnect requested");
            Some(Pause::Reconnect)
        }
        Some(Command::Send(envelope)) => {
            warn!(kind = ?envelope.kind, "Dropping frame while disconnected");
            None
        }
        None => Some(Pause::Cancelled),
    }
}

async fn send_envelope(link: &mut ChannelLink, envelope: &Envelope) -> Result<(), ChannelError> {
    let text = envelope.encode().map_err(|e| ChannelError::Transport {
        message: e.to_string(),
    })?;
    link.sink.send(text).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ChannelConfig::default();
        assert_eq!(config.reconnect.max_attempts, 10);
        assert_eq!(config.reconnect.initial_delay, Duration::from_millis(3000));
        assert_eq!(config.heartbeat.ping_interval, Duration::from_secs(30));
        assert_eq!(config.pull_interval, Duration::from_secs(60));
    }

    #[test]
    fn state_names() {
        assert_eq!(ChannelState::Reconnecting.as_str(), "reconnecting");
        assert_eq!(ChannelState::Disconnected.as_str(), "disconnected");
    }

    #[test]
    fn idle_commands() {
        assert!(matches!(idle_command(Some(Command::Reconnect)), Some(Pause::Reconnect)));
        assert!(matches!(idle_command(None), Some(Pause::Cancelled)));
        assert!(idle_command(Some(Command::Send(Envelope::ping()))).is_none());
    }
}
