//! Broadcast Hub
//!
//! Fans the current snapshot out to every connected push-channel subscriber
//! and evicts subscribers that stop answering heartbeats.
//!
//! # Architecture
//!
//! Each subscriber owns a bounded outbound queue drained by its connection
//! task. The hub never awaits a subscriber:
//!
//! - A snapshot is serialized once and `try_send`-ed to every queue
//! - A full or closed queue evicts that subscriber only
//! - The two-phase heartbeat sweep probes live peers and evicts peers that
//!   did not answer the previous probe
//!
//! A peer is therefore never evicted by the same sweep that probed it.

mod sweep;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub use sweep::HeartbeatSweep;

use crate::application::ports::{PublishReport, SnapshotPublisher};
use crate::domain::fallback::{FallbackTier, TieredSnapshot, classify_view};
use crate::domain::snapshot::{Snapshot, SnapshotReader};
use crate::infrastructure::metrics::{self, EvictionReason};
use crate::infrastructure::protocol::{Envelope, MessageKind};

// =============================================================================
// Types
// =============================================================================

/// Hub-assigned subscriber identifier.
pub type SubscriberId = u64;

/// Item queued to a subscriber's connection task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Pre-serialized text frame.
    Frame(Arc<str>),
    /// Send a transport-level ping.
    Probe,
    /// Close the connection.
    Close,
}

/// Hub settings.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Capacity of each subscriber's outbound queue.
    pub outbound_buffer: usize,
    /// Age after which the stored snapshot is reported as cached.
    pub stale_after: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            outbound_buffer: 32,
            stale_after: Duration::from_secs(90),
        }
    }
}

#[derive(Debug)]
struct Subscriber {
    alive: AtomicBool,
    connected_at: Instant,
    outbound: mpsc::Sender<Outbound>,
}

/// Result of one heartbeat sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Subscribers probed this sweep.
    pub probed: usize,
    /// Subscribers evicted for missing the previous probe.
    pub evicted: usize,
}

/// Cumulative hub counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    /// Subscribers accepted since start.
    pub connected_total: u64,
    /// Subscribers evicted since start (send failure or heartbeat).
    pub evicted_total: u64,
    /// Snapshots pushed since start.
    pub published_total: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connected: AtomicU64,
    evicted: AtomicU64,
    published: AtomicU64,
}

// =============================================================================
// Hub
// =============================================================================

/// Registry of push-channel subscribers.
#[derive(Debug)]
pub struct BroadcastHub {
    config: HubConfig,
    reader: SnapshotReader,
    bootstrap: Snapshot,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    next_id: AtomicU64,
    counters: Counters,
}

impl BroadcastHub {
    /// Create a hub reading from `reader` and falling back to `bootstrap`.
    #[must_use]
    pub fn new(config: HubConfig, reader: SnapshotReader, bootstrap: Snapshot) -> Self {
        Self {
            config,
            reader,
            bootstrap,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Hub settings.
    #[must_use]
    pub const fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Create a bounded outbound queue sized for this hub.
    #[must_use]
    pub fn outbound_channel(&self) -> (mpsc::Sender<Outbound>, mpsc::Receiver<Outbound>) {
        mpsc::channel(self.config.outbound_buffer.max(1))
    }

    /// The snapshot a newly connected subscriber should see, with its tier.
    #[must_use]
    pub fn current(&self) -> TieredSnapshot {
        classify_view(&self.reader.read(), self.config.stale_after, &self.bootstrap)
    }

    /// Register a subscriber and queue the current snapshot to it.
    pub fn on_connect(&self, outbound: mpsc::Sender<Outbound>) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        // Register before reading, so a concurrent push reaches this
        // subscriber or lands before the read.
        self.subscribers.write().insert(
            id,
            Subscriber {
                alive: AtomicBool::new(true),
                connected_at: Instant::now(),
                outbound: outbound.clone(),
            },
        );
        self.counters.connected.fetch_add(1, Ordering::Relaxed);
        let current = self.current();
        let count = self.subscriber_count();
        metrics::set_subscribers(count as f64);
        info!(subscriber = id, tier = %current.tier, subscribers = count, "Subscriber connected");

        if let Some(frame) = encode_snapshot(&current)
            && outbound.try_send(Outbound::Frame(frame)).is_err()
        {
            self.evict(id, EvictionReason::SendFailed);
        }
        id
    }

    /// Handle an inbound text frame. Returns a reply to send, if any.
    pub fn on_message(&self, id: SubscriberId, text: &str) -> Option<Envelope> {
        let envelope = match Envelope::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(subscriber = id, error = %e, "Ignoring malformed frame");
                return None;
            }
        };

        match envelope.kind {
            MessageKind::Ping => Some(Envelope::pong()),
            MessageKind::Pong => {
                self.mark_alive(id);
                None
            }
            MessageKind::MarketData | MessageKind::Error => {
                debug!(subscriber = id, kind = ?envelope.kind, "Ignoring unexpected frame type");
                None
            }
        }
    }

    /// Record a heartbeat reply from `id`.
    pub fn mark_alive(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.read().get(&id) {
            subscriber.alive.store(true, Ordering::Release);
        }
    }

    /// Deregister a subscriber whose connection closed.
    pub fn on_disconnect(&self, id: SubscriberId) {
        if let Some(subscriber) = self.remove(id) {
            metrics::record_eviction(EvictionReason::Disconnected);
            info!(
                subscriber = id,
                connected_secs = subscriber.connected_at.elapsed().as_secs(),
                subscribers = self.subscriber_count(),
                "Subscriber disconnected"
            );
        }
    }

    /// Deregister a subscriber whose connection failed.
    pub fn on_error(&self, id: SubscriberId, reason: &str) {
        if self.remove(id).is_some() {
            metrics::record_eviction(EvictionReason::Error);
            warn!(subscriber = id, reason, "Subscriber connection error");
        }
    }

    /// Queue `snapshot` to every subscriber as live data.
    pub fn push(&self, snapshot: &Snapshot) -> PublishReport {
        let tiered = TieredSnapshot::new(FallbackTier::Live, snapshot.clone());
        let Some(frame) = encode_snapshot(&tiered) else {
            return PublishReport::default();
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, subscriber) in self.subscribers.read().iter() {
            match subscriber.outbound.try_send(Outbound::Frame(Arc::clone(&frame))) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(subscriber = id, error = %e, "Outbound queue rejected frame");
                    failed.push(*id);
                }
            }
        }

        for id in &failed {
            self.evict(*id, EvictionReason::SendFailed);
        }

        self.counters.published.fetch_add(1, Ordering::Relaxed);
        metrics::record_snapshots_published(delivered as u64);
        if !failed.is_empty() {
            metrics::record_messages_dropped(failed.len() as u64);
        }

        PublishReport {
            delivered,
            dropped: failed.len(),
        }
    }

    /// Run one heartbeat sweep.
    ///
    /// Subscribers that did not reply since the last sweep are closed and
    /// removed; the rest are marked pending and probed.
    pub fn sweep(&self) -> SweepReport {
        let mut report = SweepReport::default();
        let mut subscribers = self.subscribers.write();

        subscribers.retain(|id, subscriber| {
            if subscriber.alive.swap(false, Ordering::AcqRel) {
                if subscriber.outbound.try_send(Outbound::Probe).is_err() {
                    debug!(subscriber = id, "Probe not queued");
                }
                report.probed += 1;
                true
            } else {
                let _ = subscriber.outbound.try_send(Outbound::Close);
                warn!(subscriber = id, "Heartbeat timeout, evicting subscriber");
                metrics::record_eviction(EvictionReason::HeartbeatTimeout);
                report.evicted += 1;
                false
            }
        });

        let remaining = subscribers.len();
        drop(subscribers);

        if report.evicted > 0 {
            self.counters
                .evicted
                .fetch_add(report.evicted as u64, Ordering::Relaxed);
            metrics::set_subscribers(remaining as f64);
        }
        debug!(
            probed = report.probed,
            evicted = report.evicted,
            "Heartbeat sweep"
        );
        report
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Whether `id` is still registered.
    #[must_use]
    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers.read().contains_key(&id)
    }

    /// Cumulative counters.
    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            connected_total: self.counters.connected.load(Ordering::Relaxed),
            evicted_total: self.counters.evicted.load(Ordering::Relaxed),
            published_total: self.counters.published.load(Ordering::Relaxed),
        }
    }

    fn remove(&self, id: SubscriberId) -> Option<Subscriber> {
        let removed = self.subscribers.write().remove(&id);
        if removed.is_some() {
            metrics::set_subscribers(self.subscriber_count() as f64);
        }
        removed
    }

    fn evict(&self, id: SubscriberId, reason: EvictionReason) {
        if self.remove(id).is_some() {
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            metrics::record_eviction(reason);
            warn!(subscriber = id, "Evicted subscriber after failed send");
        }
    }
}

impl SnapshotPublisher for BroadcastHub {
    fn publish(&self, snapshot: &Snapshot) -> PublishReport {
        self.push(snapshot)
    }
}

fn encode_snapshot(tiered: &TieredSnapshot) -> Option<Arc<str>> {
    match Envelope::market_data(tiered).encode() {
        Ok(text) => Some(Arc::from(text)),
        Err(e) => {
            warn!(error = %e, "Failed to encode snapshot frame");
            None
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::bootstrap_snapshot;
    use crate::domain::quote::{AssetClass, Quote};
    use crate::domain::snapshot::{SnapshotStore, WriteOutcome};
    use crate::domain::symbols::TrackedSymbol;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str) -> Quote {
        let tracked = TrackedSymbol::new(symbol, AssetClass::Index, symbol, symbol);
        Quote::from_prices(&tracked, dec!(2), dec!(1), "USD")
    }

    fn hub_with(store: &SnapshotStore, buffer: usize) -> BroadcastHub {
        BroadcastHub::new(
            HubConfig {
                outbound_buffer: buffer,
                stale_after: Duration::from_secs(90),
            },
            store.reader(),
            bootstrap_snapshot(),
        )
    }

    fn frame(item: Option<Outbound>) -> Envelope {
        match item {
            Some(Outbound::Frame(text)) => Envelope::decode(&text).unwrap(),
            other => panic!("expected frame, got {other:?}"),
        }
    }

    #[test]
    fn subscriber_joining_during_push_never_misses_it() {
        for _ in 0..50 {
            let store = SnapshotStore::new();
            let hub = hub_with(&store, 4);
            let barrier = std::sync::Barrier::new(2);

            let receivers = std::thread::scope(|scope| {
                let joiner = scope.spawn(|| {
                    barrier.wait();
                    (0..20)
                        .map(|_| {
                            let (tx, rx) = hub.outbound_channel();
                            hub.on_connect(tx);
                            rx
                        })
                        .collect::<Vec<_>>()
                });
                barrier.wait();
                if let WriteOutcome::Updated(snapshot) = store.write(vec![quote("IDX1")]) {
                    hub.push(&snapshot);
                }
                joiner.join().unwrap()
            });

            for mut rx in receivers {
                let mut saw_live = false;
                while let Ok(item) = rx.try_recv() {
                    let envelope = frame(Some(item));
                    saw_live |= envelope.tier == Some(FallbackTier::Live);
                }
                assert!(saw_live);
            }
        }
    }

    #[tokio::test]
    async fn connect_sends_bootstrap_when_store_empty() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 4);
        let (tx, mut rx) = hub.outbound_channel();

        let id = hub.on_connect(tx);

        assert!(hub.is_registered(id));
        let envelope = frame(rx.recv().await);
        assert_eq!(envelope.kind, MessageKind::MarketData);
        assert_eq!(envelope.tier, Some(FallbackTier::Bootstrap));
        assert_eq!(envelope.data.unwrap().len(), 11);
    }

    #[tokio::test]
    async fn connect_sends_live_snapshot() {
        let store = SnapshotStore::new();
        store.write(vec![quote("IDX1")]);
        let hub = hub_with(&store, 4);
        let (tx, mut rx) = hub.outbound_channel();

        hub.on_connect(tx);

        let envelope = frame(rx.recv().await);
        assert_eq!(envelope.tier, Some(FallbackTier::Live));
        assert_eq!(envelope.data.unwrap()[0].symbol, "IDX1");
    }

    #[tokio::test(start_paused = true)]
    async fn old_snapshot_is_reported_cached() {
        let store = SnapshotStore::new();
        store.write(vec![quote("IDX1")]);
        let hub = hub_with(&store, 4);

        tokio::time::advance(Duration::from_secs(91)).await;
        assert_eq!(hub.current().tier, FallbackTier::Cached);
    }

    #[tokio::test]
    async fn push_evicts_closed_subscriber_only() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 4);
        let (tx1, mut rx1) = hub.outbound_channel();
        let (tx2, rx2) = hub.outbound_channel();
        let id1 = hub.on_connect(tx1);
        let id2 = hub.on_connect(tx2);
        drop(rx2);
        let _ = rx1.recv().await;

        let report = hub.push(&Snapshot::new(vec![quote("IDX1")], chrono::Utc::now()));

        assert_eq!(report, PublishReport { delivered: 1, dropped: 1 });
        assert!(hub.is_registered(id1));
        assert!(!hub.is_registered(id2));
        assert_eq!(frame(rx1.recv().await).tier, Some(FallbackTier::Live));
        assert_eq!(hub.stats().evicted_total, 1);
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 4);
        let (tx, _rx) = hub.outbound_channel();
        let id = hub.on_connect(tx);

        let reply = hub.on_message(id, r#"{"type":"ping","timestamp":1}"#).unwrap();
        assert_eq!(reply.kind, MessageKind::Pong);
        assert!(hub.on_message(id, "garbage").is_none());
        assert!(hub.on_message(id, r#"{"type":"market_data","data":[]}"#).is_none());
    }

    #[tokio::test]
    async fn sweep_is_two_phase() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 8);
        let (tx_quiet, mut rx_quiet) = hub.outbound_channel();
        let (tx_chatty, mut rx_chatty) = hub.outbound_channel();
        let quiet = hub.on_connect(tx_quiet);
        let chatty = hub.on_connect(tx_chatty);
        let _ = rx_quiet.recv().await;
        let _ = rx_chatty.recv().await;

        let first = hub.sweep();
        assert_eq!(first, SweepReport { probed: 2, evicted: 0 });
        assert_eq!(rx_quiet.recv().await, Some(Outbound::Probe));
        assert_eq!(rx_chatty.recv().await, Some(Outbound::Probe));

        hub.on_message(chatty, r#"{"type":"pong"}"#);

        let second = hub.sweep();
        assert_eq!(second, SweepReport { probed: 1, evicted: 1 });
        assert!(!hub.is_registered(quiet));
        assert!(hub.is_registered(chatty));
        assert_eq!(rx_quiet.recv().await, Some(Outbound::Close));
    }

    #[tokio::test]
    async fn disconnect_and_error_deregister() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 4);
        let (tx1, _rx1) = hub.outbound_channel();
        let (tx2, _rx2) = hub.outbound_channel();
        let id1 = hub.on_connect(tx1);
        let id2 = hub.on_connect(tx2);

        hub.on_disconnect(id1);
        hub.on_error(id2, "reset by peer");

        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.stats().connected_total, 2);
        // Idempotent.
        hub.on_disconnect(id1);
    }

    #[test]
    fn publisher_port_pushes() {
        let store = SnapshotStore::new();
        let hub = hub_with(&store, 4);
        let publisher: &dyn SnapshotPublisher = &hub;
        let report = publisher.publish(&Snapshot::new(vec![quote("IDX1")], chrono::Utc::now()));
        assert_eq!(report, PublishReport::default());
        assert_eq!(hub.stats().published_total, 1);
    }
}
