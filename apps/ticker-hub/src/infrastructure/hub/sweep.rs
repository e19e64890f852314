//! Heartbeat Sweep
//!
//! Drives [`BroadcastHub::sweep`] on a fixed period. The first sweep runs one
//! full period after start, so a subscriber is probed no earlier than one
//! interval after connecting and evicted no earlier than two.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::BroadcastHub;

/// Periodic heartbeat driver.
#[derive(Debug)]
pub struct HeartbeatSweep {
    hub: Arc<BroadcastHub>,
    interval: Duration,
    cancel: CancellationToken,
}

impl HeartbeatSweep {
    /// Create a sweep over `hub`.
    #[must_use]
    pub const fn new(hub: Arc<BroadcastHub>, interval: Duration, cancel: CancellationToken) -> Self {
        Self {
            hub,
            interval,
            cancel,
        }
    }

    /// Run until cancelled.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    tracing::debug!("Heartbeat sweep cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    self.hub.sweep();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::bootstrap_snapshot;
    use crate::domain::snapshot::SnapshotStore;
    use crate::infrastructure::hub::{HubConfig, Outbound};

    #[tokio::test(start_paused = true)]
    async fn silent_subscriber_evicted_one_interval_after_probe() {
        let store = SnapshotStore::new();
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            store.reader(),
            bootstrap_snapshot(),
        ));
        let (tx, mut rx) = hub.outbound_channel();
        let id = hub.on_connect(tx);
        assert!(matches!(rx.recv().await, Some(Outbound::Frame(_))));

        let cancel = CancellationToken::new();
        let interval = Duration::from_secs(30);
        let task = tokio::spawn(HeartbeatSweep::new(Arc::clone(&hub), interval, cancel.clone()).run());

        // Nothing happens before the first period elapses.
        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(rx.try_recv().is_err());

        // First sweep: probed, still registered.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Probe));
        assert!(hub.is_registered(id));

        // Second sweep: evicted.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(rx.try_recv().ok(), Some(Outbound::Close));
        assert!(!hub.is_registered(id));

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn answering_subscriber_survives() {
        let store = SnapshotStore::new();
        let hub = Arc::new(BroadcastHub::new(
            HubConfig::default(),
            store.reader(),
            bootstrap_snapshot(),
        ));
        let (tx, mut rx) = hub.outbound_channel();
        let id = hub.on_connect(tx);
        let _ = rx.recv().await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            HeartbeatSweep::new(Arc::clone(&hub), Duration::from_secs(30), cancel.clone()).run(),
        );

        for _ in 0..5 {
            assert_eq!(rx.recv().await, Some(Outbound::Probe));
            hub.mark_alive(id);
        }
        assert!(hub.is_registered(id));

        cancel.cancel();
        task.await.unwrap();
    }
}
