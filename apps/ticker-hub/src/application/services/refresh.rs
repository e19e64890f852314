//! Refresh Cycle
//!
//! Periodically fetches every tracked symbol, writes the successes into the
//! [`SnapshotStore`] and publishes the new snapshot.
//!
//! # State Machine
//!
//! ```text
//! Idle ──trigger──► Fetching ──settled──► Merging ──► Idle
//!   ▲                                                   │
//!   └──────────── trigger while busy: Skipped ──────────┘
//! ```
//!
//! At most one cycle is in flight. A trigger that arrives while a cycle is
//! running is dropped rather than queued.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::ports::SnapshotPublisher;
use crate::application::services::source_adapter::QuoteSourceAdapter;
use crate::domain::snapshot::{SnapshotReader, SnapshotStore, WriteOutcome};
use crate::domain::symbols::TrackedSymbol;
use crate::infrastructure::metrics::{self, RefreshLabel};

// =============================================================================
// Types
// =============================================================================

/// Observable phase of the refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// Waiting for the next trigger.
    Idle,
    /// Upstream requests in flight.
    Fetching,
    /// Writing to the store and publishing.
    Merging,
}

impl CycleState {
    /// Get the state name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetching => "fetching",
            Self::Merging => "merging",
        }
    }
}

/// Result of one trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The store was replaced and the snapshot published.
    Updated {
        /// Quotes in the new snapshot.
        quotes: usize,
        /// Symbols that failed this cycle.
        failed: usize,
        /// Subscribers the snapshot was queued to.
        delivered: usize,
    },
    /// Every symbol failed; the previous snapshot is still in force.
    NoData {
        /// Symbols that failed this cycle.
        failed: usize,
    },
    /// Another cycle was already in flight.
    Skipped,
}

// =============================================================================
// In-flight Guard
// =============================================================================

struct InFlight<'a> {
    cycle: &'a RefreshCycle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        *self.cycle.state.write() = CycleState::Idle;
        self.cycle.in_flight.store(false, Ordering::Release);
    }
}

// =============================================================================
// Refresh Cycle
// =============================================================================

/// Owner of the snapshot store and driver of periodic refreshes.
pub struct RefreshCycle {
    adapter: QuoteSourceAdapter,
    symbols: Vec<TrackedSymbol>,
    store: SnapshotStore,
    publisher: Arc<dyn SnapshotPublisher>,
    interval: Duration,
    in_flight: AtomicBool,
    state: RwLock<CycleState>,
}

impl std::fmt::Debug for RefreshCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCycle")
            .field("symbols", &self.symbols.len())
            .field("interval", &self.interval)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RefreshCycle {
    /// Create a refresh cycle that takes ownership of `store`.
    #[must_use]
    pub fn new(
        adapter: QuoteSourceAdapter,
        symbols: Vec<TrackedSymbol>,
        store: SnapshotStore,
        publisher: Arc<dyn SnapshotPublisher>,
        interval: Duration,
    ) -> Self {
        Self {
            adapter,
            symbols,
            store,
            publisher,
            interval,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(CycleState::Idle),
        }
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> CycleState {
        *self.state.read()
    }

    /// Read-only handle to the owned store.
    #[must_use]
    pub fn reader(&self) -> SnapshotReader {
        self.store.reader()
    }

    /// Symbols fetched each cycle.
    #[must_use]
    pub fn symbols(&self) -> &[TrackedSymbol] {
        &self.symbols
    }

    fn try_begin(&self) -> Option<InFlight<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlight { cycle: self })
    }

    /// Run a single cycle unless one is already in flight.
    pub async fn run_once(&self) -> CycleOutcome {
        let Some(_guard) = self.try_begin() else {
            debug!("Refresh already in flight, skipping trigger");
            metrics::record_refresh(RefreshLabel::Skipped);
            return CycleOutcome::Skipped;
        };

        let started = Instant::now();
        *self.state.write() = CycleState::Fetching;
        let batch = self.adapter.fetch_all(&self.symbols).await;

        *self.state.write() = CycleState::Merging;
        let failed = batch.failures.len();
        let outcome = match self.store.write(batch.quotes) {
            WriteOutcome::Updated(snapshot) => {
                let report = self.publisher.publish(&snapshot);
                metrics::set_snapshot_quotes(snapshot.len() as f64);
                info!(
                    quotes = snapshot.len(),
                    failed,
                    delivered = report.delivered,
                    dropped = report.dropped,
                    "Snapshot refreshed"
                );
                metrics::record_refresh(RefreshLabel::Updated);
                CycleOutcome::Updated {
                    quotes: snapshot.len(),
                    failed,
                    delivered: report.delivered,
                }
            }
            WriteOutcome::NoUpdate => {
                info!(failed, "All symbols failed, keeping previous snapshot");
                metrics::record_refresh(RefreshLabel::NoData);
                CycleOutcome::NoData { failed }
            }
        };

        metrics::record_refresh_duration(started.elapsed());
        outcome
    }

    /// Trigger immediately, then every interval, until cancelled.
    ///
    /// Each trigger runs on its own task, so a slow upstream cannot delay the
    /// timer; overlapping triggers are skipped by the in-flight guard.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            symbols = self.symbols.len(),
            interval_secs = self.interval.as_secs(),
            "Refresh cycle started"
        );

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Refresh cycle stopped");
                    break;
                }
                _ = ticker.tick() => {
                    let cycle = Arc::clone(&self);
                    tokio::spawn(async move {
                        cycle.run_once().await;
                    });
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{
        MockQuoteSource, MockSnapshotPublisher, PublishReport, QuoteSource, SourceError,
    };
    use crate::domain::quote::{AssetClass, Quote};
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn tracked(symbol: &str) -> TrackedSymbol {
        TrackedSymbol::new(symbol, AssetClass::Index, symbol, symbol)
    }

    fn cycle_with(source: impl QuoteSource + 'static, publisher: MockSnapshotPublisher) -> RefreshCycle {
        RefreshCycle::new(
            QuoteSourceAdapter::new(Arc::new(source), Duration::from_secs(10)),
            vec![tracked("IDX1"), tracked("IDX2")],
            SnapshotStore::new(),
            Arc::new(publisher),
            Duration::from_secs(30),
        )
    }

    #[tokio::test]
    async fn updated_cycle_publishes() {
        let mut source = MockQuoteSource::new();
        source
            .expect_fetch_quote()
            .returning(|s| Ok(Quote::from_prices(s, dec!(2), dec!(1), "USD")));
        let mut publisher = MockSnapshotPublisher::new();
        publisher.expect_publish().times(1).returning(|snapshot| {
            assert_eq!(snapshot.len(), 2);
            PublishReport {
                delivered: 3,
                dropped: 0,
            }
        });

        let cycle = cycle_with(source, publisher);
        let outcome = cycle.run_once().await;

        assert_eq!(
            outcome,
            CycleOutcome::Updated {
                quotes: 2,
                failed: 0,
                delivered: 3
            }
        );
        assert_eq!(cycle.state(), CycleState::Idle);
        assert_eq!(cycle.reader().read().snapshot.len(), 2);
    }

    #[tokio::test]
    async fn no_data_does_not_publish() {
        let mut source = MockQuoteSource::new();
        source.expect_fetch_quote().returning(|s| {
            Err(SourceError::NoResult {
                symbol: s.symbol.clone(),
            })
        });
        let mut publisher = MockSnapshotPublisher::new();
        publisher.expect_publish().never();

        let cycle = cycle_with(source, publisher);
        assert_eq!(cycle.run_once().await, CycleOutcome::NoData { failed: 2 });
        assert!(cycle.reader().read().is_empty());
    }

    struct CountingSource {
        calls: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl QuoteSource for CountingSource {
        async fn fetch_quote(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(Quote::from_prices(symbol, dec!(2), dec!(1), "USD"))
        }
    }

    fn quiet_publisher() -> MockSnapshotPublisher {
        let mut publisher = MockSnapshotPublisher::new();
        publisher
            .expect_publish()
            .returning(|_| PublishReport::default());
        publisher
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_trigger_is_skipped() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
            delay: Duration::from_secs(5),
        };
        let cycle = Arc::new(cycle_with(source, quiet_publisher()));

        let first = tokio::spawn({
            let cycle = Arc::clone(&cycle);
            async move { cycle.run_once().await }
        });
        tokio::task::yield_now().await;

        assert_eq!(cycle.state(), CycleState::Fetching);
        assert_eq!(cycle.run_once().await, CycleOutcome::Skipped);

        let outcome = first.await.unwrap();
        assert!(matches!(outcome, CycleOutcome::Updated { quotes: 2, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // Guard released: the next trigger runs.
        assert!(matches!(cycle.run_once().await, CycleOutcome::Updated { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn run_fires_immediately_then_every_interval() {
        let calls = Arc::new(AtomicUsize::new(0));
        let source = CountingSource {
            calls: Arc::clone(&calls),
            delay: Duration::ZERO,
        };
        let cycle = Arc::new(cycle_with(source, quiet_publisher()));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(Arc::clone(&cycle).run(cancel.clone()));

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        cancel.cancel();
        task.await.unwrap();

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }
}
