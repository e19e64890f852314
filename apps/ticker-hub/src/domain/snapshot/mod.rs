//! Snapshot and Snapshot Store
//!
//! A [`Snapshot`] is the complete ordered set of current quotes plus the time
//! it was captured. The [`SnapshotStore`] holds the last-known-good snapshot
//! and is the only place allowed to replace it.
//!
//! # Design
//!
//! The store is split into a single writer and any number of readers:
//!
//! - [`SnapshotStore`] is not `Clone`; the refresh cycle owns it.
//! - [`SnapshotReader`] is a cheap `Clone` handle with read access only,
//!   handed to the broadcast hub, the pull endpoint and health checks.
//!
//! Age is measured with the tokio clock so it follows paused time in tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::domain::quote::Quote;

// =============================================================================
// Snapshot
// =============================================================================

/// Ordered quotes plus capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Quotes in configured symbol order.
    pub quotes: Vec<Quote>,
    /// When the quotes were captured.
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    /// Create a snapshot.
    #[must_use]
    pub const fn new(quotes: Vec<Quote>, captured_at: DateTime<Utc>) -> Self {
        Self {
            quotes,
            captured_at,
        }
    }

    /// The empty snapshot held before the first successful refresh.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            quotes: Vec::new(),
            captured_at: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Whether the snapshot holds no quotes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    /// Number of quotes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    /// Look up a quote by symbol.
    #[must_use]
    pub fn quote(&self, symbol: &str) -> Option<&Quote> {
        self.quotes.iter().find(|q| q.symbol == symbol)
    }

    /// Capture time as milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.captured_at.timestamp_millis()
    }
}

// =============================================================================
// Store
// =============================================================================

#[derive(Debug)]
struct StoreState {
    snapshot: Snapshot,
    written_at: Option<Instant>,
}

/// A read of the store: the current snapshot and how long ago it was written.
#[derive(Debug, Clone)]
pub struct SnapshotView {
    /// Current snapshot (empty before the first accepted write).
    pub snapshot: Snapshot,
    /// Time since the last accepted write, `None` while empty.
    pub age: Option<Duration>,
}

impl SnapshotView {
    /// Whether the store has never accepted a write.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }
}

/// Result of a store write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Candidates replaced the stored snapshot.
    Updated(Snapshot),
    /// No candidates; the previous snapshot is still in force.
    NoUpdate,
}

impl WriteOutcome {
    /// Whether the write replaced the snapshot.
    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated(_))
    }
}

/// Last-known-good snapshot, writable by its single owner.
#[derive(Debug)]
pub struct SnapshotStore {
    inner: Arc<RwLock<StoreState>>,
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreState {
                snapshot: Snapshot::empty(),
                written_at: None,
            })),
        }
    }

    /// Get a read-only handle.
    #[must_use]
    pub fn reader(&self) -> SnapshotReader {
        SnapshotReader {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Replace the snapshot if `candidates` is non-empty.
    ///
    /// The new `captured_at` never goes backwards relative to the previous
    /// snapshot, even if the wall clock does.
    pub fn write(&self, candidates: Vec<Quote>) -> WriteOutcome {
        if candidates.is_empty() {
            return WriteOutcome::NoUpdate;
        }

        let mut state = self.inner.write();
        let captured_at = Utc::now().max(state.snapshot.captured_at);
        let snapshot = Snapshot::new(candidates, captured_at);

        state.snapshot = snapshot.clone();
        state.written_at = Some(Instant::now());

        WriteOutcome::Updated(snapshot)
    }

    /// Read the current snapshot and its age.
    #[must_use]
    pub fn read(&self) -> SnapshotView {
        read_state(&self.inner)
    }
}

/// Read-only handle to a [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct SnapshotReader {
    inner: Arc<RwLock<StoreState>>,
}

impl SnapshotReader {
    /// Read the current snapshot and its age.
    #[must_use]
    pub fn read(&self) -> SnapshotView {
        read_state(&self.inner)
    }
}

fn read_state(inner: &RwLock<StoreState>) -> SnapshotView {
    let state = inner.read();
    SnapshotView {
        snapshot: state.snapshot.clone(),
        age: state.written_at.map(|at| at.elapsed()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::AssetClass;
    use crate::domain::symbols::TrackedSymbol;
    use rust_decimal_macros::dec;

    fn quote(symbol: &str) -> Quote {
        let tracked = TrackedSymbol::new(symbol, AssetClass::Index, symbol, symbol);
        Quote::from_prices(&tracked, dec!(101), dec!(100), "USD")
    }

    #[test]
    fn new_store_is_empty() {
        let store = SnapshotStore::new();
        let view = store.read();
        assert!(view.is_empty());
        assert!(view.age.is_none());
    }

    #[test]
    fn empty_write_leaves_store_unchanged() {
        let store = SnapshotStore::new();
        store.write(vec![quote("IDX1")]);
        let before = store.read();

        assert_eq!(store.write(vec![]), WriteOutcome::NoUpdate);

        let after = store.read();
        assert_eq!(after.snapshot, before.snapshot);
    }

    #[test]
    fn write_replaces_snapshot() {
        let store = SnapshotStore::new();
        store.write(vec![quote("IDX1"), quote("IDX2")]);
        let outcome = store.write(vec![quote("IDX2")]);

        assert!(outcome.is_updated());
        let view = store.read();
        assert_eq!(view.snapshot.len(), 1);
        assert!(view.snapshot.quote("IDX2").is_some());
        assert!(view.snapshot.quote("IDX1").is_none());
    }

    #[test]
    fn captured_at_is_non_decreasing() {
        let store = SnapshotStore::new();
        let mut last = DateTime::<Utc>::UNIX_EPOCH;
        for _ in 0..50 {
            if let WriteOutcome::Updated(snapshot) = store.write(vec![quote("IDX1")]) {
                assert!(snapshot.captured_at >= last);
                last = snapshot.captured_at;
            }
        }
    }

    #[test]
    fn reader_sees_writes() {
        let store = SnapshotStore::new();
        let reader = store.reader();
        assert!(reader.read().is_empty());

        store.write(vec![quote("IDX1")]);
        assert_eq!(reader.read().snapshot.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn age_tracks_time_since_write() {
        let store = SnapshotStore::new();
        store.write(vec![quote("IDX1")]);

        tokio::time::advance(Duration::from_secs(45)).await;

        let age = store.read().age.unwrap();
        assert!(age >= Duration::from_secs(45));
        assert!(age < Duration::from_secs(46));
    }
}
