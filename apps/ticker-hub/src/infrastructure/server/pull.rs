//! Pull Endpoint
//!
//! `GET /api/market-data` for clients that cannot hold a push channel.
//! Responses are memoized for `memo_ttl`; when the memo has expired and the
//! store is at least as old, the request triggers a refresh first. Bootstrap
//! responses are never memoized, so the next request retries upstream.

use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::application::services::RefreshCycle;
use crate::domain::fallback::{FallbackTier, TieredSnapshot};
use crate::domain::quote::Quote;
use crate::domain::snapshot::Snapshot;
use crate::infrastructure::hub::BroadcastHub;
use crate::infrastructure::metrics::{self, PullLabel};

/// Pull endpoint response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullResponse {
    /// Quotes in configured order.
    pub data: Vec<Quote>,
    /// Capture time, milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Source tier.
    pub tier: FallbackTier,
    /// Whether the data is not live.
    pub stale: bool,
}

impl PullResponse {
    /// Build a response from a tiered snapshot.
    #[must_use]
    pub fn from_tiered(tiered: &TieredSnapshot) -> Self {
        Self {
            data: tiered.snapshot.quotes.clone(),
            timestamp: tiered.snapshot.timestamp_millis(),
            tier: tiered.tier,
            stale: tiered.is_stale(),
        }
    }

    /// Convert back into a tiered snapshot.
    ///
    /// An out-of-range timestamp reads as the Unix epoch.
    #[must_use]
    pub fn into_tiered(self) -> TieredSnapshot {
        let captured_at =
            chrono::DateTime::<chrono::Utc>::from_timestamp_millis(self.timestamp).unwrap_or_default();
        TieredSnapshot::new(self.tier, Snapshot::new(self.data, captured_at))
    }
}

#[derive(Debug)]
struct Memo {
    tiered: TieredSnapshot,
    stored_at: Instant,
    /// Store age of the snapshot when it was memoized.
    data_age: Duration,
}

/// Memoizing pull responder.
#[derive(Debug)]
pub struct PullEndpoint {
    memo_ttl: Duration,
    memo: Mutex<Option<Memo>>,
}

impl PullEndpoint {
    /// Create a responder with the given memo lifetime.
    #[must_use]
    pub fn new(memo_ttl: Duration) -> Self {
        Self {
            memo_ttl,
            memo: Mutex::new(None),
        }
    }

    fn memoized(&self, stale_after: Duration) -> Option<TieredSnapshot> {
        let memo = self.memo.lock();
        let memo = memo.as_ref()?;
        let memo_age = memo.stored_at.elapsed();
        if memo_age >= self.memo_ttl {
            return None;
        }

        let mut tiered = memo.tiered.clone();
        if tiered.tier == FallbackTier::Live && memo.data_age + memo_age > stale_after {
            tiered.tier = FallbackTier::Cached;
        }
        Some(tiered)
    }

    /// Produce the current pull response, refreshing first if due.
    pub async fn respond(&self, cycle: &RefreshCycle, hub: &BroadcastHub) -> TieredSnapshot {
        let stale_after = hub.config().stale_after;
        if let Some(tiered) = self.memoized(stale_after) {
            metrics::record_pull(PullLabel::Memo);
            return tiered;
        }

        let view = cycle.reader().read();
        let due = view.age.is_none_or(|age| age >= self.memo_ttl);
        if due {
            let outcome = cycle.run_once().await;
            tracing::debug!(?outcome, "On-demand refresh for pull request");
        }

        let tiered = hub.current();
        let data_age = cycle.reader().read().age.unwrap_or_default();
        if tiered.tier == FallbackTier::Bootstrap {
            metrics::record_pull(PullLabel::Bootstrap);
        } else {
            metrics::record_pull(PullLabel::Store);
            *self.memo.lock() = Some(Memo {
                tiered: tiered.clone(),
                stored_at: Instant::now(),
                data_age,
            });
        }
        tiered
    }
}
