//! Freshness Fallback
//!
//! Every snapshot surfaced to a caller carries the tier it came from:
//!
//! - `Live`: fresh data from the current refresh cycle or push channel
//! - `Cached`: the last good snapshot persisted or retained locally
//! - `Bootstrap`: the compiled-in reference snapshot
//!
//! Selection is strict priority. Tiers are never blended, so a caller sees
//! exactly one tier's snapshot at a time.

mod bootstrap;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use bootstrap::{bootstrap_snapshot, bootstrap_snapshot_for};

use crate::domain::snapshot::{Snapshot, SnapshotView};

// =============================================================================
// Tier
// =============================================================================

/// Where a displayed snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackTier {
    /// Fresh data.
    Live,
    /// Retained or persisted data past its freshness window.
    Cached,
    /// Compiled-in reference data.
    Bootstrap,
}

impl FallbackTier {
    /// Get the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Cached => "cached",
            Self::Bootstrap => "bootstrap",
        }
    }
}

impl std::fmt::Display for FallbackTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot tagged with its tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieredSnapshot {
    /// Source tier.
    pub tier: FallbackTier,
    /// The snapshot itself.
    pub snapshot: Snapshot,
}

impl TieredSnapshot {
    /// Tag a snapshot.
    #[must_use]
    pub const fn new(tier: FallbackTier, snapshot: Snapshot) -> Self {
        Self { tier, snapshot }
    }

    /// Whether the data should be shown with a staleness indicator.
    #[must_use]
    pub const fn is_stale(&self) -> bool {
        !matches!(self.tier, FallbackTier::Live)
    }
}

// =============================================================================
// Selection
// =============================================================================

/// Pick the highest-priority non-empty snapshot.
///
/// Live beats cached, cached beats bootstrap. Empty candidates are skipped.
#[must_use]
pub fn select_tier(
    live: Option<&Snapshot>,
    cached: Option<&Snapshot>,
    bootstrap: &Snapshot,
) -> TieredSnapshot {
    if let Some(snapshot) = live.filter(|s| !s.is_empty()) {
        return TieredSnapshot::new(FallbackTier::Live, snapshot.clone());
    }
    if let Some(snapshot) = cached.filter(|s| !s.is_empty()) {
        return TieredSnapshot::new(FallbackTier::Cached, snapshot.clone());
    }
    TieredSnapshot::new(FallbackTier::Bootstrap, bootstrap.clone())
}

/// Classify a server-side store read.
///
/// An empty store yields the bootstrap snapshot. A retained snapshot older
/// than `stale_after` is reported as cached rather than live.
#[must_use]
pub fn classify_view(
    view: &SnapshotView,
    stale_after: Duration,
    bootstrap: &Snapshot,
) -> TieredSnapshot {
    if view.is_empty() {
        return TieredSnapshot::new(FallbackTier::Bootstrap, bootstrap.clone());
    }

    let tier = match view.age {
        Some(age) if age <= stale_after => FallbackTier::Live,
        _ => FallbackTier::Cached,
    };
    TieredSnapshot::new(tier, view.snapshot.clone())
}

// =============================================================================
// Controller
// =============================================================================

/// Client-side holder of the three tiers.
#[derive(Debug, Clone)]
pub struct FallbackController {
    live: Option<Snapshot>,
    cached: Option<Snapshot>,
    bootstrap: Snapshot,
}

impl FallbackController {
    /// Create a controller with only the bootstrap tier populated.
    #[must_use]
    pub const fn new(bootstrap: Snapshot) -> Self {
        Self {
            live: None,
            cached: None,
            bootstrap,
        }
    }

    /// Accept a snapshot from the live channel. Empty snapshots are ignored.
    ///
    /// Returns `true` if the live tier changed.
    pub fn accept_live(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.is_empty() {
            return false;
        }
        self.live = Some(snapshot);
        true
    }

    /// Install a snapshot loaded from the local cache. Empty snapshots are
    /// ignored.
    pub fn load_cached(&mut self, snapshot: Snapshot) -> bool {
        if snapshot.is_empty() {
            return false;
        }
        self.cached = Some(snapshot);
        true
    }

    /// Whether any non-bootstrap data is held.
    #[must_use]
    pub const fn has_data(&self) -> bool {
        self.live.is_some() || self.cached.is_some()
    }

    /// The snapshot to display.
    #[must_use]
    pub fn current(&self) -> TieredSnapshot {
        select_tier(self.live.as_ref(), self.cached.as_ref(), &self.bootstrap)
    }

    /// Tier of [`Self::current`].
    #[must_use]
    pub const fn tier(&self) -> FallbackTier {
        if self.live.is_some() {
            FallbackTier::Live
        } else if self.cached.is_some() {
            FallbackTier::Cached
        } else {
            FallbackTier::Bootstrap
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::quote::{AssetClass, Quote};
    use crate::domain::symbols::TrackedSymbol;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn snapshot(symbol: &str, secs: i64) -> Snapshot {
        let tracked = TrackedSymbol::new(symbol, AssetClass::Index, symbol, symbol);
        let quote = Quote::from_prices(&tracked, dec!(10), dec!(9), "USD");
        Snapshot::new(
            vec![quote],
            DateTime::<Utc>::from_timestamp(secs, 0).unwrap(),
        )
    }

    #[test]
    fn live_beats_cached() {
        let live = snapshot("LIVE", 200);
        let cached = snapshot("CACHE", 100);
        let chosen = select_tier(Some(&live), Some(&cached), &bootstrap_snapshot());
        assert_eq!(chosen.tier, FallbackTier::Live);
        assert_eq!(chosen.snapshot, live);
    }

    #[test]
    fn cached_beats_bootstrap() {
        let cached = snapshot("CACHE", 100);
        let chosen = select_tier(None, Some(&cached), &bootstrap_snapshot());
        assert_eq!(chosen.tier, FallbackTier::Cached);
        assert_eq!(chosen.snapshot, cached);
        assert!(chosen.is_stale());
    }

    #[test]
    fn empty_tiers_are_skipped() {
        let empty = Snapshot::empty();
        let chosen = select_tier(Some(&empty), Some(&empty), &bootstrap_snapshot());
        assert_eq!(chosen.tier, FallbackTier::Bootstrap);
        assert_eq!(chosen.snapshot.len(), 11);
    }

    #[test]
    fn selection_is_not_blended() {
        let live = snapshot("LIVE", 200);
        let cached = snapshot("CACHE", 100);
        let chosen = select_tier(Some(&live), Some(&cached), &bootstrap_snapshot());
        assert!(chosen.snapshot.quote("CACHE").is_none());
    }

    #[test]
    fn classify_empty_store_is_bootstrap() {
        let view = SnapshotView {
            snapshot: Snapshot::empty(),
            age: None,
        };
        let tiered = classify_view(&view, Duration::from_secs(90), &bootstrap_snapshot());
        assert_eq!(tiered.tier, FallbackTier::Bootstrap);
        assert!(!tiered.snapshot.is_empty());
    }

    #[test]
    fn classify_by_age() {
        let bootstrap = bootstrap_snapshot();
        let fresh = SnapshotView {
            snapshot: snapshot("IDX1", 100),
            age: Some(Duration::from_secs(90)),
        };
        let old = SnapshotView {
            snapshot: snapshot("IDX1", 100),
            age: Some(Duration::from_secs(91)),
        };

        let stale_after = Duration::from_secs(90);
        assert_eq!(classify_view(&fresh, stale_after, &bootstrap).tier, FallbackTier::Live);
        assert_eq!(classify_view(&old, stale_after, &bootstrap).tier, FallbackTier::Cached);
    }

    #[test]
    fn controller_ignores_empty_snapshots() {
        let mut controller = FallbackController::new(bootstrap_snapshot());
        assert!(!controller.accept_live(Snapshot::empty()));
        assert!(!controller.load_cached(Snapshot::empty()));
        assert_eq!(controller.tier(), FallbackTier::Bootstrap);
        assert!(!controller.has_data());
    }

    #[test]
    fn controller_promotes_live() {
        let mut controller = FallbackController::new(bootstrap_snapshot());
        controller.load_cached(snapshot("CACHE", 100));
        assert_eq!(controller.current().tier, FallbackTier::Cached);

        controller.accept_live(snapshot("LIVE", 200));
        let current = controller.current();
        assert_eq!(current.tier, FallbackTier::Live);
        assert_eq!(controller.tier(), FallbackTier::Live);
        assert!(current.snapshot.quote("LIVE").is_some());
    }

    #[test]
    fn tier_wire_names() {
        assert_eq!(serde_json::to_string(&FallbackTier::Bootstrap).unwrap(), "\"bootstrap\"");
        assert_eq!(FallbackTier::Cached.to_string(), "cached");
    }
}
