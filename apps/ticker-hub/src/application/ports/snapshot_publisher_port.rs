//! Snapshot Publisher Port (Driven Port)
//!
//! Lets the refresh cycle hand a freshly written snapshot to whatever fans it
//! out, without depending on the transport.

use crate::domain::snapshot::Snapshot;

/// Delivery counts for one publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Subscribers whose queue accepted the frame.
    pub delivered: usize,
    /// Subscribers evicted because their queue was full or closed.
    pub dropped: usize,
}

/// Port for fanning a snapshot out to subscribers.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotPublisher: Send + Sync {
    /// Publish a snapshot. Must not block on slow subscribers.
    fn publish(&self, snapshot: &Snapshot) -> PublishReport;
}
