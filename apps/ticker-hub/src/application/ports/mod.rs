//! Application Ports (Driver and Driven)
//!
//! Ports define interfaces for interacting with external systems.
//! - **Driven Ports**: upstream quote sources, snapshot publishing, the local
//!   snapshot cache and the pull fallback endpoint

mod pull_source_port;
mod quote_source_port;
mod snapshot_cache_port;
mod snapshot_publisher_port;

pub use pull_source_port::{PullError, PullSource};
pub use quote_source_port::{QuoteSource, SourceError};
pub use snapshot_cache_port::{CacheError, SnapshotCache};
pub use snapshot_publisher_port::{PublishReport, SnapshotPublisher};

#[cfg(test)]
pub use pull_source_port::MockPullSource;
#[cfg(test)]
pub use quote_source_port::MockQuoteSource;
#[cfg(test)]
pub use snapshot_cache_port::MockSnapshotCache;
#[cfg(test)]
pub use snapshot_publisher_port::MockSnapshotPublisher;
