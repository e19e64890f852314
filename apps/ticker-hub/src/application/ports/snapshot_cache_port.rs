//! Snapshot Cache Port (Driven Port)
//!
//! Durable client-side storage for the last snapshot received, so a viewer
//! can show data immediately on the next start.

use crate::domain::snapshot::Snapshot;

/// Cache error.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Filesystem failure.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored data could not be parsed.
    #[error("Cache data is corrupt: {message}")]
    Corrupt {
        /// Error details.
        message: String,
    },
}

/// Port for persisting the last good snapshot.
#[cfg_attr(test, mockall::automock)]
pub trait SnapshotCache: Send + Sync {
    /// Load the stored snapshot, `None` if nothing has been stored.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be read or is corrupt.
    fn load(&self) -> Result<Option<Snapshot>, CacheError>;

    /// Store a snapshot. Empty snapshots are ignored.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be written.
    fn store(&self, snapshot: &Snapshot) -> Result<(), CacheError>;

    /// Remove any stored snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if the storage cannot be removed.
    fn clear(&self) -> Result<(), CacheError>;
}
