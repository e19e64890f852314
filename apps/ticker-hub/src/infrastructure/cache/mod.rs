//! File-backed Snapshot Cache
//!
//! Persists the last snapshot a viewer received as a small JSON document:
//!
//! ```json
//! {
//!   "market_ticker_data": [ ...quotes... ],
//!   "market_ticker_timestamp": "2026-01-29T00:00:00Z"
//! }
//! ```
//!
//! Writes go to a sibling temp file and are renamed into place, so a crash
//! mid-write leaves the previous document intact.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::application::ports::{CacheError, SnapshotCache};
use crate::domain::quote::Quote;
use crate::domain::snapshot::Snapshot;

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    market_ticker_data: Vec<Quote>,
    market_ticker_timestamp: DateTime<Utc>,
}

/// Snapshot cache stored in a single JSON file.
#[derive(Debug, Clone)]
pub struct FileSnapshotCache {
    path: PathBuf,
}

impl FileSnapshotCache {
    /// Create a cache at `path`. Nothing is touched until the first store.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the cache document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotCache for FileSnapshotCache {
    fn load(&self) -> Result<Option<Snapshot>, CacheError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let document: CacheDocument =
            serde_json::from_str(&text).map_err(|e| CacheError::Corrupt {
                message: e.to_string(),
            })?;

        if document.market_ticker_data.is_empty() {
            return Ok(None);
        }
        Ok(Some(Snapshot::new(
            document.market_ticker_data,
            document.market_ticker_timestamp,
        )))
    }

    fn store(&self, snapshot: &Snapshot) -> Result<(), CacheError> {
        if snapshot.is_empty() {
            return Ok(());
        }

        let document = CacheDocument {
            market_ticker_data: snapshot.quotes.clone(),
            market_ticker_timestamp: snapshot.captured_at,
        };
        let text = serde_json::to_string(&document).map_err(|e| CacheError::Corrupt {
            message: e.to_string(),
        })?;

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        std::fs::write(&temp, text)?;
        std::fs::rename(&temp, &self.path)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::fallback::bootstrap_snapshot;

    #[test]
    fn missing_file_loads_none() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("market_ticker.json"));
        assert!(cache.load().unwrap().is_none());
    }

    #[test]
    fn store_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("nested/market_ticker.json"));
        let snapshot = bootstrap_snapshot();

        cache.store(&snapshot).unwrap();
        let loaded = cache.load().unwrap().unwrap();

        assert_eq!(loaded, snapshot);
        assert!(!cache.temp_path().exists());
    }

    #[test]
    fn document_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("market_ticker.json"));
        cache.store(&bootstrap_snapshot()).unwrap();

        let text = std::fs::read_to_string(cache.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["market_ticker_data"].as_array().unwrap().len(), 11);
        assert_eq!(value["market_ticker_data"][0]["nameEn"], "Dow Jones");
        assert_eq!(value["market_ticker_timestamp"], "2026-01-29T00:00:00Z");
    }

    #[test]
    fn empty_snapshot_is_not_stored() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("market_ticker.json"));
        cache.store(&bootstrap_snapshot()).unwrap();

        cache.store(&Snapshot::empty()).unwrap();

        assert_eq!(cache.load().unwrap().unwrap().len(), 11);
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market_ticker.json");
        std::fs::write(&path, "{\"market_ticker_data\": [").unwrap();

        let cache = FileSnapshotCache::new(path);
        assert!(matches!(cache.load(), Err(CacheError::Corrupt { .. })));
    }

    #[test]
    fn clear_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FileSnapshotCache::new(dir.path().join("market_ticker.json"));
        cache.store(&bootstrap_snapshot()).unwrap();

        cache.clear().unwrap();
        cache.clear().unwrap();
        assert!(cache.load().unwrap().is_none());
    }
}
