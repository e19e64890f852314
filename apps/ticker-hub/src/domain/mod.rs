//! Domain Layer - Quote, snapshot and fallback types.
//!
//! Pure types and rules with no I/O. The refresh cycle, hub and client
//! channel all exchange these.

/// Quote and asset-class types.
pub mod quote;

/// Tracked symbol catalog.
pub mod symbols;

/// Snapshot and single-writer snapshot store.
pub mod snapshot;

/// Live, cached and bootstrap tier selection.
pub mod fallback;

/// Ticker line formatting.
pub mod display;
