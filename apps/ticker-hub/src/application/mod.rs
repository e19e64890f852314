//! Application Layer - Use cases and port definitions.
//!
//! The refresh cycle and batch fetching live here, together with the ports
//! that the infrastructure adapters implement.

/// Port interfaces for quote sources, publishing, caching and pull.
pub mod ports;

/// Application services for fetching and refreshing snapshots.
pub mod services;
