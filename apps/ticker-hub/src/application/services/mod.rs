//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `QuoteSourceAdapter`: Concurrent per-symbol fetching with timeouts
//! - `RefreshCycle`: Periodic fetch, store write and publish

pub mod refresh;
pub mod source_adapter;

pub use refresh::{CycleOutcome, CycleState, RefreshCycle};
pub use source_adapter::{BatchResult, QuoteSourceAdapter, SymbolFailure};
