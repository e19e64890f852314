//! Upstream Quote Providers
//!
//! Concrete [`QuoteSource`](crate::application::ports::QuoteSource)
//! implementations:
//!
//! - [`ChartApiSource`]: HTTP chart API returning daily chart metadata
//! - [`FailoverQuoteSource`]: ordered list of sources tried per symbol

mod chart;
mod failover;

pub use chart::{ChartApiConfig, ChartApiSource, ProviderError};
pub use failover::FailoverQuoteSource;
