//! Quote Source Adapter
//!
//! Fetches a batch of symbols concurrently through a [`QuoteSource`]. Every
//! fetch settles independently: one slow or failing symbol never aborts the
//! batch, it only shows up in [`BatchResult::failures`].

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::quote::Quote;
use crate::domain::symbols::{Symbol, TrackedSymbol};
use crate::infrastructure::metrics;

/// A symbol that could not be fetched.
#[derive(Debug, Clone)]
pub struct SymbolFailure {
    /// The symbol.
    pub symbol: Symbol,
    /// Why it failed.
    pub error: SourceError,
}

/// Outcome of fetching a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchResult {
    /// Successful quotes, in requested order.
    pub quotes: Vec<Quote>,
    /// Failed symbols, in requested order.
    pub failures: Vec<SymbolFailure>,
}

impl BatchResult {
    /// Whether no symbol succeeded.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.quotes.is_empty()
    }
}

/// Concurrent batch fetcher over a single quote source.
#[derive(Clone)]
pub struct QuoteSourceAdapter {
    source: Arc<dyn QuoteSource>,
    timeout: Duration,
}

impl std::fmt::Debug for QuoteSourceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuoteSourceAdapter")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl QuoteSourceAdapter {
    /// Create an adapter with a per-symbol deadline.
    #[must_use]
    pub fn new(source: Arc<dyn QuoteSource>, timeout: Duration) -> Self {
        Self { source, timeout }
    }

    /// Fetch every symbol concurrently and keep the successes.
    pub async fn fetch_all(&self, symbols: &[TrackedSymbol]) -> BatchResult {
        let fetches = symbols.iter().map(|symbol| self.fetch_one(symbol));
        let settled = join_all(fetches).await;

        let mut batch = BatchResult::default();
        for (symbol, result) in symbols.iter().zip(settled) {
            match result {
                Ok(quote) => batch.quotes.push(quote),
                Err(error) => {
                    warn!(symbol = %symbol.symbol, error = %error, "Quote fetch failed");
                    metrics::record_symbol_failure(&symbol.symbol, error.kind());
                    batch.failures.push(SymbolFailure {
                        symbol: symbol.symbol.clone(),
                        error,
                    });
                }
            }
        }

        debug!(
            succeeded = batch.quotes.len(),
            failed = batch.failures.len(),
            "Batch fetch settled"
        );
        batch
    }

    async fn fetch_one(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError> {
        match tokio::time::timeout(self.timeout, self.source.fetch_quote(symbol)).await {
            Ok(result) => result,
            Err(_) => Err(SourceError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockQuoteSource;
    use crate::domain::quote::AssetClass;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;

    fn tracked(symbol: &str) -> TrackedSymbol {
        TrackedSymbol::new(symbol, AssetClass::Index, symbol, symbol)
    }

    #[tokio::test]
    async fn keeps_successes_in_order() {
        let mut source = MockQuoteSource::new();
        source.expect_fetch_quote().returning(|symbol| {
            if symbol.symbol == "IDX2" {
                Err(SourceError::NoResult {
                    symbol: symbol.symbol.clone(),
                })
            } else {
                Ok(Quote::from_prices(symbol, dec!(10), dec!(9), "USD"))
            }
        });

        let adapter = QuoteSourceAdapter::new(Arc::new(source), Duration::from_secs(1));
        let batch = adapter
            .fetch_all(&[tracked("IDX1"), tracked("IDX2"), tracked("IDX3")])
            .await;

        let symbols: Vec<_> = batch.quotes.iter().map(|q| q.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["IDX1", "IDX3"]);
        assert_eq!(batch.failures.len(), 1);
        assert_eq!(batch.failures[0].symbol, "IDX2");
        assert!(!batch.is_total_failure());
    }

    #[tokio::test]
    async fn total_failure() {
        let mut source = MockQuoteSource::new();
        source.expect_fetch_quote().times(2).returning(|_| {
            Err(SourceError::Http {
                message: "connection refused".to_string(),
            })
        });

        let adapter = QuoteSourceAdapter::new(Arc::new(source), Duration::from_secs(1));
        let batch = adapter.fetch_all(&[tracked("IDX1"), tracked("IDX2")]).await;

        assert!(batch.is_total_failure());
        assert_eq!(batch.failures.len(), 2);
    }

    struct StallingSource;

    #[async_trait]
    impl QuoteSource for StallingSource {
        async fn fetch_quote(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError> {
            if symbol.symbol == "SLOW" {
                tokio::time::sleep(Duration::from_secs(600)).await;
            }
            Ok(Quote::from_prices(symbol, dec!(1), dec!(1), "USD"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_symbol_times_out_alone() {
        let adapter = QuoteSourceAdapter::new(Arc::new(StallingSource), Duration::from_secs(10));
        let batch = adapter.fetch_all(&[tracked("SLOW"), tracked("FAST")]).await;

        assert_eq!(batch.quotes.len(), 1);
        assert_eq!(batch.quotes[0].symbol, "FAST");
        assert!(matches!(
            batch.failures[0].error,
            SourceError::Timeout { timeout_ms: 10_000 }
        ));
    }
}
