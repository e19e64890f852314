//! Failover Quote Source
//!
//! Tries each configured source in order for every symbol. The first
//! success wins; if all fail, the last error is returned.
//!
//! With an attempt timeout set, each source gets at most that long, so a
//! hanging primary cannot use up the caller's whole deadline.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::application::ports::{QuoteSource, SourceError};
use crate::domain::quote::Quote;
use crate::domain::symbols::TrackedSymbol;

/// Ordered list of quote sources.
#[derive(Clone)]
pub struct FailoverQuoteSource {
    sources: Vec<Arc<dyn QuoteSource>>,
    attempt_timeout: Option<Duration>,
}

impl std::fmt::Debug for FailoverQuoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailoverQuoteSource")
            .field("sources", &self.sources.len())
            .field("attempt_timeout", &self.attempt_timeout)
            .finish()
    }
}

impl FailoverQuoteSource {
    /// Create a failover chain, primary first.
    #[must_use]
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>) -> Self {
        Self {
            sources,
            attempt_timeout: None,
        }
    }

    /// Even share of `deadline` for each of `sources` attempts.
    #[must_use]
    pub fn attempt_share(deadline: Duration, sources: usize) -> Duration {
        deadline / u32::try_from(sources.max(1)).unwrap_or(u32::MAX)
    }

    /// Bound each source's attempt.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    async fn attempt(
        &self,
        source: &dyn QuoteSource,
        symbol: &TrackedSymbol,
    ) -> Result<Quote, SourceError> {
        let Some(limit) = self.attempt_timeout else {
            return source.fetch_quote(symbol).await;
        };
        tokio::time::timeout(limit, source.fetch_quote(symbol))
            .await
            .unwrap_or_else(|_| {
                Err(SourceError::Timeout {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }

    /// Number of sources in the chain.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// Whether the chain has no sources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl QuoteSource for FailoverQuoteSource {
    async fn fetch_quote(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError> {
        let mut last_error = SourceError::NoResult {
            symbol: symbol.symbol.clone(),
        };

        for (index, source) in self.sources.iter().enumerate() {
            match self.attempt(source.as_ref(), symbol).await {
                Ok(quote) => {
                    if index > 0 {
                        tracing::info!(
                            symbol = %symbol.symbol,
                            source = index,
                            "Quote served by backup source"
                        );
                    }
                    return Ok(quote);
                }
                Err(error) => {
                    tracing::debug!(
                        symbol = %symbol.symbol,
                        source = index,
                        error = %error,
                        "Source failed, trying next"
                    );
                    last_error = error;
                }
            }
        }

        Err(last_error)
    }
}
