//! Quote Source Port (Driven Port)
//!
//! Interface for fetching the current quote of one instrument from an
//! upstream provider. Implementations are stateless apart from their client.

use async_trait::async_trait;

use crate::domain::quote::Quote;
use crate::domain::symbols::TrackedSymbol;

/// Per-symbol fetch error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Transport failure.
    #[error("Upstream request failed: {message}")]
    Http {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("Upstream returned status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
        /// Truncated response body.
        body: String,
    },

    /// Response body could not be decoded.
    #[error("Failed to decode upstream response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },

    /// A required field was absent.
    #[error("Missing {field} for {symbol}")]
    MissingField {
        /// Requested symbol.
        symbol: String,
        /// Name of the absent field.
        field: &'static str,
    },

    /// The provider returned no result for the symbol.
    #[error("No result for {symbol}")]
    NoResult {
        /// Requested symbol.
        symbol: String,
    },

    /// The provider reported an error of its own.
    #[error("Upstream error: {code}: {description}")]
    Upstream {
        /// Provider error code.
        code: String,
        /// Provider error description.
        description: String,
    },

    /// The fetch exceeded its deadline.
    #[error("Fetch timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline that elapsed.
        timeout_ms: u64,
    },
}

impl SourceError {
    /// Short label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Http { .. } => "http",
            Self::Status { .. } => "status",
            Self::Decode { .. } => "decode",
            Self::MissingField { .. } => "missing_field",
            Self::NoResult { .. } => "no_result",
            Self::Upstream { .. } => "upstream",
            Self::Timeout { .. } => "timeout",
        }
    }
}

/// Port for per-symbol quote retrieval.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteSource: Send + Sync {
    /// Fetch the current quote for one symbol.
    ///
    /// # Errors
    ///
    /// Returns error if the upstream request fails or the response lacks a
    /// price.
    async fn fetch_quote(&self, symbol: &TrackedSymbol) -> Result<Quote, SourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        let timeout = SourceError::Timeout { timeout_ms: 10_000 };
        assert_eq!(timeout.kind(), "timeout");
        assert_eq!(timeout.to_string(), "Fetch timed out after 10000ms");

        let missing = SourceError::MissingField {
            symbol: "^DJI".to_string(),
            field: "regularMarketPrice",
        };
        assert_eq!(missing.to_string(), "Missing regularMarketPrice for ^DJI");
    }
}
