//! Pull Source Port (Driven Port)
//!
//! Request/response access to the hub's current snapshot, used by the client
//! once the push channel has given up reconnecting.

use async_trait::async_trait;

use crate::domain::fallback::TieredSnapshot;

/// Pull error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PullError {
    /// Transport failure.
    #[error("Pull request failed: {message}")]
    Http {
        /// Error details.
        message: String,
    },

    /// Non-success HTTP status.
    #[error("Pull endpoint returned status {code}")]
    Status {
        /// HTTP status code.
        code: u16,
    },

    /// Response body could not be decoded.
    #[error("Failed to decode pull response: {message}")]
    Decode {
        /// Error details.
        message: String,
    },
}

/// Port for pulling the current snapshot.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullSource: Send + Sync {
    /// Fetch the hub's current snapshot with its tier.
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or the body is malformed.
    async fn pull(&self) -> Result<TieredSnapshot, PullError>;
}
