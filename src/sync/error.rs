//! Sync engine error types
//!
//! Defines the errors raised by balance sources and by the engine itself.

use thiserror::Error;

/// Errors returned by a [`BalanceSource`](super::BalanceSource)
///
/// `Clone` so a single failed in-flight fetch can be handed to every
/// caller that was waiting on it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Could not reach the remote service
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the client timeout
    #[error("Request timed out")]
    Timeout,

    /// Remote answered with a server-side failure
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Requested account or grove does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Response body could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_) | SourceError::Timeout | SourceError::Upstream(_)
        )
    }
}

/// Errors that can occur in the sync engine
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// No account override was given and no account is connected
    #[error("No account connected")]
    NoAccount,

    /// The balance source failed after all retries
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
