//! Error types for the sync module.

use thiserror::Error;

/// Errors that can occur during sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Transport-level error: the endpoint could not be reached.
    #[error("transport error: {0}")]
    Transport(String),

    /// A remote call did not complete within the request timeout.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] outpost_store::StoreError),

    /// The remote answered with an unexpected status.
    #[error("remote returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// The remote answered with a body that is not valid text.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SyncError {
    /// Whether the failure is worth retrying on the next scheduled pass.
    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Timeout(_))
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
