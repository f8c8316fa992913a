//! Error types for the node.

use outpost_core::RepositoryId;
use outpost_repo::RepoError;
use outpost_store::StoreError;
use outpost_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Log sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Repository error.
    #[error("repository error: {0}")]
    Repo(#[from] RepoError),

    /// The node does not host this repository.
    #[error("unknown repository: {0}")]
    UnknownRepository(RepositoryId),
}

impl NodeError {
    /// Whether retrying on the next tick may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            NodeError::Sync(e) | NodeError::Repo(RepoError::Sync(e)) => e.is_transient(),
            _ => false,
        }
    }
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;
