//! Error types for the repository module.

use outpost_core::RepositoryId;
use thiserror::Error;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepoError {
    /// Commit against a repository that is not the master.
    #[error("repository {0} is not a master")]
    NotMaster(RepositoryId),

    /// Commit with a version other than `highest + 1`.
    #[error("version {attempted} of {repo} is out of sequence, expected {expected}")]
    OutOfSequence {
        repo: RepositoryId,
        attempted: u64,
        expected: u64,
    },

    /// The version already exists with different content.
    #[error("version {version} of {repo} already exists with different content")]
    Conflict { repo: RepositoryId, version: u64 },

    /// The highest stored version is `u64::MAX`; nothing can follow it.
    #[error("no version left to commit in {0}")]
    VersionsExhausted(RepositoryId),

    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] outpost_store::StoreError),

    /// Remote call failed.
    #[error("sync error: {0}")]
    Sync(#[from] outpost_sync::SyncError),
}

impl RepoError {
    /// Sequencing violations must not be retried with the same version.
    pub fn is_sequencing(&self) -> bool {
        matches!(
            self,
            RepoError::NotMaster(_) | RepoError::OutOfSequence { .. } | RepoError::VersionsExhausted(_)
        )
    }
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
