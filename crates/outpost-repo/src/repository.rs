//! Repository instances and commit sequencing.
//!
//! A repository is a numbered series of immutable content versions. The
//! master accepts `commit(v)` only for `v == highest + 1`; every instance,
//! master or replica, accepts replication `put`s of any version.
//!
//! ```text
//! {empty} --commit(1)--> {1} --commit(2)--> {1-2} --commit(3)--> ...
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use outpost_core::{CoreError, RepositoryId, SortedRangeSet};
use outpost_store::{PutOutcome, RepositoryStore};

use crate::error::{RepoError, Result};

/// Configuration of one repository instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub customer: String,
    pub name: String,
    /// Whether this instance accepts commits.
    pub master: bool,
    /// Stored as version 1 when the repository is opened empty.
    pub initial_content: Option<String>,
}

impl RepositoryConfig {
    /// A master instance.
    pub fn master(customer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            customer: customer.into(),
            name: name.into(),
            master: true,
            initial_content: None,
        }
    }

    /// A read-only replica.
    pub fn replica(customer: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            master: false,
            ..Self::master(customer, name)
        }
    }

    pub fn with_initial_content(mut self, content: impl Into<String>) -> Self {
        self.initial_content = Some(content.into());
        self
    }

    pub fn id(&self) -> RepositoryId {
        RepositoryId::new(self.customer.clone(), self.name.clone())
    }
}

/// One repository instance over a [`RepositoryStore`].
pub struct Repository<S: RepositoryStore> {
    id: RepositoryId,
    master: bool,
    store: S,
    /// Serializes writes so the sequencing check and the write are atomic.
    write_lock: Mutex<()>,
}

impl<S: RepositoryStore> Repository<S> {
    /// Open the repository described by `config`.
    ///
    /// An empty repository with `initial_content` gets it as version 1.
    pub async fn open(config: RepositoryConfig, store: S) -> Result<Self> {
        let id = config.id();
        if let Some(content) = &config.initial_content {
            if store.versions(&id).await?.is_empty() {
                store.put(&id, 1, Bytes::from(content.clone())).await?;
                tracing::info!(repo = %id, "stored initial content as version 1");
            }
        }
        Ok(Self {
            id,
            master: config.master,
            store,
            write_lock: Mutex::new(()),
        })
    }

    pub fn id(&self) -> &RepositoryId {
        &self.id
    }

    pub fn is_master(&self) -> bool {
        self.master
    }

    /// Every stored version.
    pub async fn versions(&self) -> Result<SortedRangeSet> {
        Ok(self.store.versions(&self.id).await?)
    }

    /// Highest stored version, 0 if none.
    pub async fn highest(&self) -> Result<u64> {
        Ok(self.versions().await?.high().unwrap_or(0))
    }

    /// The version a commit must carry next.
    pub async fn next_version(&self) -> Result<u64> {
        self.highest()
            .await?
            .checked_add(1)
            .ok_or_else(|| RepoError::VersionsExhausted(self.id.clone()))
    }

    /// Content of `version`, if stored.
    pub async fn checkout(&self, version: u64) -> Result<Option<Bytes>> {
        Ok(self.store.get(&self.id, version).await?)
    }

    /// Commit the next version. Master only; `version` must be `highest + 1`.
    pub async fn commit(&self, version: u64, content: Bytes) -> Result<()> {
        if !self.master {
            tracing::warn!(repo = %self.id, version, "commit rejected: not a master");
            return Err(RepoError::NotMaster(self.id.clone()));
        }

        let _guard = self.write_lock.lock().await;
        let expected = self.next_version().await?;
        if version != expected {
            tracing::warn!(repo = %self.id, version, expected, "commit rejected: out of sequence");
            return Err(RepoError::OutOfSequence {
                repo: self.id.clone(),
                attempted: version,
                expected,
            });
        }

        match self.store.put(&self.id, version, content).await? {
            PutOutcome::Stored => {
                tracing::info!(repo = %self.id, version, "committed");
                Ok(())
            }
            PutOutcome::Unchanged | PutOutcome::Conflict => Err(RepoError::Conflict {
                repo: self.id.clone(),
                version,
            }),
        }
    }

    /// Replication write of any version, regardless of the master flag.
    pub async fn put(&self, version: u64, content: Bytes) -> Result<PutOutcome> {
        let _guard = self.write_lock.lock().await;
        let outcome = self.store.put(&self.id, version, content).await?;
        if outcome == PutOutcome::Conflict {
            tracing::warn!(repo = %self.id, version, "replicated version conflicts with stored content");
        }
        Ok(outcome)
    }
}

/// One line of a repository query: `encode(customer),encode(name),versions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryListing {
    pub id: RepositoryId,
    pub versions: SortedRangeSet,
}

impl fmt::Display for RepositoryListing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.id.to_record_prefix(), self.versions)
    }
}

impl FromStr for RepositoryListing {
    type Err = CoreError;

    fn from_str(s: &str) -> std::result::Result<Self, CoreError> {
        let mut fields = s.splitn(3, ',');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(customer), Some(name), Some(versions)) => Ok(Self {
                id: RepositoryId::from_record_fields(customer, name)?,
                versions: versions.parse()?,
            }),
            _ => Err(CoreError::MalformedDescriptor(s.to_string())),
        }
    }
}
