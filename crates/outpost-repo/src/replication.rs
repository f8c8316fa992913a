//! Replication pass for one repository.
//!
//! Mirrors the log sync pass at whole-version granularity: the remote's
//! listing is diffed against the local version set and only missing
//! versions move, in ascending order.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use outpost_core::SortedRangeSet;
use outpost_store::{PutOutcome, RepositoryStore};
use outpost_sync::{Transport, DEFAULT_REQUEST_TIMEOUT};

use crate::client::ReplicationClient;
use crate::error::{RepoError, Result};
use crate::repository::Repository;

/// Configuration for replication passes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Bound on each remote call.
    #[serde(with = "outpost_sync::duration_ms")]
    pub request_timeout: Duration,
    /// Write local versions the remote lacks.
    pub push: bool,
    /// Fetch remote versions we lack.
    pub pull: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            push: true,
            pull: true,
        }
    }
}

/// Result of a replication pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplicationReport {
    /// Versions fetched and stored locally.
    pub pulled: usize,
    /// Versions written to the remote.
    pub pushed: usize,
    /// Versions held on both sides with different content.
    pub conflicts: usize,
    pub pull_error: Option<String>,
    pub push_error: Option<String>,
}

impl ReplicationReport {
    pub fn had_work(&self) -> bool {
        self.pulled + self.pushed > 0
    }

    pub fn is_success(&self) -> bool {
        self.pull_error.is_none() && self.push_error.is_none()
    }
}

/// Replicates one local repository with the same repository on a remote.
pub struct Replicator<S: RepositoryStore, T: Transport> {
    repository: Arc<Repository<S>>,
    client: ReplicationClient<T>,
    config: ReplicationConfig,
}

impl<S: RepositoryStore, T: Transport> Replicator<S, T> {
    pub fn new(
        repository: Arc<Repository<S>>,
        transport: T,
        endpoint: impl Into<String>,
        config: ReplicationConfig,
    ) -> Self {
        let client = ReplicationClient::new(transport, endpoint).with_timeout(config.request_timeout);
        Self {
            repository,
            client,
            config,
        }
    }

    pub fn repository(&self) -> &Arc<Repository<S>> {
        &self.repository
    }

    /// Run one pass.
    ///
    /// Returns `Err` only if the remote could not be queried.
    pub async fn synchronize(&self) -> Result<ReplicationReport> {
        let id = self.repository.id();
        let remote = self
            .client
            .query(Some(id.customer.as_str()), Some(id.name.as_str()))
            .await?
            .into_iter()
            .find(|listing| &listing.id == id)
            .map(|listing| listing.versions)
            .unwrap_or_default();
        let local = self.repository.versions().await?;

        let mut report = ReplicationReport::default();

        if self.config.pull {
            let delta = local.diff_dest(&remote);
            if let Err(e) = self.pull(&delta, &mut report).await {
                tracing::warn!(repo = %id, endpoint = self.client.endpoint(), error = %e, "pull failed");
                report.pull_error = Some(e.to_string());
            }
        }
        if self.config.push {
            let delta = remote.diff_dest(&local);
            if let Err(e) = self.push(&delta, &mut report).await {
                tracing::warn!(repo = %id, endpoint = self.client.endpoint(), error = %e, "push failed");
                report.push_error = Some(e.to_string());
            }
        }

        tracing::debug!(
            repo = %id,
            pulled = report.pulled,
            pushed = report.pushed,
            conflicts = report.conflicts,
            "replication pass complete"
        );
        Ok(report)
    }

    async fn pull(&self, delta: &SortedRangeSet, report: &mut ReplicationReport) -> Result<()> {
        let id = self.repository.id();
        for version in delta {
            let Some(content) = self.client.get(id, version).await? else {
                tracing::debug!(repo = %id, version, "listed version vanished from remote");
                continue;
            };
            match self.repository.put(version, content).await? {
                PutOutcome::Stored => report.pulled += 1,
                PutOutcome::Unchanged => {}
                PutOutcome::Conflict => report.conflicts += 1,
            }
        }
        Ok(())
    }

    async fn push(&self, delta: &SortedRangeSet, report: &mut ReplicationReport) -> Result<()> {
        let id = self.repository.id();
        for version in delta {
            let Some(content) = self.repository.checkout(version).await? else {
                continue;
            };
            match self.client.put(id, version, content).await {
                Ok(()) => report.pushed += 1,
                Err(RepoError::Conflict { .. }) => {
                    tracing::warn!(repo = %id, version, "remote holds different content");
                    report.conflicts += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use outpost_store::MemoryRepositoryStore;
    use outpost_sync::{MemoryNetwork, MemoryTransport};

    use crate::repository::RepositoryConfig;
    use crate::server::RepositoryServer;

    type Repo = Arc<Repository<MemoryRepositoryStore>>;

    struct Fixture {
        network: Arc<MemoryNetwork>,
        master: Repo,
        replica: Repo,
    }

    impl Fixture {
        async fn new() -> Self {
            let master = Arc::new(
                Repository::open(RepositoryConfig::master("acme", "shop"), MemoryRepositoryStore::new())
                    .await
                    .unwrap(),
            );
            let replica = Arc::new(
                Repository::open(RepositoryConfig::replica("acme", "shop"), MemoryRepositoryStore::new())
                    .await
                    .unwrap(),
            );
            let network = MemoryNetwork::new();
            network
                .register(
                    "master",
                    Arc::new(RepositoryServer::new().with_repository(Arc::clone(&master))),
                )
                .await;
            Self {
                network,
                master,
                replica,
            }
        }

        fn replicator(&self) -> Replicator<MemoryRepositoryStore, MemoryTransport> {
            Replicator::new(
                Arc::clone(&self.replica),
                self.network.transport(),
                "master",
                ReplicationConfig::default(),
            )
        }
    }

    #[tokio::test]
    async fn test_replica_catches_up() {
        let fx = Fixture::new().await;
        for (v, body) in [(1, "a"), (2, "b"), (3, "c")] {
            fx.master.commit(v, Bytes::from(body)).await.unwrap();
        }

        let report = fx.replicator().synchronize().await.unwrap();
        assert_eq!(report.pulled, 3);
        assert!(report.is_success());
        assert_eq!(fx.replica.versions().await.unwrap().to_string(), "1-3");
        assert_eq!(&fx.replica.checkout(3).await.unwrap().unwrap()[..], b"c");

        let again = fx.replicator().synchronize().await.unwrap();
        assert!(!again.had_work());
    }

    #[tokio::test]
    async fn test_push_fills_remote_gaps() {
        let fx = Fixture::new().await;
        fx.replica.put(1, Bytes::from_static(b"a")).await.unwrap();
        fx.replica.put(2, Bytes::from_static(b"b")).await.unwrap();

        let report = fx.replicator().synchronize().await.unwrap();
        assert_eq!(report.pushed, 2);
        assert_eq!(fx.master.highest().await.unwrap(), 2);

        fx.master.commit(3, Bytes::from_static(b"c")).await.unwrap();
        let report = fx.replicator().synchronize().await.unwrap();
        assert_eq!((report.pulled, report.pushed), (1, 0));
    }

    #[tokio::test]
    async fn test_held_versions_are_not_overwritten() {
        let fx = Fixture::new().await;
        fx.master.commit(1, Bytes::from_static(b"a")).await.unwrap();
        fx.master.commit(2, Bytes::from_static(b"b")).await.unwrap();
        fx.replica.put(1, Bytes::from_static(b"different")).await.unwrap();

        let report = fx.replicator().synchronize().await.unwrap();
        assert_eq!(report.pulled, 1);
        assert_eq!(report.conflicts, 0);
        assert_eq!(&fx.replica.checkout(1).await.unwrap().unwrap()[..], b"different");
    }

    #[tokio::test]
    async fn test_offline_master_fails_the_pass() {
        let fx = Fixture::new().await;
        fx.network.set_online("master", false).await;

        let err = fx.replicator().synchronize().await.unwrap_err();
        assert!(matches!(err, RepoError::Sync(ref e) if e.is_transient()));
    }
}
