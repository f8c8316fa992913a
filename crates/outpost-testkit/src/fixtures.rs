//! Test fixtures and helpers.
//!
//! Common setup for sync and replication tests: stores seeded with known
//! logs, and a local/remote pair wired over an in-memory network.

use std::sync::Arc;

use outpost_core::{Event, LogId, SortedRangeSet};
use outpost_repo::{Repository, RepositoryConfig, RepositoryServer};
use outpost_store::{LogStore, MemoryLogStore, MemoryRepositoryStore};
use outpost_sync::{LogServer, LogSync, MemoryNetwork, MemoryTransport, SyncConfig};

use crate::generators::log_events;

/// Endpoint name the remote side is registered under.
pub const REMOTE: &str = "remote";

/// Build a memory store holding exactly `logs`, given as
/// `(target_id, store_id, ids)`. Unparseable ids seed nothing.
pub async fn seeded_store(logs: &[(&str, u64, &str)]) -> outpost_store::Result<Arc<MemoryLogStore>> {
    let store = Arc::new(MemoryLogStore::new());
    for (target_id, store_id, ids) in logs {
        let ids: SortedRangeSet = ids.parse().unwrap_or_default();
        store.put(&log_events(target_id, *store_id, &ids)).await?;
    }
    Ok(store)
}

/// A local store syncing with a remote store served over a memory network.
pub struct SyncPair {
    pub network: Arc<MemoryNetwork>,
    pub local: Arc<MemoryLogStore>,
    pub remote: Arc<MemoryLogStore>,
}

impl SyncPair {
    /// Wire `local` to `remote`, registered under [`REMOTE`].
    pub async fn new(local: Arc<MemoryLogStore>, remote: Arc<MemoryLogStore>) -> Self {
        let network = MemoryNetwork::new();
        network
            .register(REMOTE, Arc::new(LogServer::new(Arc::clone(&remote))))
            .await;
        Self {
            network,
            local,
            remote,
        }
    }

    /// A pair of empty stores.
    pub async fn empty() -> Self {
        Self::new(Arc::new(MemoryLogStore::new()), Arc::new(MemoryLogStore::new())).await
    }

    /// A sync pass runner from local to remote.
    pub fn sync(&self, config: SyncConfig) -> LogSync<Arc<MemoryLogStore>, MemoryTransport> {
        LogSync::new(Arc::clone(&self.local), self.network.transport(), REMOTE, config)
    }

    /// Ids `store` holds for `log`.
    pub async fn ids(store: &MemoryLogStore, log: &LogId) -> SortedRangeSet {
        match store.descriptor(log).await {
            Ok(Some(descriptor)) => descriptor.range,
            _ => SortedRangeSet::empty(),
        }
    }
}

/// A master and a replica of the same repository, the master served under
/// [`REMOTE`].
pub struct RepositoryPair {
    pub network: Arc<MemoryNetwork>,
    pub master: Arc<Repository<MemoryRepositoryStore>>,
    pub replica: Arc<Repository<MemoryRepositoryStore>>,
}

impl RepositoryPair {
    pub async fn new(customer: &str, name: &str) -> outpost_repo::Result<Self> {
        let master = Arc::new(
            Repository::open(RepositoryConfig::master(customer, name), MemoryRepositoryStore::new()).await?,
        );
        let replica = Arc::new(
            Repository::open(RepositoryConfig::replica(customer, name), MemoryRepositoryStore::new()).await?,
        );
        let network = MemoryNetwork::new();
        network
            .register(
                REMOTE,
                Arc::new(RepositoryServer::new().with_repository(Arc::clone(&master))),
            )
            .await;
        Ok(Self {
            network,
            master,
            replica,
        })
    }
}

/// A single event with a fixed timestamp.
pub fn event(target_id: &str, store_id: u64, id: u64) -> Event {
    Event::new(target_id, store_id, id, 1_700_000_000_000 + id as i64, 1)
}
