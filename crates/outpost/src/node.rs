//! The node: one store, its endpoints, and the periodic passes against peers.
//!
//! A node serves a single endpoint that answers both the log sync paths
//! (`query`, `send`, ...) and the repository paths (`replication/*`,
//! `repository/*`). Outbound, it runs a log sync pass against every log
//! peer and a replication pass for every hosted repository against every
//! replication peer, once per `sync_interval` plus up to `jitter`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use outpost_core::{Event, LogId, RepositoryId};
use outpost_repo::{ReplicationConfig, ReplicationReport, Replicator, Repository, RepositoryConfig, RepositoryServer};
use outpost_store::{LogStore, SqliteStore};
use outpost_sync::{
    LogServer, LogSync, MemoryNetwork, Request, Response, Service, SyncConfig, SyncReport, Transport,
    DEFAULT_REQUEST_TIMEOUT,
};

use crate::error::{NodeError, Result};

/// The store a node keeps its logs and repositories in.
pub type NodeStore = Arc<SqliteStore>;

/// A repository hosted by a node.
pub type NodeRepository = Repository<NodeStore>;

/// Configuration for a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Period of the log sync and replication loops.
    #[serde(with = "outpost_sync::duration_ms")]
    pub sync_interval: Duration,
    /// Upper bound on the random delay added to each tick.
    #[serde(with = "outpost_sync::duration_ms")]
    pub jitter: Duration,
    /// Bound on each remote call; overrides the nested configs.
    #[serde(with = "outpost_sync::duration_ms")]
    pub request_timeout: Duration,
    /// SQLite database file. `None` keeps everything in memory.
    pub database_path: Option<PathBuf>,
    /// Endpoints to run log sync passes against.
    pub log_peers: Vec<String>,
    pub sync: SyncConfig,
    /// Repositories hosted by this node.
    pub repositories: Vec<RepositoryConfig>,
    /// Endpoints to replicate every hosted repository with.
    pub replication_peers: Vec<String>,
    pub replication: ReplicationConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(60),
            jitter: Duration::from_secs(5),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            database_path: None,
            log_peers: Vec::new(),
            sync: SyncConfig::default(),
            repositories: Vec::new(),
            replication_peers: Vec::new(),
            replication: ReplicationConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn with_database(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = Some(path.into());
        self
    }

    pub fn with_schedule(mut self, interval: Duration, jitter: Duration) -> Self {
        self.sync_interval = interval;
        self.jitter = jitter;
        self
    }

    pub fn with_log_peer(mut self, endpoint: impl Into<String>) -> Self {
        self.log_peers.push(endpoint.into());
        self
    }

    pub fn with_repository(mut self, repository: RepositoryConfig) -> Self {
        self.repositories.push(repository);
        self
    }

    pub fn with_replication_peer(mut self, endpoint: impl Into<String>) -> Self {
        self.replication_peers.push(endpoint.into());
        self
    }
}

/// Outcome of one pass against one peer.
#[derive(Debug)]
pub struct PassOutcome<R> {
    pub peer: String,
    /// The replicated repository; `None` for log sync passes.
    pub repository: Option<RepositoryId>,
    pub result: Result<R>,
}

/// A running outpost node.
pub struct Node {
    config: NodeConfig,
    store: NodeStore,
    repositories: BTreeMap<RepositoryId, Arc<NodeRepository>>,
    endpoint: Arc<NodeEndpoint>,
    passes: Arc<Passes>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Open the node's store and repositories and prepare passes over
    /// `transport`. Loops are not running until [`Node::start`].
    pub async fn open<T: Transport + 'static>(config: NodeConfig, transport: T) -> anyhow::Result<Self> {
        let store = match &config.database_path {
            Some(path) => SqliteStore::open(path)
                .with_context(|| format!("failed to open database {}", path.display()))?,
            None => SqliteStore::open_memory().context("failed to open in-memory database")?,
        };
        let store = Arc::new(store);

        let mut repositories = BTreeMap::new();
        let mut repository_server = RepositoryServer::new();
        for repository_config in &config.repositories {
            let id = repository_config.id();
            let repository = Repository::open(repository_config.clone(), Arc::clone(&store))
                .await
                .with_context(|| format!("failed to open repository {}", id))?;
            let repository = Arc::new(repository);
            repository_server.add(Arc::clone(&repository));
            repositories.insert(id, repository);
        }

        let transport: Arc<dyn Transport> = Arc::new(transport);
        let passes = Arc::new(Passes::new(&config, &store, &repositories, &transport));
        let endpoint = Arc::new(NodeEndpoint {
            logs: LogServer::new(Arc::clone(&store)),
            repositories: repository_server,
        });
        let (shutdown, _) = watch::channel(false);

        tracing::info!(
            log_peers = config.log_peers.len(),
            repositories = repositories.len(),
            replication_peers = config.replication_peers.len(),
            "node opened"
        );

        Ok(Self {
            config,
            store,
            repositories,
            endpoint,
            passes,
            shutdown,
            tasks: Vec::new(),
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The store holding this node's logs and repositories.
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    /// The service answering this node's endpoint, for hosts with their
    /// own transport.
    pub fn service(&self) -> Arc<dyn Service> {
        Arc::clone(&self.endpoint) as Arc<dyn Service>
    }

    /// Serve this node on `network` under `name`.
    pub async fn register(&self, network: &MemoryNetwork, name: impl Into<String>) {
        network.register(name, self.service()).await;
    }

    pub fn repository(&self, id: &RepositoryId) -> Option<&Arc<NodeRepository>> {
        self.repositories.get(id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Log a new event in `log`, stamped with the current time.
    pub async fn append(
        &self,
        log: &LogId,
        event_type: u32,
        properties: BTreeMap<String, String>,
    ) -> Result<Event> {
        Ok(self
            .store
            .append(log, now_millis(), event_type, properties)
            .await?)
    }

    /// Commit `content` as the next version of a hosted master repository.
    pub async fn commit(&self, id: &RepositoryId, content: Bytes) -> Result<u64> {
        let repository = self
            .repositories
            .get(id)
            .ok_or_else(|| NodeError::UnknownRepository(id.clone()))?;
        let version = repository.next_version().await?;
        repository.commit(version, content).await?;
        Ok(version)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Passes
    // ─────────────────────────────────────────────────────────────────────────

    /// Run one log sync pass against every log peer.
    pub async fn sync_logs(&self) -> Vec<PassOutcome<SyncReport>> {
        self.passes.sync_logs().await
    }

    /// Run one replication pass for every hosted repository and peer.
    pub async fn replicate(&self) -> Vec<PassOutcome<ReplicationReport>> {
        self.passes.replicate().await
    }

    /// Spawn the periodic loops. Calling it again while they run does
    /// nothing.
    pub fn start(&mut self) {
        if !self.tasks.is_empty() {
            return;
        }
        let schedule = Schedule {
            interval: self.config.sync_interval,
            jitter: self.config.jitter,
        };
        if !self.passes.logs.is_empty() {
            self.tasks.push(tokio::spawn(run_periodic(
                Arc::clone(&self.passes),
                PassKind::Logs,
                schedule,
                self.shutdown.subscribe(),
            )));
        }
        if !self.passes.replicators.is_empty() {
            self.tasks.push(tokio::spawn(run_periodic(
                Arc::clone(&self.passes),
                PassKind::Replication,
                schedule,
                self.shutdown.subscribe(),
            )));
        }
        tracing::info!(loops = self.tasks.len(), "node started");
    }

    /// Stop the periodic loops, letting an in-flight pass finish.
    pub async fn shutdown(&mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "periodic pass task ended abnormally");
            }
        }
        tracing::info!("node stopped");
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Routes repository paths to the repository server and the rest to the
/// log server.
struct NodeEndpoint {
    logs: LogServer<NodeStore>,
    repositories: RepositoryServer<NodeStore>,
}

#[async_trait]
impl Service for NodeEndpoint {
    async fn handle(&self, request: Request) -> Response {
        let route = request.route();
        if route.starts_with("replication/") || route.starts_with("repository/") {
            self.repositories.handle(request).await
        } else {
            self.logs.handle(request).await
        }
    }
}

/// Prepared pass runners, shared with the periodic loops.
struct Passes {
    logs: Vec<(String, LogSync<NodeStore, Arc<dyn Transport>>)>,
    replicators: Vec<(String, Replicator<NodeStore, Arc<dyn Transport>>)>,
}

impl Passes {
    fn new(
        config: &NodeConfig,
        store: &NodeStore,
        repositories: &BTreeMap<RepositoryId, Arc<NodeRepository>>,
        transport: &Arc<dyn Transport>,
    ) -> Self {
        let sync_config = config.sync.clone().with_request_timeout(config.request_timeout);
        let logs = config
            .log_peers
            .iter()
            .map(|peer| {
                let sync = LogSync::new(Arc::clone(store), Arc::clone(transport), peer.clone(), sync_config.clone());
                (peer.clone(), sync)
            })
            .collect();

        let replication_config = ReplicationConfig {
            request_timeout: config.request_timeout,
            ..config.replication.clone()
        };
        let mut replicators = Vec::new();
        for repository in repositories.values() {
            for peer in &config.replication_peers {
                let replicator = Replicator::new(
                    Arc::clone(repository),
                    Arc::clone(transport),
                    peer.clone(),
                    replication_config.clone(),
                );
                replicators.push((peer.clone(), replicator));
            }
        }

        Self { logs, replicators }
    }

    async fn sync_logs(&self) -> Vec<PassOutcome<SyncReport>> {
        let mut outcomes = Vec::with_capacity(self.logs.len());
        for (peer, sync) in &self.logs {
            let result = sync.synchronize().await.map_err(NodeError::from);
            match &result {
                Ok(report) if report.had_work() => tracing::info!(
                    peer = %peer,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    "log sync pass moved events"
                ),
                Ok(_) => tracing::debug!(peer = %peer, "log sync pass found nothing to do"),
                Err(e) => log_failure("log sync", peer, e),
            }
            outcomes.push(PassOutcome {
                peer: peer.clone(),
                repository: None,
                result,
            });
        }
        outcomes
    }

    async fn replicate(&self) -> Vec<PassOutcome<ReplicationReport>> {
        let mut outcomes = Vec::with_capacity(self.replicators.len());
        for (peer, replicator) in &self.replicators {
            let id = replicator.repository().id();
            let result = replicator.synchronize().await.map_err(NodeError::from);
            match &result {
                Ok(report) if report.had_work() => tracing::info!(
                    peer = %peer,
                    repo = %id,
                    pushed = report.pushed,
                    pulled = report.pulled,
                    "replication pass moved versions"
                ),
                Ok(_) => tracing::debug!(peer = %peer, repo = %id, "replication pass found nothing to do"),
                Err(e) => log_failure("replication", peer, e),
            }
            outcomes.push(PassOutcome {
                peer: peer.clone(),
                repository: Some(id.clone()),
                result,
            });
        }
        outcomes
    }
}

fn log_failure(pass: &str, peer: &str, error: &NodeError) {
    if error.is_transient() {
        tracing::warn!(pass, peer, error = %error, "peer unavailable, retrying next tick");
    } else {
        tracing::warn!(pass, peer, error = %error, "pass failed");
    }
}

#[derive(Debug, Clone, Copy)]
enum PassKind {
    Logs,
    Replication,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    interval: Duration,
    jitter: Duration,
}

impl Schedule {
    fn delay(&self) -> Duration {
        let max = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

async fn run_periodic(
    passes: Arc<Passes>,
    kind: PassKind,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
) {
    // `interval` panics on a zero period.
    let mut ticker = tokio::time::interval(schedule.interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        tokio::select! {
            _ = tokio::time::sleep(schedule.delay()) => {}
            _ = shutdown.changed() => break,
        }

        match kind {
            PassKind::Logs => {
                passes.sync_logs().await;
            }
            PassKind::Replication => {
                passes.replicate().await;
            }
        }
    }
    tracing::debug!(?kind, "periodic pass loop stopped");
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
