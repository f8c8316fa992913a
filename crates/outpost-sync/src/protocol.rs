//! One synchronization pass between a local log store and a remote endpoint.
//!
//! ## Deltas
//!
//! `a.diff_dest(b)` is everything `b` holds that `a` lacks. The two
//! directions therefore read:
//!
//! - push: `remote.diff_dest(local)`, what we hold that the remote lacks
//! - pull: `local.diff_dest(remote)`, what the remote holds that we lack
//!
//! Each is cut at the receiving side's compaction floor so purged ids are
//! never requested again. See [`push_delta`] and [`pull_delta`].
//!
//! ## Pass
//!
//! 1. `query` the remote descriptors, then `receiveids` its floors. A failure
//!    here fails the pass.
//! 2. Push (if enabled): send local floors the remote has not reached, then
//!    the events in each push delta.
//! 3. Pull (if enabled): raise local floors to the remote's, then receive
//!    and store the events in each pull delta.
//!
//! A failing direction is logged and recorded in the [`SyncReport`]; it
//! does not stop the other one. Deltas are always recomputed from store
//! contents, so anything a peer dropped is offered again next pass.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use outpost_core::{Descriptor, LogId, LowestId, SortedRangeSet};
use outpost_store::{LogFilter, LogStore, LogStoreExt};

use crate::client::{RemoteLog, DEFAULT_REQUEST_TIMEOUT};
use crate::error::Result;
use crate::transport::Transport;

/// Configuration for sync behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Bound on each remote call.
    #[serde(with = "crate::duration_ms")]
    pub request_timeout: Duration,
    /// Send local events the remote lacks.
    pub push: bool,
    /// Fetch remote events we lack.
    pub pull: bool,
    /// Logs taking part in the pass.
    pub filter: LogFilter,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            push: true,
            pull: true,
            filter: LogFilter::all(),
        }
    }
}

impl SyncConfig {
    /// Push only (a target reporting to a server).
    pub fn push_only() -> Self {
        Self {
            pull: false,
            ..Self::default()
        }
    }

    /// Pull only (a server collecting from a target).
    pub fn pull_only() -> Self {
        Self {
            push: false,
            ..Self::default()
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_filter(mut self, filter: LogFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Result of a sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Events sent to the remote.
    pub pushed: usize,
    /// Events received and newly stored locally.
    pub pulled: usize,
    /// Received events we already had.
    pub duplicates: usize,
    /// Floors sent to the remote.
    pub floors_sent: usize,
    /// Local floors raised to match the remote.
    pub floors_raised: usize,
    /// Whether the remote reported malformed records in a batch we sent.
    pub remote_rejected: bool,
    /// Error that stopped the push direction.
    pub push_error: Option<String>,
    /// Error that stopped the pull direction.
    pub pull_error: Option<String>,
}

impl SyncReport {
    /// Whether the pass moved any events or floors.
    pub fn had_work(&self) -> bool {
        self.pushed + self.pulled + self.floors_sent + self.floors_raised > 0
    }

    /// Whether both directions completed.
    pub fn is_success(&self) -> bool {
        self.push_error.is_none() && self.pull_error.is_none()
    }
}

/// Ids to send: held locally, missing remotely, at or above the remote floor.
pub fn push_delta(local: &SortedRangeSet, remote: &SortedRangeSet, remote_floor: u64) -> SortedRangeSet {
    remote.diff_dest(local).retain_from(remote_floor)
}

/// Ids to fetch: held remotely, missing locally, at or above the local floor.
pub fn pull_delta(local: &SortedRangeSet, remote: &SortedRangeSet, local_floor: u64) -> SortedRangeSet {
    local.diff_dest(remote).retain_from(local_floor)
}

/// Snapshot of the remote taken at the start of a pass.
struct RemoteState {
    descriptors: BTreeMap<LogId, Descriptor>,
    floors: BTreeMap<LogId, u64>,
}

impl RemoteState {
    fn range(&self, log: &LogId) -> SortedRangeSet {
        self.descriptors
            .get(log)
            .map(|d| d.range.clone())
            .unwrap_or_default()
    }

    fn floor(&self, log: &LogId) -> u64 {
        self.floors.get(log).copied().unwrap_or(0)
    }
}

/// Synchronizes a local log store with one remote endpoint.
pub struct LogSync<S: LogStore, T: Transport> {
    store: S,
    remote: RemoteLog<T>,
    config: SyncConfig,
}

impl<S: LogStore, T: Transport> LogSync<S, T> {
    /// Create a sync pass runner for `endpoint`.
    pub fn new(store: S, transport: T, endpoint: impl Into<String>, config: SyncConfig) -> Self {
        let remote = RemoteLog::new(transport, endpoint).with_timeout(config.request_timeout);
        Self {
            store,
            remote,
            config,
        }
    }

    /// The local store.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Run one pass.
    ///
    /// Returns `Err` only if the remote could not be queried; direction
    /// failures are reported in the [`SyncReport`].
    pub async fn synchronize(&self) -> Result<SyncReport> {
        let filter = &self.config.filter;
        let remote = RemoteState {
            descriptors: self
                .remote
                .query(filter)
                .await?
                .into_iter()
                .map(|d| (d.log_id(), d))
                .collect(),
            floors: self
                .remote
                .receive_ids(filter)
                .await?
                .into_iter()
                .map(|l| (l.log_id(), l.lowest_id))
                .collect(),
        };

        let mut report = SyncReport::default();

        if self.config.push {
            if let Err(e) = self.push(&remote, &mut report).await {
                tracing::warn!(endpoint = self.remote.endpoint(), error = %e, "push failed");
                report.push_error = Some(e.to_string());
            }
        }
        if self.config.pull {
            if let Err(e) = self.pull(&remote, &mut report).await {
                tracing::warn!(endpoint = self.remote.endpoint(), error = %e, "pull failed");
                report.pull_error = Some(e.to_string());
            }
        }

        tracing::debug!(
            endpoint = self.remote.endpoint(),
            pushed = report.pushed,
            pulled = report.pulled,
            floors_sent = report.floors_sent,
            floors_raised = report.floors_raised,
            "sync pass complete"
        );
        Ok(report)
    }

    async fn push(&self, remote: &RemoteState, report: &mut SyncReport) -> Result<()> {
        let filter = &self.config.filter;

        let floors: Vec<LowestId> = self
            .store
            .lowest_ids(filter)
            .await?
            .into_iter()
            .filter(|l| l.lowest_id > remote.floor(&l.log_id()))
            .collect();
        if !floors.is_empty() {
            if !self.remote.send_ids(&floors).await? {
                report.remote_rejected = true;
            }
            report.floors_sent += floors.len();
        }

        for local in self.store.descriptors(filter).await? {
            let log = local.log_id();
            let delta = push_delta(&local.range, &remote.range(&log), remote.floor(&log));
            if delta.is_empty() {
                continue;
            }

            let events = self.store.get(&log, &delta).await?;
            if events.is_empty() {
                continue;
            }
            if !self.remote.send(&events).await? {
                tracing::warn!(log = %log, "remote skipped part of a pushed batch");
                report.remote_rejected = true;
            }
            report.pushed += events.len();
        }
        Ok(())
    }

    async fn pull(&self, remote: &RemoteState, report: &mut SyncReport) -> Result<()> {
        let filter = &self.config.filter;

        let local_floors = self.store.floors(filter).await?;
        for (log, &floor) in &remote.floors {
            if floor > local_floors.get(log).copied().unwrap_or(0)
                && self.store.set_lowest_id(log, floor).await?
            {
                report.floors_raised += 1;
            }
        }

        let local: BTreeMap<LogId, Descriptor> = self
            .store
            .descriptors(filter)
            .await?
            .into_iter()
            .map(|d| (d.log_id(), d))
            .collect();
        let local_floors = self.store.floors(filter).await?;

        for (log, remote_desc) in &remote.descriptors {
            let local_range = local.get(log).map(|d| d.range.clone()).unwrap_or_default();
            let floor = local_floors.get(log).copied().unwrap_or(0);
            let delta = pull_delta(&local_range, &remote_desc.range, floor);
            if delta.is_empty() {
                continue;
            }

            let events = self.remote.receive(log, Some(&delta)).await?;
            let put = self.store.put(&events).await?;
            report.pulled += put.inserted;
            report.duplicates += put.duplicates;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use outpost_core::Event;
    use outpost_store::MemoryLogStore;

    use crate::messages::{paths, status, Request, Response};
    use crate::server::LogServer;
    use crate::transport::memory::{MemoryNetwork, MemoryTransport};
    use crate::transport::Service;

    fn set(text: &str) -> SortedRangeSet {
        text.parse().unwrap()
    }

    #[test]
    fn test_push_delta_direction() {
        // Local holds 1-3, remote holds 2-4: only 1 needs sending.
        assert_eq!(push_delta(&set("1-3"), &set("2-4"), 0), set("1"));
        assert_eq!(push_delta(&set("1-10"), &set(""), 0), set("1-10"));
        assert_eq!(push_delta(&set("1-10"), &set("8"), 5), set("5-7,9-10"));
    }

    #[test]
    fn test_pull_delta_direction() {
        // Local holds 1-3, remote holds 2-4: only 4 needs fetching.
        assert_eq!(pull_delta(&set("1-3"), &set("2-4"), 0), set("4"));
        assert_eq!(pull_delta(&set(""), &set("0-4,7"), 3), set("3-4,7"));
        assert!(pull_delta(&set("0-9"), &set("2-4"), 0).is_empty());
    }

    #[test]
    fn test_config_serde_defaults() {
        let config: SyncConfig = serde_json::from_str(r#"{"request_timeout": 1500, "pull": false}"#).unwrap();
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(config.push);
        assert!(!config.pull);
        assert_eq!(config.filter, LogFilter::all());
    }

    struct Peers {
        network: Arc<MemoryNetwork>,
        local: Arc<MemoryLogStore>,
        remote: Arc<MemoryLogStore>,
    }

    impl Peers {
        async fn new() -> Self {
            let network = MemoryNetwork::new();
            let remote = Arc::new(MemoryLogStore::new());
            network
                .register("server", Arc::new(LogServer::new(Arc::clone(&remote))))
                .await;
            Self {
                network,
                local: Arc::new(MemoryLogStore::new()),
                remote,
            }
        }

        /// Like [`Peers::new`], but one endpoint of the remote answers `code`.
        async fn failing(route: &'static str, code: u16) -> Self {
            let peers = Self::new().await;
            let inner = LogServer::new(Arc::clone(&peers.remote));
            peers
                .network
                .register("server", Arc::new(FailingRoute { inner, route, code }))
                .await;
            peers
        }

        fn sync(&self, config: SyncConfig) -> LogSync<Arc<MemoryLogStore>, MemoryTransport> {
            LogSync::new(Arc::clone(&self.local), self.network.transport(), "server", config)
        }
    }

    struct FailingRoute {
        inner: LogServer<Arc<MemoryLogStore>>,
        route: &'static str,
        code: u16,
    }

    #[async_trait]
    impl Service for FailingRoute {
        async fn handle(&self, request: Request) -> Response {
            if request.route() != self.route {
                return self.inner.handle(request).await;
            }
            if self.code == status::BAD_REQUEST {
                // Store the batch, then report part of it skipped.
                let _ = self.inner.handle(request).await;
                return Response::bad_request("1 malformed records skipped");
            }
            Response::new(self.code, "unavailable")
        }
    }

    fn events(target: &str, store: u64, ids: &[u64]) -> Vec<Event> {
        ids.iter().map(|&id| Event::new(target, store, id, id as i64, 1)).collect()
    }

    #[tokio::test]
    async fn test_sync_both_directions() {
        let peers = Peers::new().await;
        peers.local.put(&events("gw", 1, &[1, 2, 3])).await.unwrap();
        peers.remote.put(&events("gw", 1, &[2, 3, 4])).await.unwrap();
        peers.remote.put(&events("other", 9, &[0])).await.unwrap();

        let report = peers.sync(SyncConfig::default()).synchronize().await.unwrap();
        assert!(report.is_success());
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pulled, 2);

        let log = LogId::new("gw", 1);
        let local = peers.local.descriptor(&log).await.unwrap().unwrap();
        let remote = peers.remote.descriptor(&log).await.unwrap().unwrap();
        assert_eq!(local.range, set("1-4"));
        assert_eq!(remote.range, set("1-4"));
    }

    #[tokio::test]
    async fn test_second_pass_has_no_work() {
        let peers = Peers::new().await;
        peers.local.put(&events("gw", 1, &[0, 1, 5])).await.unwrap();
        peers.remote.put(&events("gw", 2, &[7])).await.unwrap();
        peers.local.set_lowest_id(&LogId::new("gw", 1), 1).await.unwrap();

        let sync = peers.sync(SyncConfig::default());
        assert!(sync.synchronize().await.unwrap().had_work());

        let second = sync.synchronize().await.unwrap();
        assert!(!second.had_work());
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn test_push_only_leaves_local_untouched() {
        let peers = Peers::new().await;
        peers.local.put(&events("gw", 1, &[1])).await.unwrap();
        peers.remote.put(&events("gw", 1, &[2])).await.unwrap();

        let report = peers.sync(SyncConfig::push_only()).synchronize().await.unwrap();
        assert_eq!((report.pushed, report.pulled), (1, 0));

        let local = peers.local.descriptor(&LogId::new("gw", 1)).await.unwrap().unwrap();
        assert_eq!(local.range, set("1"));
    }

    #[tokio::test]
    async fn test_floors_propagate_both_ways() {
        let peers = Peers::new().await;
        let a = LogId::new("gw", 1);
        let b = LogId::new("gw", 2);
        peers.local.put(&events("gw", 1, &[5, 6])).await.unwrap();
        peers.local.set_lowest_id(&a, 5).await.unwrap();
        peers.remote.put(&events("gw", 2, &[0, 1, 8, 9])).await.unwrap();
        peers.remote.set_lowest_id(&b, 8).await.unwrap();

        let report = peers.sync(SyncConfig::default()).synchronize().await.unwrap();
        assert_eq!(report.floors_sent, 1);
        assert_eq!(report.floors_raised, 1);

        assert_eq!(peers.remote.lowest_id(&a).await.unwrap(), 5);
        assert_eq!(peers.local.lowest_id(&b).await.unwrap(), 8);
        let pulled = peers.local.descriptor(&b).await.unwrap().unwrap();
        assert_eq!(pulled.range, set("8-9"));
    }

    #[tokio::test]
    async fn test_filter_scopes_the_pass() {
        let peers = Peers::new().await;
        peers.remote.put(&events("gw-1", 1, &[1])).await.unwrap();
        peers.remote.put(&events("gw-2", 1, &[1])).await.unwrap();

        let config = SyncConfig::default().with_filter(LogFilter::target("gw-2"));
        peers.sync(config).synchronize().await.unwrap();

        let held = peers.local.descriptors(&LogFilter::all()).await.unwrap();
        assert_eq!(held.len(), 1);
        assert_eq!(held[0].target_id, "gw-2");
    }

    #[tokio::test]
    async fn test_failed_push_still_pulls() {
        let peers = Peers::failing(paths::SEND, status::INTERNAL_ERROR).await;
        peers.local.put(&events("gw", 1, &[1])).await.unwrap();
        peers.remote.put(&events("gw", 1, &[2, 3])).await.unwrap();

        let report = peers.sync(SyncConfig::default()).synchronize().await.unwrap();
        assert!(report.push_error.is_some());
        assert!(report.pull_error.is_none());
        assert_eq!(report.pulled, 2);
        assert!(!report.is_success());

        let log = LogId::new("gw", 1);
        assert_eq!(peers.local.descriptor(&log).await.unwrap().unwrap().range, set("1-3"));
        assert_eq!(peers.remote.descriptor(&log).await.unwrap().unwrap().range, set("2-3"));
    }

    #[tokio::test]
    async fn test_failed_pull_still_pushes() {
        let peers = Peers::failing(paths::RECEIVE, status::INTERNAL_ERROR).await;
        peers.local.put(&events("gw", 1, &[1])).await.unwrap();
        peers.remote.put(&events("gw", 1, &[2, 3])).await.unwrap();

        let report = peers.sync(SyncConfig::default()).synchronize().await.unwrap();
        assert!(report.push_error.is_none());
        assert!(report.pull_error.is_some());
        assert_eq!(report.pushed, 1);
        assert!(!report.is_success());

        let log = LogId::new("gw", 1);
        assert_eq!(peers.remote.descriptor(&log).await.unwrap().unwrap().range, set("1-3"));
        assert_eq!(peers.local.descriptor(&log).await.unwrap().unwrap().range, set("1"));
    }

    #[tokio::test]
    async fn test_partly_rejected_push_is_flagged() {
        let peers = Peers::failing(paths::SEND, status::BAD_REQUEST).await;
        peers.local.put(&events("gw", 1, &[1, 2])).await.unwrap();

        let report = peers.sync(SyncConfig::default()).synchronize().await.unwrap();
        assert!(report.remote_rejected);
        assert!(report.is_success());
        assert_eq!(report.pushed, 2);
    }

    #[tokio::test]
    async fn test_unreachable_remote_fails_the_pass() {
        let peers = Peers::new().await;
        peers.network.set_online("server", false).await;

        let err = peers.sync(SyncConfig::default()).synchronize().await.unwrap_err();
        assert!(err.is_transient());
    }
}
