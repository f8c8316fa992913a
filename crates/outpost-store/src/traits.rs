//! Store traits: the abstract interfaces for event-log and repository persistence.
//!
//! These traits keep the sync protocols storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use outpost_core::{Descriptor, Event, LogId, LowestId, RepositoryId, SortedRangeSet};

use crate::error::Result;

/// Selects logs by target and/or store.
///
/// `None` fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogFilter {
    pub target_id: Option<String>,
    pub store_id: Option<u64>,
}

impl LogFilter {
    /// Match every log.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match every log of one target.
    pub fn target(target_id: impl Into<String>) -> Self {
        Self {
            target_id: Some(target_id.into()),
            store_id: None,
        }
    }

    /// Match exactly one log.
    pub fn log(log: &LogId) -> Self {
        Self {
            target_id: Some(log.target_id.clone()),
            store_id: Some(log.store_id),
        }
    }

    /// Whether `log` passes this filter.
    pub fn matches(&self, log: &LogId) -> bool {
        self.target_id.as_deref().map_or(true, |t| t == log.target_id)
            && self.store_id.map_or(true, |s| s == log.store_id)
    }
}

/// Outcome of storing a batch of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutReport {
    /// Events that were new.
    pub inserted: usize,
    /// Events whose `(target, store, id)` was already stored.
    pub duplicates: usize,
    /// Events under their log's compaction floor, dropped.
    pub below_floor: usize,
    /// Events whose id or store id is above [`outpost_core::MAX_ID`], dropped.
    pub out_of_range: usize,
}

impl PutReport {
    /// Fold another report into this one.
    pub fn merge(&mut self, other: PutReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.below_floor += other.below_floor;
        self.out_of_range += other.out_of_range;
    }
}

/// Result of writing one repository version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The version was new and is now stored.
    Stored,
    /// The version already exists with identical content (benign no-op).
    Unchanged,
    /// The version already exists with different content; nothing was written.
    Conflict,
}

/// The event-log store: async interface for audit log persistence.
///
/// # Design Notes
///
/// - **Idempotent puts**: re-putting an event with a known `(target, store, id)`
///   counts as a duplicate, never an error, and never replaces the stored one.
/// - **Floors**: a log's lowest id only ever rises. Raising it purges stored
///   events below it, and later puts under it are dropped.
/// - **Serialized writers**: `put`, `append` and `set_lowest_id` are mutually
///   exclusive per store so descriptor ranges stay canonical.
#[async_trait]
pub trait LogStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Descriptors
    // ─────────────────────────────────────────────────────────────────────────

    /// Descriptors of every known log passing `filter`, ordered by log id.
    async fn descriptors(&self, filter: &LogFilter) -> Result<Vec<Descriptor>>;

    /// Descriptor for one log, if known.
    async fn descriptor(&self, log: &LogId) -> Result<Option<Descriptor>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Events
    // ─────────────────────────────────────────────────────────────────────────

    /// Events of `log` whose id is in `range`, ascending by id.
    async fn get(&self, log: &LogId, range: &SortedRangeSet) -> Result<Vec<Event>>;

    /// Store a batch of events, possibly spanning several logs.
    async fn put(&self, events: &[Event]) -> Result<PutReport>;

    /// Log a new local event, assigning the next free id.
    async fn append(
        &self,
        log: &LogId,
        timestamp: i64,
        event_type: u32,
        properties: BTreeMap<String, String>,
    ) -> Result<Event>;

    // ─────────────────────────────────────────────────────────────────────────
    // Watermarks
    // ─────────────────────────────────────────────────────────────────────────

    /// Raise the floor of `log`, purging events below it.
    ///
    /// Returns `true` if the floor moved.
    async fn set_lowest_id(&self, log: &LogId, lowest_id: u64) -> Result<bool>;

    /// Current floor of `log` (0 if none).
    async fn lowest_id(&self, log: &LogId) -> Result<u64>;

    /// Non-zero floors of every log passing `filter`.
    async fn lowest_ids(&self, filter: &LogFilter) -> Result<Vec<LowestId>>;
}

/// The repository store: numbered, immutable content versions per repository.
#[async_trait]
pub trait RepositoryStore: Send + Sync {
    /// Every repository with at least one stored version, ordered.
    async fn list(&self) -> Result<Vec<RepositoryId>>;

    /// Every version stored for `repo`.
    async fn versions(&self, repo: &RepositoryId) -> Result<SortedRangeSet>;

    /// Content of one version.
    async fn get(&self, repo: &RepositoryId, version: u64) -> Result<Option<Bytes>>;

    /// Store one version. Existing versions are never overwritten.
    async fn put(&self, repo: &RepositoryId, version: u64, content: Bytes) -> Result<PutOutcome>;
}

#[async_trait]
impl<S: LogStore + ?Sized> LogStore for Arc<S> {
    async fn descriptors(&self, filter: &LogFilter) -> Result<Vec<Descriptor>> {
        (**self).descriptors(filter).await
    }

    async fn descriptor(&self, log: &LogId) -> Result<Option<Descriptor>> {
        (**self).descriptor(log).await
    }

    async fn get(&self, log: &LogId, range: &SortedRangeSet) -> Result<Vec<Event>> {
        (**self).get(log, range).await
    }

    async fn put(&self, events: &[Event]) -> Result<PutReport> {
        (**self).put(events).await
    }

    async fn append(
        &self,
        log: &LogId,
        timestamp: i64,
        event_type: u32,
        properties: BTreeMap<String, String>,
    ) -> Result<Event> {
        (**self).append(log, timestamp, event_type, properties).await
    }

    async fn set_lowest_id(&self, log: &LogId, lowest_id: u64) -> Result<bool> {
        (**self).set_lowest_id(log, lowest_id).await
    }

    async fn lowest_id(&self, log: &LogId) -> Result<u64> {
        (**self).lowest_id(log).await
    }

    async fn lowest_ids(&self, filter: &LogFilter) -> Result<Vec<LowestId>> {
        (**self).lowest_ids(filter).await
    }
}

#[async_trait]
impl<S: RepositoryStore + ?Sized> RepositoryStore for Arc<S> {
    async fn list(&self) -> Result<Vec<RepositoryId>> {
        (**self).list().await
    }

    async fn versions(&self, repo: &RepositoryId) -> Result<SortedRangeSet> {
        (**self).versions(repo).await
    }

    async fn get(&self, repo: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        (**self).get(repo, version).await
    }

    async fn put(&self, repo: &RepositoryId, version: u64, content: Bytes) -> Result<PutOutcome> {
        (**self).put(repo, version, content).await
    }
}

/// Extension trait for common log store patterns.
pub trait LogStoreExt: LogStore {
    /// Every retained event of one log.
    fn get_all(&self, log: &LogId) -> impl std::future::Future<Output = Result<Vec<Event>>> + Send;

    /// Floors of `filter`'s logs keyed by log id.
    fn floors(
        &self,
        filter: &LogFilter,
    ) -> impl std::future::Future<Output = Result<BTreeMap<LogId, u64>>> + Send;
}

impl<S: LogStore + ?Sized> LogStoreExt for S {
    async fn get_all(&self, log: &LogId) -> Result<Vec<Event>> {
        self.get(log, &SortedRangeSet::full()).await
    }

    async fn floors(&self, filter: &LogFilter) -> Result<BTreeMap<LogId, u64>> {
        Ok(self
            .lowest_ids(filter)
            .await?
            .into_iter()
            .map(|l| (l.log_id(), l.lowest_id))
            .collect())
    }
}

/// Blake3 digest of repository content, used to tell identical re-puts from conflicts.
pub fn content_digest(content: &[u8]) -> [u8; 32] {
    *blake3::hash(content).as_bytes()
}
