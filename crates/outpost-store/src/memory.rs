//! In-memory implementations of the store traits.
//!
//! These are primarily for testing and for short-lived relays. They have the
//! same semantics as SQLite but keep everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;

use outpost_core::{Descriptor, Event, LogId, LowestId, RepositoryId, SortedRangeSet, MAX_ID};

use crate::error::{Result, StoreError};
use crate::traits::{content_digest, LogFilter, LogStore, PutOutcome, PutReport, RepositoryStore};

/// In-memory event-log store.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock; the
/// write lock serializes every mutation.
pub struct MemoryLogStore {
    inner: RwLock<BTreeMap<LogId, LogState>>,
}

#[derive(Default)]
struct LogState {
    /// Retained events by id.
    events: BTreeMap<u64, Event>,
    /// Ids held, kept in step with `events`.
    range: SortedRangeSet,
    /// Compaction floor.
    lowest: u64,
}

impl LogState {
    fn descriptor(&self, log: &LogId) -> Descriptor {
        Descriptor::new(log.target_id.clone(), log.store_id, self.range.clone())
    }

    fn next_id(&self, log: &LogId) -> Result<u64> {
        let next = match self.events.keys().next_back() {
            Some(highest) => highest.checked_add(1).map(|id| id.max(self.lowest)),
            None => Some(self.lowest),
        };
        next.filter(|&id| id <= MAX_ID)
            .ok_or_else(|| StoreError::IdsExhausted(log.to_string()))
    }
}

impl MemoryLogStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<LogId, LogState>>> {
        self.inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<LogId, LogState>>> {
        self.inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))
    }
}

impl Default for MemoryLogStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn descriptors(&self, filter: &LogFilter) -> Result<Vec<Descriptor>> {
        let inner = self.read()?;
        Ok(inner
            .iter()
            .filter(|(log, _)| filter.matches(log))
            .map(|(log, state)| state.descriptor(log))
            .collect())
    }

    async fn descriptor(&self, log: &LogId) -> Result<Option<Descriptor>> {
        let inner = self.read()?;
        Ok(inner.get(log).map(|state| state.descriptor(log)))
    }

    async fn get(&self, log: &LogId, range: &SortedRangeSet) -> Result<Vec<Event>> {
        let inner = self.read()?;
        let Some(state) = inner.get(log) else {
            return Ok(Vec::new());
        };

        let mut events = Vec::new();
        for span in range.ranges() {
            events.extend(
                state
                    .events
                    .range(span.low()..=span.high())
                    .map(|(_, event)| event.clone()),
            );
        }
        Ok(events)
    }

    async fn put(&self, events: &[Event]) -> Result<PutReport> {
        let mut inner = self.write()?;
        let mut report = PutReport::default();

        for event in events {
            if event.id > MAX_ID || event.store_id > MAX_ID {
                report.out_of_range += 1;
                continue;
            }
            let state = inner.entry(event.log_id()).or_default();
            if event.id < state.lowest {
                report.below_floor += 1;
            } else if state.events.contains_key(&event.id) {
                report.duplicates += 1;
            } else {
                state.events.insert(event.id, event.clone());
                state.range = state.range.add(event.id);
                report.inserted += 1;
            }
        }

        Ok(report)
    }

    async fn append(
        &self,
        log: &LogId,
        timestamp: i64,
        event_type: u32,
        properties: BTreeMap<String, String>,
    ) -> Result<Event> {
        let mut inner = self.write()?;
        let state = inner.entry(log.clone()).or_default();
        let id = state.next_id(log)?;

        let mut event = Event::new(
            log.target_id.clone(),
            log.store_id,
            id,
            timestamp,
            event_type,
        );
        event.properties = properties;

        state.events.insert(event.id, event.clone());
        state.range = state.range.add(event.id);
        Ok(event)
    }

    async fn set_lowest_id(&self, log: &LogId, lowest_id: u64) -> Result<bool> {
        let mut inner = self.write()?;
        if lowest_id <= inner.get(log).map_or(0, |state| state.lowest) {
            return Ok(false);
        }

        let state = inner.entry(log.clone()).or_default();
        state.lowest = lowest_id;
        state.events = state.events.split_off(&lowest_id);
        state.range = state.range.retain_from(lowest_id);
        Ok(true)
    }

    async fn lowest_id(&self, log: &LogId) -> Result<u64> {
        let inner = self.read()?;
        Ok(inner.get(log).map_or(0, |state| state.lowest))
    }

    async fn lowest_ids(&self, filter: &LogFilter) -> Result<Vec<LowestId>> {
        let inner = self.read()?;
        Ok(inner
            .iter()
            .filter(|(log, state)| state.lowest > 0 && filter.matches(log))
            .map(|(log, state)| LowestId::new(log.target_id.clone(), log.store_id, state.lowest))
            .collect())
    }
}

/// In-memory repository store.
pub struct MemoryRepositoryStore {
    inner: RwLock<HashMap<RepositoryId, BTreeMap<u64, Bytes>>>,
}

impl MemoryRepositoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryRepositoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryStore for MemoryRepositoryStore {
    async fn list(&self) -> Result<Vec<RepositoryId>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let mut repos: Vec<_> = inner
            .iter()
            .filter(|(_, versions)| !versions.is_empty())
            .map(|(repo, _)| repo.clone())
            .collect();
        repos.sort();
        Ok(repos)
    }

    async fn versions(&self, repo: &RepositoryId) -> Result<SortedRangeSet> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(inner
            .get(repo)
            .map(|versions| SortedRangeSet::from_values(versions.keys().copied()))
            .unwrap_or_default())
    }

    async fn get(&self, repo: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(inner.get(repo).and_then(|versions| versions.get(&version).cloned()))
    }

    async fn put(&self, repo: &RepositoryId, version: u64, content: Bytes) -> Result<PutOutcome> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let versions = inner.entry(repo.clone()).or_default();

        match versions.get(&version) {
            Some(existing) if content_digest(existing) == content_digest(&content) => {
                Ok(PutOutcome::Unchanged)
            }
            Some(_) => Ok(PutOutcome::Conflict),
            None => {
                versions.insert(version, content);
                Ok(PutOutcome::Stored)
            }
        }
    }
}
