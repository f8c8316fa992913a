//! SQLite implementation of the store traits.
//!
//! This is the primary storage backend for Outpost. It uses rusqlite with
//! bundled SQLite, wrapped in async via tokio::spawn_blocking. One
//! [`SqliteStore`] serves both event logs and repository versions.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use outpost_core::{Descriptor, Event, LogId, LowestId, Range, RepositoryId, SortedRangeSet, MAX_ID};

use crate::error::{Result, StoreError};
use crate::migration::{self, now_millis};
use crate::traits::{content_digest, LogFilter, LogStore, PutOutcome, PutReport, RepositoryStore};

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex, which also serializes writers. All
/// operations use spawn_blocking to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(format!("mutex poisoned: {}", e)))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

fn to_sql_id(value: u64) -> Result<i64> {
    i64::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("id {} exceeds SQLite INTEGER range", value)))
}

fn encode_properties(properties: &BTreeMap<String, String>) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(properties, &mut buf)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_properties(bytes: &[u8]) -> Result<BTreeMap<String, String>> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

// Helper to convert a row to Event
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Event, Vec<u8>)> {
    let event = Event::new(
        row.get::<_, String>("target_id")?,
        row.get::<_, i64>("store_id")? as u64,
        row.get::<_, i64>("id")? as u64,
        row.get::<_, i64>("timestamp")?,
        row.get::<_, i64>("event_type")? as u32,
    );
    Ok((event, row.get("properties")?))
}

fn ensure_log(tx: &Transaction<'_>, target_id: &str, store_id: i64) -> Result<u64> {
    tx.execute(
        "INSERT OR IGNORE INTO logs (target_id, store_id, lowest_id) VALUES (?1, ?2, 0)",
        params![target_id, store_id],
    )?;
    let lowest: i64 = tx.query_row(
        "SELECT lowest_id FROM logs WHERE target_id = ?1 AND store_id = ?2",
        params![target_id, store_id],
        |row| row.get(0),
    )?;
    Ok(lowest as u64)
}

fn insert_event(tx: &Transaction<'_>, event: &Event, store_id: i64, id: i64) -> Result<bool> {
    let changed = tx.execute(
        "INSERT OR IGNORE INTO events (
            target_id, store_id, id, timestamp, event_type, properties, ingested_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.target_id,
            store_id,
            id,
            event.timestamp,
            event.event_type as i64,
            encode_properties(&event.properties)?,
            now_millis(),
        ],
    )?;
    Ok(changed == 1)
}

/// Coalesced id ranges of one log, computed in SQL (gaps and islands).
fn id_ranges(conn: &Connection, target_id: &str, store_id: i64) -> Result<SortedRangeSet> {
    let mut stmt = conn.prepare_cached(
        "SELECT MIN(id), MAX(id) FROM (
            SELECT id, id - ROW_NUMBER() OVER (ORDER BY id) AS grp
            FROM events WHERE target_id = ?1 AND store_id = ?2
         ) GROUP BY grp ORDER BY 1",
    )?;
    let rows = stmt.query_map(params![target_id, store_id], |row| {
        Ok((row.get::<_, i64>(0)? as u64, row.get::<_, i64>(1)? as u64))
    })?;

    let mut ranges = Vec::new();
    for row in rows {
        let (low, high) = row?;
        ranges.push(Range::new(low, high).map_err(|e| StoreError::InvalidData(e.to_string()))?);
    }
    Ok(SortedRangeSet::from_ranges(ranges))
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn descriptors(&self, filter: &LogFilter) -> Result<Vec<Descriptor>> {
        let target = filter.target_id.clone();
        let store = filter.store_id.map(to_sql_id).transpose()?;

        self.blocking(move |conn| {
            let logs: Vec<(String, i64)> = {
                let mut stmt = conn.prepare_cached(
                    "SELECT target_id, store_id FROM logs
                     WHERE (?1 IS NULL OR target_id = ?1) AND (?2 IS NULL OR store_id = ?2)
                     ORDER BY target_id, store_id",
                )?;
                let rows = stmt.query_map(params![target, store], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })?;
                rows.collect::<rusqlite::Result<_>>()?
            };

            logs.into_iter()
                .map(|(target_id, store_id)| {
                    let range = id_ranges(conn, &target_id, store_id)?;
                    Ok(Descriptor::new(target_id, store_id as u64, range))
                })
                .collect()
        })
        .await
    }

    async fn descriptor(&self, log: &LogId) -> Result<Option<Descriptor>> {
        let log = log.clone();
        let store_id = to_sql_id(log.store_id)?;

        self.blocking(move |conn| {
            let known = conn
                .query_row(
                    "SELECT 1 FROM logs WHERE target_id = ?1 AND store_id = ?2",
                    params![log.target_id, store_id],
                    |_| Ok(()),
                )
                .optional()?;
            if known.is_none() {
                return Ok(None);
            }
            let range = id_ranges(conn, &log.target_id, store_id)?;
            Ok(Some(Descriptor::new(log.target_id, log.store_id, range)))
        })
        .await
    }

    async fn get(&self, log: &LogId, range: &SortedRangeSet) -> Result<Vec<Event>> {
        let log = log.clone();
        let store_id = to_sql_id(log.store_id)?;
        let spans: Vec<(i64, i64)> = range
            .ranges()
            .iter()
            .filter(|r| r.low() <= MAX_ID)
            .map(|r| (r.low() as i64, r.high().min(MAX_ID) as i64))
            .collect();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT target_id, store_id, id, timestamp, event_type, properties
                 FROM events
                 WHERE target_id = ?1 AND store_id = ?2 AND id BETWEEN ?3 AND ?4
                 ORDER BY id",
            )?;

            let mut events = Vec::new();
            for (low, high) in spans {
                let rows = stmt.query_map(params![log.target_id, store_id, low, high], row_to_event)?;
                for row in rows {
                    let (mut event, properties) = row?;
                    event.properties = decode_properties(&properties)?;
                    events.push(event);
                }
            }
            Ok(events)
        })
        .await
    }

    async fn put(&self, events: &[Event]) -> Result<PutReport> {
        let events = events.to_vec();

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let mut floors: HashMap<LogId, u64> = HashMap::new();
            let mut report = PutReport::default();

            for event in &events {
                let (Ok(store_id), Ok(id)) = (to_sql_id(event.store_id), to_sql_id(event.id)) else {
                    report.out_of_range += 1;
                    continue;
                };

                let floor = match floors.get(&event.log_id()) {
                    Some(floor) => *floor,
                    None => {
                        let floor = ensure_log(&tx, &event.target_id, store_id)?;
                        floors.insert(event.log_id(), floor);
                        floor
                    }
                };

                if event.id < floor {
                    report.below_floor += 1;
                } else if insert_event(&tx, event, store_id, id)? {
                    report.inserted += 1;
                } else {
                    report.duplicates += 1;
                }
            }

            tx.commit()?;
            Ok(report)
        })
        .await
    }

    async fn append(
        &self,
        log: &LogId,
        timestamp: i64,
        event_type: u32,
        properties: BTreeMap<String, String>,
    ) -> Result<Event> {
        let log = log.clone();
        let store_id = to_sql_id(log.store_id)?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let floor = ensure_log(&tx, &log.target_id, store_id)?;
            let highest: Option<i64> = tx.query_row(
                "SELECT MAX(id) FROM events WHERE target_id = ?1 AND store_id = ?2",
                params![log.target_id, store_id],
                |row| row.get(0),
            )?;
            let next = match highest {
                Some(h) if h as u64 >= MAX_ID => {
                    return Err(StoreError::IdsExhausted(log.to_string()));
                }
                Some(h) => (h as u64 + 1).max(floor),
                None => floor,
            };

            let mut event = Event::new(log.target_id.clone(), log.store_id, next, timestamp, event_type);
            event.properties = properties;
            insert_event(&tx, &event, store_id, to_sql_id(next)?)?;

            tx.commit()?;
            Ok(event)
        })
        .await
    }

    async fn set_lowest_id(&self, log: &LogId, lowest_id: u64) -> Result<bool> {
        let log = log.clone();
        let store_id = to_sql_id(log.store_id)?;
        let lowest = to_sql_id(lowest_id)?;

        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<i64> = tx
                .query_row(
                    "SELECT lowest_id FROM logs WHERE target_id = ?1 AND store_id = ?2",
                    params![log.target_id, store_id],
                    |row| row.get(0),
                )
                .optional()?;
            if lowest <= current.unwrap_or(0) {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO logs (target_id, store_id, lowest_id) VALUES (?1, ?2, ?3)
                 ON CONFLICT (target_id, store_id) DO UPDATE SET lowest_id = excluded.lowest_id",
                params![log.target_id, store_id, lowest],
            )?;
            let purged = tx.execute(
                "DELETE FROM events WHERE target_id = ?1 AND store_id = ?2 AND id < ?3",
                params![log.target_id, store_id, lowest],
            )?;
            tx.commit()?;

            tracing::debug!(log = %log, lowest_id = lowest, purged, "raised log floor");
            Ok(true)
        })
        .await
    }

    async fn lowest_id(&self, log: &LogId) -> Result<u64> {
        let log = log.clone();
        let store_id = to_sql_id(log.store_id)?;

        self.blocking(move |conn| {
            let lowest: Option<i64> = conn
                .query_row(
                    "SELECT lowest_id FROM logs WHERE target_id = ?1 AND store_id = ?2",
                    params![log.target_id, store_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(lowest.unwrap_or(0) as u64)
        })
        .await
    }

    async fn lowest_ids(&self, filter: &LogFilter) -> Result<Vec<LowestId>> {
        let target = filter.target_id.clone();
        let store = filter.store_id.map(to_sql_id).transpose()?;

        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT target_id, store_id, lowest_id FROM logs
                 WHERE lowest_id > 0
                   AND (?1 IS NULL OR target_id = ?1) AND (?2 IS NULL OR store_id = ?2)
                 ORDER BY target_id, store_id",
            )?;
            let rows = stmt.query_map(params![target, store], |row| {
                Ok(LowestId::new(
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, i64>(2)? as u64,
                ))
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }
}

#[async_trait]
impl RepositoryStore for SqliteStore {
    async fn list(&self) -> Result<Vec<RepositoryId>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT DISTINCT customer, name FROM repository_versions ORDER BY customer, name",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(RepositoryId::new(row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            Ok(rows.collect::<rusqlite::Result<_>>()?)
        })
        .await
    }

    async fn versions(&self, repo: &RepositoryId) -> Result<SortedRangeSet> {
        let repo = repo.clone();

        self.blocking(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT version FROM repository_versions
                 WHERE customer = ?1 AND name = ?2 ORDER BY version",
            )?;
            let rows = stmt.query_map(params![repo.customer, repo.name], |row| {
                Ok(row.get::<_, i64>(0)? as u64)
            })?;
            let versions = rows.collect::<rusqlite::Result<Vec<u64>>>()?;
            Ok(SortedRangeSet::from_values(versions))
        })
        .await
    }

    async fn get(&self, repo: &RepositoryId, version: u64) -> Result<Option<Bytes>> {
        let repo = repo.clone();
        let version = to_sql_id(version)?;

        self.blocking(move |conn| {
            let content: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT content FROM repository_versions
                     WHERE customer = ?1 AND name = ?2 AND version = ?3",
                    params![repo.customer, repo.name, version],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(content.map(Bytes::from))
        })
        .await
    }

    async fn put(&self, repo: &RepositoryId, version: u64, content: Bytes) -> Result<PutOutcome> {
        let repo = repo.clone();
        let version = to_sql_id(version)?;

        self.blocking(move |conn| {
            let digest = content_digest(&content);
            let tx = conn.transaction()?;

            let existing: Option<Vec<u8>> = tx
                .query_row(
                    "SELECT digest FROM repository_versions
                     WHERE customer = ?1 AND name = ?2 AND version = ?3",
                    params![repo.customer, repo.name, version],
                    |row| row.get(0),
                )
                .optional()?;

            let outcome = match existing {
                Some(existing) if existing.as_slice() == digest.as_slice() => PutOutcome::Unchanged,
                Some(_) => PutOutcome::Conflict,
                None => {
                    tx.execute(
                        "INSERT INTO repository_versions (customer, name, version, digest, content, stored_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        params![
                            repo.customer,
                            repo.name,
                            version,
                            digest.as_slice(),
                            content.as_ref(),
                            now_millis(),
                        ],
                    )?;
                    PutOutcome::Stored
                }
            };

            tx.commit()?;
            Ok(outcome)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::LogStoreExt;

    fn event(target: &str, store: u64, id: u64) -> Event {
        Event::new(target, store, id, 1_000 + id as i64, 7)
    }

    #[tokio::test]
    async fn test_sqlite_put_and_descriptor() {
        let store = SqliteStore::open_memory().unwrap();
        let events: Vec<_> = [0, 1, 2, 3, 4, 7, 10, 11, 12]
            .iter()
            .map(|&id| event("gw", 1, id))
            .collect();

        let report = LogStore::put(&store, &events).await.unwrap();
        assert_eq!(report.inserted, 9);

        let desc = store.descriptor(&LogId::new("gw", 1)).await.unwrap().unwrap();
        assert_eq!(desc.range.to_string(), "0-4,7,10-12");
        assert!(store.descriptor(&LogId::new("gw", 2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sqlite_duplicates() {
        let store = SqliteStore::open_memory().unwrap();
        LogStore::put(&store, &[event("gw", 1, 1)]).await.unwrap();

        let report = LogStore::put(&store, &[event("gw", 1, 1), event("gw", 1, 2)]).await.unwrap();
        assert_eq!(report.inserted, 1);
        assert_eq!(report.duplicates, 1);
    }

    #[tokio::test]
    async fn test_sqlite_properties_roundtrip() {
        let store = SqliteStore::open_memory().unwrap();
        let original = event("gw", 1, 5)
            .with_property("bundle", "org.example,core")
            .with_property("state", "installed");
        LogStore::put(&store, &[original.clone()]).await.unwrap();

        let all = store.get_all(&LogId::new("gw", 1)).await.unwrap();
        assert_eq!(all, vec![original]);
    }

    #[tokio::test]
    async fn test_sqlite_get_by_range() {
        let store = SqliteStore::open_memory().unwrap();
        let events: Vec<_> = (0..20).map(|id| event("gw", 1, id)).collect();
        LogStore::put(&store, &events).await.unwrap();

        let range: SortedRangeSet = "3-5,17".parse().unwrap();
        let got = LogStore::get(&store, &LogId::new("gw", 1), &range).await.unwrap();
        let ids: Vec<_> = got.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![3, 4, 5, 17]);
    }

    #[tokio::test]
    async fn test_sqlite_floor() {
        let store = SqliteStore::open_memory().unwrap();
        let log = LogId::new("gw", 1);
        let events: Vec<_> = (1..=10).map(|id| event("gw", 1, id)).collect();
        LogStore::put(&store, &events).await.unwrap();

        assert!(store.set_lowest_id(&log, 5).await.unwrap());
        assert!(!store.set_lowest_id(&log, 4).await.unwrap());

        let desc = store.descriptor(&log).await.unwrap().unwrap();
        assert_eq!(desc.range.to_string(), "5-10");

        let report = LogStore::put(&store, &[event("gw", 1, 2)]).await.unwrap();
        assert_eq!(report.below_floor, 1);

        let floors = store.lowest_ids(&LogFilter::target("gw")).await.unwrap();
        assert_eq!(floors, vec![LowestId::new("gw", 1, 5)]);
    }

    #[tokio::test]
    async fn test_sqlite_append() {
        let store = SqliteStore::open_memory().unwrap();
        let log = LogId::new("gw", 3);

        let first = store.append(&log, 1, 2, BTreeMap::new()).await.unwrap();
        let second = store.append(&log, 1, 2, BTreeMap::new()).await.unwrap();
        assert_eq!((first.id, second.id), (0, 1));

        store.set_lowest_id(&log, 50).await.unwrap();
        let third = store.append(&log, 1, 2, BTreeMap::new()).await.unwrap();
        assert_eq!(third.id, 50);
    }

    #[tokio::test]
    async fn test_sqlite_skips_oversized_ids() {
        let store = SqliteStore::open_memory().unwrap();
        let batch = [
            event("gw", 1, 1),
            event("gw", 1, u64::MAX),
            event("gw", u64::MAX, 3),
            event("gw", 1, 2),
        ];

        let report = LogStore::put(&store, &batch).await.unwrap();
        assert_eq!((report.inserted, report.out_of_range), (2, 2));

        let desc = store.descriptor(&LogId::new("gw", 1)).await.unwrap().unwrap();
        assert_eq!(desc.range.to_string(), "1-2");
    }

    #[tokio::test]
    async fn test_sqlite_append_at_top_of_id_space() {
        let store = SqliteStore::open_memory().unwrap();
        let log = LogId::new("gw", 1);
        LogStore::put(&store, &[Event::new("gw", 1, MAX_ID, 0, 7)]).await.unwrap();

        let result = store.append(&log, 1, 2, BTreeMap::new()).await;
        assert!(matches!(result, Err(StoreError::IdsExhausted(_))));
        assert_eq!(LogStore::get(&store, &log, &SortedRangeSet::full()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sqlite_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outpost.db");
        let repo = RepositoryId::new("acme", "shop");

        {
            let store = SqliteStore::open(&path).unwrap();
            LogStore::put(&store, &[event("gw", 1, 1)]).await.unwrap();
            store.put_version(&repo, 1, b"v1").await;
        }

        let store = SqliteStore::open(&path).unwrap();
        let desc = store.descriptor(&LogId::new("gw", 1)).await.unwrap().unwrap();
        assert_eq!(desc.range.to_string(), "1");
        assert_eq!(
            RepositoryStore::versions(&store, &repo).await.unwrap().to_string(),
            "1"
        );
    }

    #[tokio::test]
    async fn test_sqlite_repository_outcomes() {
        let store = SqliteStore::open_memory().unwrap();
        let repo = RepositoryId::new("acme", "shop");

        assert_eq!(store.put_version(&repo, 1, b"a").await, PutOutcome::Stored);
        assert_eq!(store.put_version(&repo, 1, b"a").await, PutOutcome::Unchanged);
        assert_eq!(store.put_version(&repo, 1, b"b").await, PutOutcome::Conflict);

        let content = RepositoryStore::get(&store, &repo, 1).await.unwrap().unwrap();
        assert_eq!(&content[..], b"a");
        assert!(RepositoryStore::get(&store, &repo, 2).await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec![repo]);
    }

    impl SqliteStore {
        async fn put_version(&self, repo: &RepositoryId, version: u64, content: &'static [u8]) -> PutOutcome {
            RepositoryStore::put(self, repo, version, Bytes::from_static(content))
                .await
                .unwrap()
        }
    }
}
