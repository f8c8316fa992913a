//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
            tracing::debug!(version, "applied schema migration");
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- One row per known log, holding its compaction floor
        CREATE TABLE logs (
            target_id TEXT NOT NULL,
            store_id INTEGER NOT NULL,
            lowest_id INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (target_id, store_id)
        );

        -- Retained events
        CREATE TABLE events (
            target_id TEXT NOT NULL,
            store_id INTEGER NOT NULL,
            id INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,       -- origin-claimed time (Unix ms)
            event_type INTEGER NOT NULL,
            properties BLOB NOT NULL,         -- CBOR map of string -> string
            ingested_at INTEGER NOT NULL,     -- local time of storage
            PRIMARY KEY (target_id, store_id, id)
        );

        -- Repository content, one row per committed version
        CREATE TABLE repository_versions (
            customer TEXT NOT NULL,
            name TEXT NOT NULL,
            version INTEGER NOT NULL,
            digest BLOB NOT NULL,             -- 32 bytes, Blake3 of content
            content BLOB NOT NULL,
            stored_at INTEGER NOT NULL,
            PRIMARY KEY (customer, name, version)
        );
        "#,
    )?;

    Ok(())
}

/// Get current time in milliseconds.
pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
