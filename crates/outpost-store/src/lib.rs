//! # Outpost Store
//!
//! Storage abstraction for Outpost. Provides trait-based interfaces for
//! event-log and repository persistence with SQLite and in-memory
//! implementations.
//!
//! ## Overview
//!
//! Event logs live behind the [`LogStore`] trait and versioned repository
//! content behind [`RepositoryStore`], so the sync and replication protocols
//! stay storage-agnostic. The primary implementation is [`SqliteStore`],
//! which serves both. [`MemoryLogStore`] and [`MemoryRepositoryStore`] are
//! for tests and relays.
//!
//! ## Key Types
//!
//! - [`LogStore`] - The async trait for event-log operations
//! - [`RepositoryStore`] - The async trait for repository versions
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`LogFilter`] - Selects logs by target and store
//! - [`PutReport`] / [`PutOutcome`] - Results of writes
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use outpost_core::LogId;
//! use outpost_store::{LogFilter, LogStore, SqliteStore};
//!
//! async fn example() {
//!     let store = SqliteStore::open("outpost.db").unwrap();
//!
//!     let log = LogId::new("gateway-7", 1);
//!     let event = store.append(&log, 1_700_000_000_000, 3, BTreeMap::new()).await.unwrap();
//!     assert_eq!(event.id, 0);
//!
//!     for descriptor in store.descriptors(&LogFilter::all()).await.unwrap() {
//!         println!("{}", descriptor);
//!     }
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Idempotent puts**: storing a known `(target, store, id)` again is a no-op
//! - **Monotonic floors**: a log's lowest id only rises and purges what it passes
//! - **Immutable versions**: a repository version is written once, re-puts are
//!   compared by Blake3 digest

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryLogStore, MemoryRepositoryStore};
pub use sqlite::SqliteStore;
pub use traits::{
    content_digest, LogFilter, LogStore, LogStoreExt, PutOutcome, PutReport, RepositoryStore,
};
