//! # Outpost Repositories
//!
//! Versioned content repositories with a single master writer and
//! read-only replicas.
//!
//! ## Overview
//!
//! A repository, keyed by `(customer, name)`, is a gapless series of
//! immutable versions starting at 1. Only the master accepts commits, and
//! only for `highest + 1`. Replicas converge by diffing their version set
//! against the master's listing and fetching what they lack.
//!
//! ## Key Concepts
//!
//! - **Primary endpoint** (`repository/*`): query, checkout and sequenced commit
//! - **Replication endpoint** (`replication/*`): query, get and unconditional put
//! - **Conflict**: a put of different content for a stored version (409);
//!   identical content is a benign no-op
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use outpost_repo::{Repository, RepositoryConfig, RepositoryServer};
//! use outpost_store::MemoryRepositoryStore;
//!
//! async fn example() {
//!     let config = RepositoryConfig::master("acme", "deployment");
//!     let repo = Arc::new(Repository::open(config, MemoryRepositoryStore::new()).await.unwrap());
//!
//!     repo.commit(1, Bytes::from_static(b"<deployment/>")).await.unwrap();
//!     assert!(repo.commit(1, Bytes::from_static(b"again")).await.is_err());
//!
//!     let _server = RepositoryServer::new().with_repository(repo);
//! }
//! ```

pub mod client;
pub mod error;
pub mod replication;
pub mod repository;
pub mod server;

pub use client::{PrimaryClient, ReplicationClient};
pub use error::{RepoError, Result};
pub use replication::{ReplicationConfig, ReplicationReport, Replicator};
pub use repository::{Repository, RepositoryConfig, RepositoryListing};
pub use server::RepositoryServer;
