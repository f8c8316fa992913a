//! # Outpost
//!
//! Keeps audit event logs and versioned repositories in step across a set
//! of loosely connected nodes.
//!
//! ## Overview
//!
//! Each node owns a SQLite store and serves one endpoint. Periodically it:
//!
//! - **Syncs logs** with its log peers: descriptors are compared as sorted
//!   range sets and only the missing events move, in both directions
//! - **Replicates repositories** with its replication peers: missing
//!   versions are fetched or written, never overwritten
//!
//! Commits go only to the master instance of a repository and must be the
//! next version in sequence.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use outpost::{Node, NodeConfig};
//! use outpost::core::LogId;
//! use outpost::sync::MemoryNetwork;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let network = MemoryNetwork::new();
//!
//!     let mut node = Node::open(NodeConfig::default().with_log_peer("hq"), network.transport()).await?;
//!     node.register(&network, "branch-1").await;
//!     node.start();
//!
//!     node.append(&LogId::new("door-7", 1), 3, BTreeMap::new()).await?;
//!
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `outpost::core` - Range sets, events, descriptors, record codec
//! - `outpost::store` - Log and repository stores (memory, SQLite)
//! - `outpost::sync` - Log sync endpoint, client and pass
//! - `outpost::repo` - Repositories, commit sequencing and replication

pub mod error;
pub mod node;

// Re-export component crates
pub use outpost_core as core;
pub use outpost_repo as repo;
pub use outpost_store as store;
pub use outpost_sync as sync;

// Re-export main types for convenience
pub use error::{NodeError, Result};
pub use node::{Node, NodeConfig, NodeRepository, NodeStore, PassOutcome};

// Re-export commonly used types
pub use outpost_core::{Descriptor, Event, LogId, LowestId, RepositoryId, SortedRangeSet};
pub use outpost_repo::{ReplicationConfig, ReplicationReport, RepositoryConfig};
pub use outpost_sync::{SyncConfig, SyncReport};
