//! # Outpost Sync
//!
//! Event-log synchronization between a local store and a remote endpoint.
//!
//! ## Overview
//!
//! Each side describes its logs as [`outpost_core::Descriptor`]s: a log key
//! plus the range set of ids it holds. One pass diffs those range sets and
//! moves only the missing events, in either direction, over a
//! request/response [`Transport`].
//!
//! ## Key Properties
//!
//! - **Idempotent**: a second pass with no new writes does no work
//! - **Resumable**: deltas are recomputed from store contents every pass
//! - **Bandwidth-efficient**: only ids the peer lacks are transferred
//! - **Floor-aware**: compaction watermarks travel with the logs
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use outpost_store::MemoryLogStore;
//! use outpost_sync::{LogServer, LogSync, MemoryNetwork, SyncConfig};
//!
//! async fn example() {
//!     let network = MemoryNetwork::new();
//!     let server = Arc::new(LogServer::new(MemoryLogStore::new()));
//!     network.register("central", server).await;
//!
//!     let local = MemoryLogStore::new();
//!     let sync = LogSync::new(local, network.transport(), "central", SyncConfig::default());
//!     let report = sync.synchronize().await.unwrap();
//!     println!("pushed {} / pulled {}", report.pushed, report.pulled);
//! }
//! ```
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                           Endpoint
//!   |-------- GET query -------------->|
//!   |<------- descriptor lines --------|
//!   |-------- GET receiveids --------->|
//!   |<------- lowest-id lines ---------|
//!   |-------- POST sendids ----------->|   push
//!   |-------- POST send -------------->|   push
//!   |-------- GET receive?range=.. --->|   pull
//!   |<------- event lines -------------|
//! ```

pub mod client;
pub mod convergence;
pub mod duration_ms;
pub mod error;
pub mod messages;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::{RemoteLog, DEFAULT_REQUEST_TIMEOUT};
pub use convergence::{store_digest, verify_convergence, ConvergenceResult, StoreDigest};
pub use error::{Result, SyncError};
pub use messages::{Method, Request, Response};
pub use protocol::{pull_delta, push_delta, LogSync, SyncConfig, SyncReport};
pub use server::LogServer;
pub use transport::{memory::MemoryNetwork, memory::MemoryTransport, Service, Transport};
