//! # Outpost Testkit
//!
//! Testing utilities for Outpost.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Golden vectors**: Known wire lines with their canonical rendering
//! - **Generators**: Proptest strategies for range sets, events and watermarks
//! - **Fixtures**: Seeded stores and local/remote pairs on an in-memory network
//!
//! ## Golden Vectors
//!
//! ```rust
//! use outpost_testkit::vectors::{all_vectors, canonicalize};
//!
//! for vector in all_vectors() {
//!     let rendered = canonicalize(vector.kind, vector.input);
//!     println!("{}: {:?}", vector.name, rendered);
//! }
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use outpost_testkit::generators::range_set;
//!
//! proptest! {
//!     #[test]
//!     fn union_is_idempotent(a in range_set()) {
//!         prop_assert_eq!(a.union(&a), a);
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,ignore
//! use outpost_testkit::fixtures::{seeded_store, SyncPair};
//!
//! let pair = SyncPair::new(
//!     seeded_store(&[("door", 1, "1-5")]).await?,
//!     seeded_store(&[("door", 1, "4-9")]).await?,
//! )
//! .await;
//! let report = pair.sync(Default::default()).synchronize().await?;
//! ```

pub mod fixtures;
pub mod generators;
pub mod vectors;

pub use fixtures::{event, seeded_store, RepositoryPair, SyncPair, REMOTE};
pub use generators::{log_events, range_set, wide_range_set};
pub use vectors::{all_vectors, canonicalize, verify_all_vectors, GoldenVector, RecordKind};
