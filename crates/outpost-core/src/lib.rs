//! # Outpost Core
//!
//! Pure primitives for Outpost: range sets, events and log descriptors.
//!
//! This crate contains no I/O, no storage, no networking. It is pure
//! computation over the values two parties exchange when they reconcile
//! append-only sequences of integers.
//!
//! ## Key Types
//!
//! - [`Range`] - An inclusive `[low, high]` interval
//! - [`SortedRangeSet`] - A coalesced set of ranges with `diff_dest` and `union`
//! - [`RangeIter`] - Lazy iteration over the members of a set
//! - [`Event`] / [`LowestId`] - Log records and compaction watermarks
//! - [`Descriptor`] - A log key plus the ids held for it
//! - [`RepositoryId`] - `(customer, name)` of a versioned repository
//!
//! ## Text formats
//!
//! Every type round-trips through `Display` / `FromStr`. Free-form strings
//! are escaped with [`codec::encode`] so records stay comma separated and
//! one per line.

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod event;
pub mod range;
pub mod range_set;
pub mod repository;

pub use descriptor::Descriptor;
pub use error::{CoreError, Result};
pub use event::{Event, LogId, LowestId, MAX_ID};
pub use range::Range;
pub use range_set::{RangeIter, SortedRangeSet};
pub use repository::RepositoryId;
