//! Error types for Outpost Core.

use thiserror::Error;

/// Errors raised while parsing the text representations of core types.
///
/// Every variant is a malformed-representation error: callers processing a
/// batch skip the offending record and keep going.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    #[error("malformed range: {0}")]
    MalformedRange(String),

    #[error("malformed range set: {0}")]
    MalformedRangeSet(String),

    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("malformed event: {0}")]
    MalformedEvent(String),

    #[error("malformed lowest id: {0}")]
    MalformedLowestId(String),

    #[error("malformed descriptor: {0}")]
    MalformedDescriptor(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
