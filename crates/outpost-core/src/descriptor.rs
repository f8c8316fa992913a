//! Descriptor: which event ids a party holds for one log.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::codec::{decode, encode};
use crate::error::{CoreError, Result};
use crate::event::{parse_id, LogId};
use crate::range_set::SortedRangeSet;

/// A log key plus the set of event ids known for that log.
///
/// Descriptors carry no event payloads; they are what a sync peer advertises
/// so the other side can compute a delta.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Descriptor {
    pub target_id: String,
    pub store_id: u64,
    pub range: SortedRangeSet,
}

impl Descriptor {
    /// Create a descriptor.
    pub fn new(target_id: impl Into<String>, store_id: u64, range: SortedRangeSet) -> Self {
        Self {
            target_id: target_id.into(),
            store_id,
            range,
        }
    }

    /// The lookup key.
    pub fn log_id(&self) -> LogId {
        LogId::new(self.target_id.clone(), self.store_id)
    }

    /// Whether `other` describes the same log.
    pub fn same_log(&self, other: &Descriptor) -> bool {
        self.target_id == other.target_id && self.store_id == other.store_id
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            encode(&self.target_id),
            self.store_id,
            self.range
        )
    }
}

impl FromStr for Descriptor {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || CoreError::MalformedDescriptor(s.to_string());

        // The range itself is comma separated, so only split off the key.
        let mut fields = s.splitn(3, ',');
        let (Some(target), Some(store), Some(range)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(malformed());
        };

        Ok(Self {
            target_id: decode(target).map_err(|_| malformed())?,
            store_id: parse_id(store).ok_or_else(malformed)?,
            range: range.parse().map_err(|_| malformed())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_text_form() {
        let desc = Descriptor::new("gw-1", 2, "0-4,7,10-12".parse().unwrap());
        assert_eq!(desc.to_string(), "gw-1,2,0-4,7,10-12");
        assert_eq!(desc.to_string().parse::<Descriptor>().unwrap(), desc);
    }

    #[test]
    fn test_descriptor_empty_range() {
        let desc = Descriptor::new("gw,1", 0, SortedRangeSet::empty());
        assert_eq!(desc.to_string(), "gw$k1,0,");
        assert_eq!("gw$k1,0,".parse::<Descriptor>().unwrap(), desc);
    }

    #[test]
    fn test_descriptor_rejects_malformed() {
        for bad in ["", "t", "t,1", "t,x,1-2", "t,1,3-1"] {
            assert!(
                matches!(bad.parse::<Descriptor>(), Err(CoreError::MalformedDescriptor(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_same_log() {
        let a = Descriptor::new("t", 1, SortedRangeSet::empty());
        let b = Descriptor::new("t", 1, "1-9".parse().unwrap());
        let c = Descriptor::new("t", 2, SortedRangeSet::empty());
        assert!(a.same_log(&b));
        assert!(!a.same_log(&c));
        assert_eq!(a.log_id(), b.log_id());
    }
}
