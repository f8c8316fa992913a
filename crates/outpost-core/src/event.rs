//! Events, log identifiers and compaction watermarks.
//!
//! An [`Event`] is one entry in the audit log a target keeps for a given
//! store. Its `id` is assigned once by the originating party and is unique
//! within its `(target_id, store_id)` log, so replicas deduplicate on that
//! key alone, never on content.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::codec::{decode, encode};
use crate::error::{CoreError, Result};

/// Largest id, store id or floor a record may carry on the wire.
///
/// Ids are non-negative 64-bit signed integers, so every stored value fits
/// an SQL `INTEGER`.
pub const MAX_ID: u64 = i64::MAX as u64;

pub(crate) fn parse_id(token: &str) -> Option<u64> {
    token.parse::<u64>().ok().filter(|&id| id <= MAX_ID)
}

/// Key of one logical log: the owning target plus the store it lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LogId {
    /// The target (device) that owns the log.
    pub target_id: String,
    /// The store on that target.
    pub store_id: u64,
}

impl LogId {
    /// Create a log key.
    pub fn new(target_id: impl Into<String>, store_id: u64) -> Self {
        Self {
            target_id: target_id.into(),
            store_id,
        }
    }
}

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.target_id, self.store_id)
    }
}

/// A single audit event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Event {
    /// The target the event belongs to.
    pub target_id: String,
    /// The store the event was logged in.
    pub store_id: u64,
    /// Sequence number within `(target_id, store_id)`.
    pub id: u64,
    /// Creation time (Unix ms) as claimed by the origin.
    pub timestamp: i64,
    /// Application-defined event type.
    pub event_type: u32,
    /// Free-form attributes.
    pub properties: BTreeMap<String, String>,
}

impl Event {
    /// Create an event without properties.
    pub fn new(
        target_id: impl Into<String>,
        store_id: u64,
        id: u64,
        timestamp: i64,
        event_type: u32,
    ) -> Self {
        Self {
            target_id: target_id.into(),
            store_id,
            id,
            timestamp,
            event_type,
            properties: BTreeMap::new(),
        }
    }

    /// Add a property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// The log this event belongs to.
    pub fn log_id(&self) -> LogId {
        LogId::new(self.target_id.clone(), self.store_id)
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Lexicographic by `(target_id, store_id, id)`.
impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.target_id, self.store_id, self.id)
            .cmp(&(&other.target_id, other.store_id, other.id))
            .then_with(|| self.timestamp.cmp(&other.timestamp))
            .then_with(|| self.event_type.cmp(&other.event_type))
            .then_with(|| self.properties.cmp(&other.properties))
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            encode(&self.target_id),
            self.store_id,
            self.id,
            self.timestamp,
            self.event_type
        )?;
        for (key, value) in &self.properties {
            write!(f, ",{},{}", encode(key), encode(value))?;
        }
        Ok(())
    }
}

impl FromStr for Event {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = |why: &str| CoreError::MalformedEvent(format!("{}: {:?}", why, s));

        let fields: Vec<&str> = s.split(',').collect();
        if fields.len() < 5 {
            return Err(malformed("expected at least 5 fields"));
        }
        if (fields.len() - 5) % 2 != 0 {
            return Err(malformed("dangling property key"));
        }

        let target_id = decode(fields[0]).map_err(|_| malformed("bad target id"))?;
        let store_id = parse_id(fields[1]).ok_or_else(|| malformed("bad store id"))?;
        let id = parse_id(fields[2]).ok_or_else(|| malformed("bad event id"))?;
        let timestamp = fields[3].parse().map_err(|_| malformed("bad timestamp"))?;
        let event_type = fields[4].parse().map_err(|_| malformed("bad event type"))?;

        let mut properties = BTreeMap::new();
        for pair in fields[5..].chunks(2) {
            let key = decode(pair[0]).map_err(|_| malformed("bad property key"))?;
            let value = decode(pair[1]).map_err(|_| malformed("bad property value"))?;
            properties.insert(key, value);
        }

        Ok(Self {
            target_id,
            store_id,
            id,
            timestamp,
            event_type,
            properties,
        })
    }
}

/// Watermark below which a log's events have been purged.
///
/// Ids under `lowest_id` are no longer retained and must not be requested
/// or re-sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LowestId {
    pub target_id: String,
    pub store_id: u64,
    pub lowest_id: u64,
}

impl LowestId {
    /// Create a watermark record.
    pub fn new(target_id: impl Into<String>, store_id: u64, lowest_id: u64) -> Self {
        Self {
            target_id: target_id.into(),
            store_id,
            lowest_id,
        }
    }

    /// The log this watermark applies to.
    pub fn log_id(&self) -> LogId {
        LogId::new(self.target_id.clone(), self.store_id)
    }
}

impl fmt::Display for LowestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{}",
            encode(&self.target_id),
            self.store_id,
            self.lowest_id
        )
    }
}

impl FromStr for LowestId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || CoreError::MalformedLowestId(s.to_string());

        let fields: Vec<&str> = s.split(',').collect();
        let [target, store, lowest] = fields.as_slice() else {
            return Err(malformed());
        };
        Ok(Self {
            target_id: decode(target).map_err(|_| malformed())?,
            store_id: parse_id(store).ok_or_else(malformed)?,
            lowest_id: parse_id(lowest).ok_or_else(malformed)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_text_form() {
        let event = Event::new("gw-1", 3, 42, 1_700_000_000_000, 2001)
            .with_property("name", "bundle,a")
            .with_property("version", "1.0");
        let text = event.to_string();
        assert_eq!(
            text,
            "gw-1,3,42,1700000000000,2001,name,bundle$ka,version,1.0"
        );
        assert_eq!(text.parse::<Event>().unwrap(), event);
    }

    #[test]
    fn test_event_without_properties() {
        let event: Event = "t,1,2,3,4".parse().unwrap();
        assert_eq!(event, Event::new("t", 1, 2, 3, 4));
    }

    #[test]
    fn test_event_encoded_target() {
        let event = Event::new("a,b\nc", 0, 0, -5, 0);
        assert_eq!(event.to_string().parse::<Event>().unwrap(), event);
    }

    #[test]
    fn test_event_rejects_malformed() {
        for bad in [
            "",
            "t,1,2,3",
            "t,x,2,3,4",
            "t,1,-2,3,4",
            "t,1,2,3,4,key",
            "t$q,1,2,3,4",
            "t,1,2,3,4,k,v$",
        ] {
            assert!(
                matches!(bad.parse::<Event>(), Err(CoreError::MalformedEvent(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_event_ids_bounded_by_int64() {
        let top: Event = "t,9223372036854775807,9223372036854775807,0,1".parse().unwrap();
        assert_eq!((top.store_id, top.id), (MAX_ID, MAX_ID));

        for bad in [
            "t,1,9223372036854775808,0,1",
            "t,1,18446744073709551615,0,1",
            "t,9223372036854775808,1,0,1",
        ] {
            assert!(
                matches!(bad.parse::<Event>(), Err(CoreError::MalformedEvent(_))),
                "{bad:?} should not parse"
            );
        }
    }

    #[test]
    fn test_event_ordering() {
        let mut events = vec![
            Event::new("b", 1, 1, 0, 0),
            Event::new("a", 2, 1, 0, 0),
            Event::new("a", 1, 9, 0, 0),
            Event::new("a", 1, 3, 0, 0),
        ];
        events.sort();
        let keys: Vec<_> = events
            .iter()
            .map(|e| (e.target_id.as_str(), e.store_id, e.id))
            .collect();
        assert_eq!(keys, vec![("a", 1, 3), ("a", 1, 9), ("a", 2, 1), ("b", 1, 1)]);
    }

    #[test]
    fn test_lowest_id_text_form() {
        let lowest = LowestId::new("gw,1", 7, 100);
        assert_eq!(lowest.to_string(), "gw$k1,7,100");
        assert_eq!("gw$k1,7,100".parse::<LowestId>().unwrap(), lowest);
    }

    #[test]
    fn test_lowest_id_rejects_malformed() {
        for bad in ["", "t,1", "t,1,2,3", "t,1,x", "t,1,9223372036854775808"] {
            assert!(bad.parse::<LowestId>().is_err(), "{bad:?} should not parse");
        }
    }
}
