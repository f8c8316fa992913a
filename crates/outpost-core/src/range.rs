//! Range: an inclusive interval of non-negative integers.
//!
//! The atomic unit of a [`SortedRangeSet`](crate::SortedRangeSet). Ranges are
//! immutable values; adjusting a bound produces a new range.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};

/// An inclusive `[low, high]` interval with `low <= high`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Range {
    low: u64,
    high: u64,
}

impl Range {
    /// `[0, u64::MAX]`.
    pub const FULL: Self = Self {
        low: 0,
        high: u64::MAX,
    };

    /// Create a range, rejecting `low > high`.
    pub fn new(low: u64, high: u64) -> Result<Self> {
        if low > high {
            return Err(CoreError::MalformedRange(format!("{}-{}", low, high)));
        }
        Ok(Self { low, high })
    }

    /// A range holding a single value.
    pub const fn single(value: u64) -> Self {
        Self {
            low: value,
            high: value,
        }
    }

    /// Lower bound (inclusive).
    pub const fn low(&self) -> u64 {
        self.low
    }

    /// Upper bound (inclusive).
    pub const fn high(&self) -> u64 {
        self.high
    }

    /// Check whether `value` falls inside this range.
    pub const fn contains(&self, value: u64) -> bool {
        self.low <= value && value <= self.high
    }

    /// Number of integers covered. `u128` because `[0, u64::MAX]` has 2^64 members.
    pub const fn len(&self) -> u128 {
        (self.high - self.low) as u128 + 1
    }

    /// A copy with a new lower bound.
    ///
    /// If `low` is above the current upper bound the result collapses to `[low, low]`.
    pub const fn with_low(&self, low: u64) -> Self {
        if low > self.high {
            Self::single(low)
        } else {
            Self {
                low,
                high: self.high,
            }
        }
    }

    /// A copy with a new upper bound.
    ///
    /// If `high` is below the current lower bound the result collapses to `[high, high]`.
    pub const fn with_high(&self, high: u64) -> Self {
        if high < self.low {
            Self::single(high)
        } else {
            Self {
                low: self.low,
                high,
            }
        }
    }
}

impl fmt::Display for Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

impl FromStr for Range {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        let malformed = || CoreError::MalformedRange(s.to_string());
        let parse = |token: &str| token.trim().parse::<u64>().map_err(|_| malformed());

        match s.split_once('-') {
            Some((low, high)) => Range::new(parse(low)?, parse(high)?).map_err(|_| malformed()),
            None => Ok(Range::single(parse(s)?)),
        }
    }
}

impl TryFrom<String> for Range {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Range> for String {
    fn from(range: Range) -> Self {
        range.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_single() {
        let range: Range = "7".parse().unwrap();
        assert_eq!(range, Range::single(7));
        assert_eq!(range.to_string(), "7");
    }

    #[test]
    fn test_parse_pair() {
        let range: Range = "3-9".parse().unwrap();
        assert_eq!(range.low(), 3);
        assert_eq!(range.high(), 9);
        assert_eq!(range.to_string(), "3-9");
        assert_eq!(range.len(), 7);
    }

    #[test]
    fn test_parse_degenerate_pair_prints_single() {
        let range: Range = "4-4".parse().unwrap();
        assert_eq!(range.to_string(), "4");
    }

    #[test]
    fn test_parse_rejects_inverted() {
        assert!(matches!(
            "9-3".parse::<Range>(),
            Err(CoreError::MalformedRange(_))
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in ["", "x", "1-", "-1", "1-2-3", "1.5", "-"] {
            assert!(bad.parse::<Range>().is_err(), "{bad:?} should not parse");
        }
    }

    #[test]
    fn test_contains() {
        let range = Range::new(2, 4).unwrap();
        assert!(!range.contains(1));
        assert!(range.contains(2));
        assert!(range.contains(4));
        assert!(!range.contains(5));
    }

    #[test]
    fn test_with_low_collapses() {
        let range = Range::new(2, 4).unwrap();
        assert_eq!(range.with_low(3), Range::new(3, 4).unwrap());
        assert_eq!(range.with_low(10), Range::single(10));
    }

    #[test]
    fn test_with_high_collapses() {
        let range = Range::new(5, 8).unwrap();
        assert_eq!(range.with_high(6), Range::new(5, 6).unwrap());
        assert_eq!(range.with_high(1), Range::single(1));
    }

    #[test]
    fn test_serde_checks_bounds() {
        let range = Range::new(3, 9).unwrap();
        let json = serde_json::to_string(&range).unwrap();
        assert_eq!(json, "\"3-9\"");
        assert_eq!(serde_json::from_str::<Range>(&json).unwrap(), range);

        assert!(serde_json::from_str::<Range>("\"9-3\"").is_err());
    }

    #[test]
    fn test_full_width_len() {
        let range = Range::new(0, u64::MAX).unwrap();
        assert_eq!(range.len(), 1u128 << 64);
    }
}
