//! SortedRangeSet: a compact set of non-negative integers.
//!
//! Stored as ascending, non-overlapping, non-adjacent [`Range`]s. This is the
//! structure both sides of a sync exchange to describe "which ids do I hold",
//! and the set difference between two of them is the transfer delta.
//!
//! ## Canonical form
//!
//! Every value has exactly one representation:
//!
//! - the empty set is `Empty` (text: `""`)
//! - the set of every `u64` is `Full` (text: `0-18446744073709551615`)
//! - anything else is a non-empty, coalesced list of ranges
//!
//! so derived equality is semantic equality.
//!
//! ## Direction of `diff_dest`
//!
//! `a.diff_dest(&b)` is `b \ a`: everything the *destination* `b` has that
//! `a` lacks.
//!
//! ```
//! use outpost_core::SortedRangeSet;
//!
//! let a: SortedRangeSet = "1-3".parse().unwrap();
//! let b: SortedRangeSet = "2-4".parse().unwrap();
//! assert_eq!(a.diff_dest(&b).to_string(), "4");
//! assert_eq!(b.diff_dest(&a).to_string(), "1");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::range::Range;

const FULL_SPAN: [Range; 1] = [Range::FULL];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Repr {
    Empty,
    /// Non-empty, sorted, coalesced, and never exactly `[0, u64::MAX]`.
    Ranges(Vec<Range>),
    Full,
}

/// An ordered set of integers stored as coalesced ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SortedRangeSet {
    repr: Repr,
}

impl SortedRangeSet {
    /// The empty set.
    pub const fn empty() -> Self {
        Self { repr: Repr::Empty }
    }

    /// The set containing every non-negative integer.
    ///
    /// Used where a party has no information and must be treated as holding
    /// everything, or as a "no filtering" wildcard.
    pub const fn full() -> Self {
        Self { repr: Repr::Full }
    }

    /// Build from integers in any order, with duplicates allowed.
    pub fn from_values<I: IntoIterator<Item = u64>>(values: I) -> Self {
        let mut values: Vec<u64> = values.into_iter().collect();
        values.sort_unstable();
        values.dedup();

        let mut spans: Vec<Range> = Vec::new();
        for value in values {
            match spans.last_mut() {
                Some(last) if last.high() + 1 == value => *last = last.with_high(value),
                _ => spans.push(Range::single(value)),
            }
        }
        Self::from_spans(spans)
    }

    /// Build from ranges in any order; overlapping and adjacent ranges are merged.
    pub fn from_ranges<I: IntoIterator<Item = Range>>(ranges: I) -> Self {
        Self::from_spans(coalesce(ranges.into_iter().collect()))
    }

    /// Wrap spans that are already sorted and coalesced.
    fn from_spans(spans: Vec<Range>) -> Self {
        let repr = match spans.as_slice() {
            [] => Repr::Empty,
            [only] if *only == Range::FULL => Repr::Full,
            _ => Repr::Ranges(spans),
        };
        Self { repr }
    }

    /// The component ranges, ascending.
    pub fn ranges(&self) -> &[Range] {
        match &self.repr {
            Repr::Empty => &[],
            Repr::Ranges(spans) => spans,
            Repr::Full => &FULL_SPAN,
        }
    }

    /// Whether the set has no members.
    pub fn is_empty(&self) -> bool {
        matches!(self.repr, Repr::Empty)
    }

    /// Whether the set holds every `u64`.
    pub fn is_full(&self) -> bool {
        matches!(self.repr, Repr::Full)
    }

    /// Smallest member.
    pub fn low(&self) -> Option<u64> {
        self.ranges().first().map(Range::low)
    }

    /// Largest member.
    pub fn high(&self) -> Option<u64> {
        self.ranges().last().map(Range::high)
    }

    /// Number of members.
    pub fn count(&self) -> u128 {
        self.ranges().iter().map(Range::len).sum()
    }

    /// Membership test, O(log R) in the number of ranges.
    pub fn contains(&self, value: u64) -> bool {
        let spans = self.ranges();
        let idx = spans.partition_point(|r| r.high() < value);
        idx < spans.len() && spans[idx].low() <= value
    }

    /// A copy with `value` inserted.
    ///
    /// Extends a neighbouring range when `value` touches it, and joins the two
    /// neighbours into one when `value` is exactly the gap between them.
    pub fn add(&self, value: u64) -> Self {
        if self.contains(value) {
            return self.clone();
        }

        let spans = self.ranges();
        // First range entirely above `value`; everything before ends below it.
        let idx = spans.partition_point(|r| r.high() < value);
        let joins_prev = idx > 0 && spans[idx - 1].high() + 1 == value;
        let joins_next = idx < spans.len() && value + 1 == spans[idx].low();

        let mut out = Vec::with_capacity(spans.len() + 1);
        match (joins_prev, joins_next) {
            (true, true) => {
                out.extend_from_slice(&spans[..idx - 1]);
                out.push(spans[idx - 1].with_high(spans[idx].high()));
                out.extend_from_slice(&spans[idx + 1..]);
            }
            (true, false) => {
                out.extend_from_slice(&spans[..idx - 1]);
                out.push(spans[idx - 1].with_high(value));
                out.extend_from_slice(&spans[idx..]);
            }
            (false, true) => {
                out.extend_from_slice(&spans[..idx]);
                out.push(spans[idx].with_low(value));
                out.extend_from_slice(&spans[idx + 1..]);
            }
            (false, false) => {
                out.extend_from_slice(&spans[..idx]);
                out.push(Range::single(value));
                out.extend_from_slice(&spans[idx..]);
            }
        }
        Self::from_spans(out)
    }

    /// Everything in `dest` that is not in `self` (`dest \ self`).
    ///
    /// Works range by range, so `Full` on either side costs nothing extra.
    pub fn diff_dest(&self, dest: &SortedRangeSet) -> SortedRangeSet {
        let minus = self.ranges();
        let mut out = Vec::new();
        let mut j = 0;

        for span in dest.ranges() {
            let mut low = span.low();
            let high = span.high();

            while j < minus.len() && minus[j].high() < low {
                j += 1;
            }

            let mut covered = false;
            let mut k = j;
            while k < minus.len() && minus[k].low() <= high {
                let hole = minus[k];
                if hole.low() > low {
                    out.push(Range::FULL.with_low(low).with_high(hole.low() - 1));
                }
                if hole.high() >= high {
                    covered = true;
                    break;
                }
                low = hole.high() + 1;
                k += 1;
            }
            if !covered {
                out.push(Range::FULL.with_low(low).with_high(high));
            }
            j = k;
        }

        Self::from_spans(out)
    }

    /// Everything in either set.
    pub fn union(&self, other: &SortedRangeSet) -> SortedRangeSet {
        if self.is_full() || other.is_full() {
            return Self::full();
        }
        let mut spans = Vec::with_capacity(self.ranges().len() + other.ranges().len());
        spans.extend_from_slice(self.ranges());
        spans.extend_from_slice(other.ranges());
        Self::from_spans(coalesce(spans))
    }

    /// Members greater than or equal to `floor`.
    ///
    /// This is how a compaction watermark is applied to a set of ids.
    pub fn retain_from(&self, floor: u64) -> SortedRangeSet {
        let spans = self
            .ranges()
            .iter()
            .filter(|r| r.high() >= floor)
            .map(|r| if r.low() < floor { r.with_low(floor) } else { *r })
            .collect();
        Self::from_spans(spans)
    }

    /// Ascending iterator over the individual members.
    pub fn iter(&self) -> RangeIter<'_> {
        RangeIter::new(self.ranges())
    }

    /// Descending iterator over the individual members.
    pub fn iter_rev(&self) -> std::iter::Rev<RangeIter<'_>> {
        self.iter().rev()
    }
}

impl Default for SortedRangeSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Range> for SortedRangeSet {
    fn from(range: Range) -> Self {
        Self::from_spans(vec![range])
    }
}

impl fmt::Display for SortedRangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, range) in self.ranges().iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", range)?;
        }
        Ok(())
    }
}

impl FromStr for SortedRangeSet {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Ok(Self::empty());
        }
        let ranges = s
            .split(',')
            .map(|token| {
                token
                    .parse::<Range>()
                    .map_err(|_| CoreError::MalformedRangeSet(s.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_ranges(ranges))
    }
}

impl TryFrom<String> for SortedRangeSet {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SortedRangeSet> for String {
    fn from(set: SortedRangeSet) -> Self {
        set.to_string()
    }
}

impl<'a> IntoIterator for &'a SortedRangeSet {
    type Item = u64;
    type IntoIter = RangeIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Sort and merge overlapping or adjacent ranges.
fn coalesce(mut spans: Vec<Range>) -> Vec<Range> {
    spans.sort_unstable();
    let mut out: Vec<Range> = Vec::with_capacity(spans.len());
    for span in spans {
        match out.last_mut() {
            Some(last) if span.low() <= last.high().saturating_add(1) => {
                if span.high() > last.high() {
                    *last = last.with_high(span.high());
                }
            }
            _ => out.push(span),
        }
    }
    out
}

/// Iterator over the members of a [`SortedRangeSet`].
///
/// Borrows the set, so it always sees the set as it was when created. Each
/// call to [`SortedRangeSet::iter`] starts a fresh pass.
#[derive(Debug, Clone)]
pub struct RangeIter<'a> {
    spans: &'a [Range],
    front: (usize, u64),
    back: (usize, u64),
    remaining: u128,
}

impl<'a> RangeIter<'a> {
    fn new(spans: &'a [Range]) -> Self {
        let front = spans.first().map_or((0, 0), |r| (0, r.low()));
        let back = spans
            .last()
            .map_or((0, 0), |r| (spans.len() - 1, r.high()));
        Self {
            spans,
            front,
            back,
            remaining: spans.iter().map(Range::len).sum(),
        }
    }

    /// Members not yet yielded from either end.
    pub fn remaining(&self) -> u128 {
        self.remaining
    }
}

impl Iterator for RangeIter<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let (idx, value) = self.front;
        if value == self.spans[idx].high() {
            if let Some(next) = self.spans.get(idx + 1) {
                self.front = (idx + 1, next.low());
            }
        } else {
            self.front = (idx, value + 1);
        }
        Some(value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match usize::try_from(self.remaining) {
            Ok(n) => (n, Some(n)),
            Err(_) => (usize::MAX, None),
        }
    }
}

impl DoubleEndedIterator for RangeIter<'_> {
    fn next_back(&mut self) -> Option<u64> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let (idx, value) = self.back;
        if value == self.spans[idx].low() {
            if idx > 0 {
                self.back = (idx - 1, self.spans[idx - 1].high());
            }
        } else {
            self.back = (idx, value - 1);
        }
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(s: &str) -> SortedRangeSet {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_coalesces() {
        assert_eq!(set("1,2,3").to_string(), "1-3");
        assert_eq!(set("10-12,0-4,7").to_string(), "0-4,7,10-12");
        assert_eq!(set("1-5,3-8,9").to_string(), "1-9");
    }

    #[test]
    fn test_parse_empty() {
        assert!(set("").is_empty());
        assert_eq!(SortedRangeSet::empty().to_string(), "");
    }

    #[test]
    fn test_parse_rejects_bad_token() {
        assert!(matches!(
            "1-3,x".parse::<SortedRangeSet>(),
            Err(CoreError::MalformedRangeSet(_))
        ));
        assert!("1-3,,5".parse::<SortedRangeSet>().is_err());
        assert!("5-1".parse::<SortedRangeSet>().is_err());
    }

    #[test]
    fn test_full_normalizes() {
        let full = SortedRangeSet::full();
        assert_eq!(set(&full.to_string()), full);
        assert_eq!(set("0-100,101-18446744073709551615"), full);
        assert!(full.contains(u64::MAX));
    }

    #[test]
    fn test_from_values() {
        let s = SortedRangeSet::from_values([9, 3, 1, 2, 2, 7, 8]);
        assert_eq!(s.to_string(), "1-3,7-9");
        assert!(SortedRangeSet::from_values(std::iter::empty()).is_empty());
    }

    #[test]
    fn test_add_coalesces() {
        let mut s = SortedRangeSet::empty();
        for v in [1, 2, 3, 5, 4] {
            s = s.add(v);
        }
        assert_eq!(s.to_string(), "1-5");
        assert_eq!(s.ranges().len(), 1);
    }

    #[test]
    fn test_add_cases() {
        assert_eq!(set("1-3,7").add(5).to_string(), "1-3,5,7");
        assert_eq!(set("1-3,7").add(4).to_string(), "1-4,7");
        assert_eq!(set("1-3,7").add(6).to_string(), "1-3,6-7");
        assert_eq!(set("1-3,5").add(4).to_string(), "1-5");
        assert_eq!(set("1-3").add(2).to_string(), "1-3");
        assert_eq!(set("5").add(0).to_string(), "0,5");
        assert_eq!(set("0-18446744073709551614").add(u64::MAX), SortedRangeSet::full());
    }

    #[test]
    fn test_contains() {
        let s = set("0-4,7,10-12");
        for v in [0, 4, 7, 10, 12] {
            assert!(s.contains(v));
        }
        for v in [5, 6, 8, 9, 13, u64::MAX] {
            assert!(!s.contains(v));
        }
    }

    #[test]
    fn test_diff_dest_worked_example() {
        let a = set("1-3");
        let b = set("2-4");
        assert_eq!(a.diff_dest(&b), set("4"));
        assert_eq!(b.diff_dest(&a), set("1"));
    }

    #[test]
    fn test_diff_dest_splits_ranges() {
        let have = set("3-4,8");
        let dest = set("0-10");
        assert_eq!(have.diff_dest(&dest).to_string(), "0-2,5-7,9-10");
    }

    #[test]
    fn test_diff_dest_hole_spans_several_dest_ranges() {
        let have = set("2-20");
        let dest = set("0-3,5-7,19-25");
        assert_eq!(have.diff_dest(&dest).to_string(), "0-1,21-25");
    }

    #[test]
    fn test_diff_dest_empty_boundaries() {
        let b = set("1-3,9");
        assert!(b.diff_dest(&SortedRangeSet::empty()).is_empty());
        assert_eq!(SortedRangeSet::empty().diff_dest(&b), b);
    }

    #[test]
    fn test_diff_dest_full() {
        let b = set("1-3,9");
        assert!(SortedRangeSet::full().diff_dest(&b).is_empty());
        assert_eq!(
            b.diff_dest(&SortedRangeSet::full()).to_string(),
            "0,4-8,10-18446744073709551615"
        );
    }

    #[test]
    fn test_union() {
        let a = set("1-3,10");
        let b = set("4-6,9,20");
        assert_eq!(a.union(&b).to_string(), "1-6,9-10,20");
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.union(&a), a);
        assert!(a.union(&SortedRangeSet::full()).is_full());
    }

    #[test]
    fn test_retain_from() {
        let s = set("1-5,8,10-12");
        assert_eq!(s.retain_from(0), s);
        assert_eq!(s.retain_from(3).to_string(), "3-5,8,10-12");
        assert_eq!(s.retain_from(9).to_string(), "10-12");
        assert!(s.retain_from(13).is_empty());
    }

    #[test]
    fn test_bounds_and_count() {
        let s = set("2-4,9");
        assert_eq!(s.low(), Some(2));
        assert_eq!(s.high(), Some(9));
        assert_eq!(s.count(), 4);
        assert_eq!(SortedRangeSet::empty().high(), None);
        assert_eq!(SortedRangeSet::full().count(), 1u128 << 64);
    }

    #[test]
    fn test_iterators() {
        let s = set("1-3,7,9-10");
        assert_eq!(s.iter().collect::<Vec<_>>(), vec![1, 2, 3, 7, 9, 10]);
        assert_eq!(s.iter_rev().collect::<Vec<_>>(), vec![10, 9, 7, 3, 2, 1]);
        // restartable
        assert_eq!(s.iter().count(), 6);
        assert_eq!(s.iter().count(), 6);
        assert_eq!(SortedRangeSet::empty().iter().next(), None);
    }

    #[test]
    fn test_iterator_both_ends_meet() {
        let s = set("1-2,5");
        let mut it = s.iter();
        assert_eq!(it.next(), Some(1));
        assert_eq!(it.next_back(), Some(5));
        assert_eq!(it.next_back(), Some(2));
        assert_eq!(it.next(), None);
        assert_eq!(it.next_back(), None);
    }

    #[test]
    fn test_iterate_full_lazily() {
        let full = SortedRangeSet::full();
        assert_eq!(full.iter().take(3).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(full.iter_rev().next(), Some(u64::MAX));
    }

    #[test]
    fn test_serde_as_text() {
        let s = set("0-4,7");
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"0-4,7\"");
        let back: SortedRangeSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }
}
