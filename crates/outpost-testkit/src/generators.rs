//! Proptest generators for property-based testing.
//!
//! Values are drawn from a small domain by default so that generated ranges
//! overlap, touch and nest often; the `wide_*` variants reach the top of
//! the `u64` space where `Full` normalization and overflow live.

use std::collections::BTreeMap;

use proptest::prelude::*;

use outpost_core::{Event, LowestId, Range, SortedRangeSet, MAX_ID};

/// Upper bound of the narrow value domain.
pub const NARROW_MAX: u64 = 64;

/// A value in the narrow domain.
pub fn value() -> impl Strategy<Value = u64> {
    0u64..=NARROW_MAX
}

/// A value near either end of the `u64` space.
pub fn edge_value() -> impl Strategy<Value = u64> {
    prop_oneof![0u64..=8, (u64::MAX - 8)..=u64::MAX]
}

/// A range in the narrow domain.
pub fn range() -> impl Strategy<Value = Range> {
    (value(), 0u64..8).prop_map(|(low, width)| range_of(low, low.saturating_add(width)))
}

/// A range that may touch `0` or `u64::MAX`.
pub fn wide_range() -> impl Strategy<Value = Range> {
    prop_oneof![
        range(),
        (edge_value(), edge_value()).prop_map(|(a, b)| range_of(a.min(b), a.max(b))),
    ]
}

/// A set in the narrow domain, possibly empty.
pub fn range_set() -> impl Strategy<Value = SortedRangeSet> {
    prop::collection::vec(range(), 0..6).prop_map(SortedRangeSet::from_ranges)
}

/// A set that may be `Full` or reach the ends of the `u64` space.
pub fn wide_range_set() -> impl Strategy<Value = SortedRangeSet> {
    prop_oneof![
        4 => prop::collection::vec(wide_range(), 0..6).prop_map(SortedRangeSet::from_ranges),
        1 => Just(SortedRangeSet::full()),
    ]
}

/// Loose values, unsorted and with duplicates.
pub fn values() -> impl Strategy<Value = Vec<u64>> {
    prop::collection::vec(value(), 0..32)
}

/// A target id, including characters the record codec must escape.
pub fn target_id() -> impl Strategy<Value = String> {
    prop_oneof![
        "[a-z][a-z0-9-]{0,15}".prop_map(String::from),
        "[a-z$,\r\n ]{1,12}".prop_map(String::from),
    ]
}

/// Event properties with free-form keys and values.
pub fn properties() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z$,]{1,8}", "[ -~\n]{0,16}", 0..4)
}

/// An event with arbitrary content.
pub fn event() -> impl Strategy<Value = Event> {
    (
        target_id(),
        0u64..4,
        1u64..=NARROW_MAX,
        any::<i64>(),
        any::<u32>(),
        properties(),
    )
        .prop_map(|(target_id, store_id, id, timestamp, event_type, properties)| Event {
            target_id,
            store_id,
            id,
            timestamp,
            event_type,
            properties,
        })
}

/// Events of one log whose ids are exactly `ids`.
pub fn log_events(target_id: &str, store_id: u64, ids: &SortedRangeSet) -> Vec<Event> {
    ids.iter()
        .map(|id| Event::new(target_id, store_id, id, 1_700_000_000_000 + id as i64, 1))
        .collect()
}

/// A lowest-id record.
pub fn lowest_id() -> impl Strategy<Value = LowestId> {
    (target_id(), 0..=MAX_ID, 0..=MAX_ID)
        .prop_map(|(target_id, store_id, lowest)| LowestId::new(target_id, store_id, lowest))
}

fn range_of(low: u64, high: u64) -> Range {
    // Callers order the bounds.
    Range::new(low, high).unwrap_or(Range::single(low))
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_range_set_is_canonical(set in wide_range_set()) {
            let ranges = set.ranges();
            for pair in ranges.windows(2) {
                // Sorted, disjoint and not adjacent.
                prop_assert!(pair[0].high() < u64::MAX);
                prop_assert!(pair[0].high() + 1 < pair[1].low());
            }
        }

        #[test]
        fn test_log_events_match_ids(ids in range_set()) {
            let events = log_events("door", 1, &ids);
            prop_assert_eq!(events.len() as u128, ids.count());
            prop_assert!(events.iter().all(|e| ids.contains(e.id)));
        }
    }
}
