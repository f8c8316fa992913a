//! Golden wire vectors.
//!
//! Every record crossing the wire is one text line. These vectors pin the
//! canonical rendering of each record kind so that independent
//! implementations agree byte for byte: parsing `input` and rendering it
//! again must yield `canonical`, and inputs without a canonical form must
//! be rejected.

use serde::Serialize;

use outpost_core::codec::encode;
use outpost_core::{Descriptor, Event, LowestId, SortedRangeSet};
use outpost_repo::RepositoryListing;

/// Record kind a vector exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    RangeSet,
    Event,
    Descriptor,
    LowestId,
    Listing,
    /// `input` is a raw string, `canonical` its escaped form.
    Escape,
}

/// A golden test vector.
#[derive(Debug, Clone, Serialize)]
pub struct GoldenVector {
    /// Human-readable name for the vector.
    pub name: &'static str,
    pub kind: RecordKind,
    pub input: &'static str,
    /// Expected rendering; `None` if `input` must be rejected.
    pub canonical: Option<&'static str>,
}

/// Get all golden test vectors.
pub fn all_vectors() -> Vec<GoldenVector> {
    use RecordKind as K;

    let v = |name: &'static str, kind: RecordKind, input: &'static str, canonical: Option<&'static str>| GoldenVector {
        name,
        kind,
        input,
        canonical,
    };

    vec![
        // Range sets
        v("single value", K::RangeSet, "5", Some("5")),
        v("degenerate pair", K::RangeSet, "4-4", Some("4")),
        v("adjacent ranges coalesce", K::RangeSet, "1-3,4-5", Some("1-5")),
        v("unsorted overlap", K::RangeSet, "7-9,1-4,3-5", Some("1-5,7-9")),
        v("empty set", K::RangeSet, "", Some("")),
        v("full set", K::RangeSet, "0-18446744073709551615", Some("0-18446744073709551615")),
        v("full from pieces", K::RangeSet, "0-9,10-18446744073709551615", Some("0-18446744073709551615")),
        v("inverted range", K::RangeSet, "5-3", None),
        v("bad token", K::RangeSet, "1-x", None),
        v("overflowing value", K::RangeSet, "18446744073709551616", None),
        // Events
        v("event without properties", K::Event, "gw-1,3,42,1700000000000,2001", Some("gw-1,3,42,1700000000000,2001")),
        v(
            "event properties sorted",
            K::Event,
            "gw-1,3,42,1700000000000,2001,version,1.0,name,bundle$ka",
            Some("gw-1,3,42,1700000000000,2001,name,bundle$ka,version,1.0"),
        ),
        v("event escaped target", K::Event, "door$k7$$,1,1,-5,0", Some("door$k7$$,1,1,-5,0")),
        v("event dangling key", K::Event, "gw-1,3,42,1700000000000,2001,name", None),
        v("event too short", K::Event, "gw-1,3,42", None),
        v("event bad escape", K::Event, "gw$x,3,42,0,1", None),
        // Descriptors
        v("descriptor", K::Descriptor, "gw-1,2,0-4,7,10-12", Some("gw-1,2,0-4,7,10-12")),
        v("descriptor coalesces", K::Descriptor, "gw-1,2,3,1-2", Some("gw-1,2,1-3")),
        v("descriptor empty range", K::Descriptor, "gw$k1,0,", Some("gw$k1,0,")),
        v("descriptor missing range", K::Descriptor, "gw-1,2", None),
        // Lowest ids
        v("lowest id", K::LowestId, "gw-1,2,100", Some("gw-1,2,100")),
        v("lowest id extra field", K::LowestId, "gw-1,2,100,5", None),
        // Repository listings
        v("listing", K::Listing, "acme$kinc,shop,1-4", Some("acme$kinc,shop,1-4")),
        v("listing without versions", K::Listing, "acme,shop,", Some("acme,shop,")),
        v("listing missing versions", K::Listing, "acme", None),
        // Escaping
        v("escape separators", K::Escape, "a,b\nc\rd$e", Some("a$kb$nc$rd$$e")),
        v("escape plain", K::Escape, "door-7", Some("door-7")),
    ]
}

/// Parse `input` as `kind` and render it again.
pub fn canonicalize(kind: RecordKind, input: &str) -> Result<String, String> {
    fn round<T>(input: &str) -> Result<String, String>
    where
        T: std::str::FromStr + std::fmt::Display,
        T::Err: std::fmt::Display,
    {
        input
            .parse::<T>()
            .map(|record| record.to_string())
            .map_err(|e| e.to_string())
    }

    match kind {
        RecordKind::RangeSet => round::<SortedRangeSet>(input),
        RecordKind::Event => round::<Event>(input),
        RecordKind::Descriptor => round::<Descriptor>(input),
        RecordKind::LowestId => round::<LowestId>(input),
        RecordKind::Listing => round::<RepositoryListing>(input),
        RecordKind::Escape => Ok(encode(input)),
    }
}

/// Check every vector; returns a description of each mismatch.
pub fn verify_all_vectors() -> Vec<String> {
    let mut failures = Vec::new();
    for vector in all_vectors() {
        match (canonicalize(vector.kind, vector.input), vector.canonical) {
            (Ok(got), Some(expected)) if got == expected => {}
            (Err(_), None) => {}
            (Ok(got), Some(expected)) => failures.push(format!(
                "{}: expected {:?}, got {:?}",
                vector.name, expected, got
            )),
            (Ok(got), None) => failures.push(format!("{}: accepted as {:?}", vector.name, got)),
            (Err(e), Some(_)) => failures.push(format!("{}: rejected: {}", vector.name, e)),
        }
    }
    failures
}

/// All vectors as pretty JSON, for other implementations to consume.
pub fn vectors_json() -> serde_json::Result<String> {
    serde_json::to_string_pretty(&all_vectors())
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::codec::decode;

    #[test]
    fn test_all_vectors_verify() {
        let failures = verify_all_vectors();
        assert!(failures.is_empty(), "vector failures: {:#?}", failures);
    }

    #[test]
    fn test_canonical_forms_are_fixed_points() {
        for vector in all_vectors() {
            let Some(canonical) = vector.canonical else {
                continue;
            };
            if vector.kind == RecordKind::Escape {
                assert_eq!(decode(canonical).unwrap(), vector.input, "{}", vector.name);
                continue;
            }
            assert_eq!(
                canonicalize(vector.kind, canonical).unwrap(),
                canonical,
                "{}",
                vector.name
            );
        }
    }

    #[test]
    fn test_vector_names_unique() {
        let vectors = all_vectors();
        let mut names: Vec<_> = vectors.iter().map(|v| v.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), vectors.len());
    }

    #[test]
    fn test_vectors_json() {
        let json = vectors_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), all_vectors().len());
        assert_eq!(parsed[0]["kind"], "range_set");
        assert!(parsed[7]["canonical"].is_null());
    }
}
