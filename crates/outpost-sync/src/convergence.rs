//! Convergence verification for log sync.
//!
//! After syncing, two stores can check they hold the same logs by
//! comparing deterministic digests instead of shipping their contents.

use std::fmt;

use outpost_core::LogId;
use outpost_store::{LogFilter, LogStore};

use crate::error::Result;

/// Blake3 digest over a store's logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoreDigest(pub [u8; 32]);

impl StoreDigest {
    /// Hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for StoreDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Compute a deterministic digest of every log passing `filter`.
///
/// Algorithm:
/// 1. For each descriptor, in log order: hash its line, then every
///    retained event line in id order
/// 2. Hash every non-zero floor line
/// 3. Return the final hash
///
/// Two stores with equal digests hold byte-identical wire records.
pub async fn store_digest<S: LogStore + ?Sized>(store: &S, filter: &LogFilter) -> Result<StoreDigest> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"outpost-logs-v1:");

    for descriptor in store.descriptors(filter).await? {
        hasher.update(descriptor.to_string().as_bytes());
        hasher.update(b"\n");
        for event in store.get(&descriptor.log_id(), &descriptor.range).await? {
            hasher.update(event.to_string().as_bytes());
            hasher.update(b"\n");
        }
    }

    hasher.update(b"floors:");
    for lowest in store.lowest_ids(filter).await? {
        hasher.update(lowest.to_string().as_bytes());
        hasher.update(b"\n");
    }

    Ok(StoreDigest(*hasher.finalize().as_bytes()))
}

/// Result of convergence verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvergenceResult {
    /// Both stores hold identical logs.
    Converged,
    /// The stores differ (may need more sync rounds).
    NotConverged {
        /// First log whose ids differ, if the difference is in the id sets.
        log: Option<LogId>,
        reason: String,
    },
}

impl ConvergenceResult {
    /// Check if the stores have converged.
    pub fn is_converged(&self) -> bool {
        matches!(self, ConvergenceResult::Converged)
    }
}

/// Compare two stores over `filter`.
///
/// Descriptors are compared first so a mismatch names the log; otherwise
/// the full digests decide.
pub async fn verify_convergence<A, B>(a: &A, b: &B, filter: &LogFilter) -> Result<ConvergenceResult>
where
    A: LogStore + ?Sized,
    B: LogStore + ?Sized,
{
    let left = a.descriptors(filter).await?;
    let right = b.descriptors(filter).await?;

    if let Some((l, r)) = left.iter().zip(&right).find(|(l, r)| l != r) {
        let log = l.log_id().min(r.log_id());
        return Ok(ConvergenceResult::NotConverged {
            reason: format!("descriptor mismatch: {} vs {}", l, r),
            log: Some(log),
        });
    }
    if left.len() != right.len() {
        return Ok(ConvergenceResult::NotConverged {
            log: None,
            reason: format!("log count mismatch: {} vs {}", left.len(), right.len()),
        });
    }

    let (da, db) = (store_digest(a, filter).await?, store_digest(b, filter).await?);
    if da != db {
        return Ok(ConvergenceResult::NotConverged {
            log: None,
            reason: format!("digest mismatch: {} vs {}", da, db),
        });
    }

    Ok(ConvergenceResult::Converged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use outpost_core::Event;
    use outpost_store::{MemoryLogStore, SqliteStore};

    fn events(ids: &[u64]) -> Vec<Event> {
        ids.iter()
            .map(|&id| Event::new("gw", 1, id, 100, 2).with_property("n", id.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_digest_deterministic_across_backends() {
        let memory = MemoryLogStore::new();
        let sqlite = SqliteStore::open_memory().unwrap();
        memory.put(&events(&[3, 1, 2])).await.unwrap();
        LogStore::put(&sqlite, &events(&[1, 2, 3])).await.unwrap();

        let a = store_digest(&memory, &LogFilter::all()).await.unwrap();
        let b = store_digest(&sqlite, &LogFilter::all()).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.to_hex().len(), 64);
    }

    #[tokio::test]
    async fn test_convergence_verified() {
        let a = MemoryLogStore::new();
        let b = MemoryLogStore::new();
        a.put(&events(&[1, 2])).await.unwrap();
        b.put(&events(&[2, 1])).await.unwrap();

        let result = verify_convergence(&a, &b, &LogFilter::all()).await.unwrap();
        assert!(result.is_converged());
    }

    #[tokio::test]
    async fn test_convergence_names_the_log() {
        let a = MemoryLogStore::new();
        let b = MemoryLogStore::new();
        a.put(&events(&[1, 2, 3])).await.unwrap();
        b.put(&events(&[1, 2])).await.unwrap();

        let result = verify_convergence(&a, &b, &LogFilter::all()).await.unwrap();
        assert_eq!(
            result,
            ConvergenceResult::NotConverged {
                log: Some(LogId::new("gw", 1)),
                reason: "descriptor mismatch: gw,1,1-3 vs gw,1,1-2".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_convergence_detects_floor_difference() {
        let a = MemoryLogStore::new();
        let b = MemoryLogStore::new();
        a.put(&events(&[5])).await.unwrap();
        b.put(&events(&[5])).await.unwrap();
        a.set_lowest_id(&LogId::new("gw", 1), 3).await.unwrap();

        let result = verify_convergence(&a, &b, &LogFilter::all()).await.unwrap();
        assert!(!result.is_converged());
    }
}
