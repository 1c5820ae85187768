//! # GC Analyzer
//!
//! TTL and LRU selection per bucket. Both are read-only over the snapshot
//! and independent of the reference graph; the orchestrator removes what
//! they select.

use super::config::GcConfig;
use crate::snapshot::Snapshot;
use crate::IdsByType;

/// Bucket-local eviction analysis.
pub struct Analyzer;

impl Analyzer {
    /// Records whose `accessedAt` is strictly older than `now - ttl`.
    ///
    /// A record without metadata is always expired. When `now < ttl` nothing
    /// with metadata can be expired yet.
    #[must_use]
    pub fn expired(snapshot: &Snapshot, config: &GcConfig, now: u64) -> IdsByType {
        let mut out = IdsByType::new();
        for (type_key, bucket) in snapshot.buckets() {
            let cutoff = now.checked_sub(config.policy_for(type_key).ttl_ms);
            let ids: std::collections::BTreeSet<_> = bucket
                .iter()
                .filter(|(_, record)| match (record.meta(), cutoff) {
                    (None, _) => true,
                    (Some(meta), Some(cutoff)) => meta.accessed_at < cutoff,
                    (Some(_), None) => false,
                })
                .map(|(id, _)| id.clone())
                .collect();
            if !ids.is_empty() {
                out.insert(type_key.clone(), ids);
            }
        }
        out
    }

    /// The `count - max` least recently accessed records of every bucket
    /// over its limit. Ties break by insertion order; missing metadata sorts
    /// as timestamp 0.
    #[must_use]
    pub fn overflow(snapshot: &Snapshot, config: &GcConfig) -> IdsByType {
        let mut out = IdsByType::new();
        for (type_key, bucket) in snapshot.buckets() {
            let max = config.policy_for(type_key).max;
            let Some(excess) = bucket.len().checked_sub(max).filter(|n| *n > 0) else {
                continue;
            };
            let mut ranked: Vec<_> = bucket.iter().collect();
            ranked.sort_by_key(|(_, record)| (record.accessed_at(), record.seq()));
            out.insert(
                type_key.clone(),
                ranked
                    .into_iter()
                    .take(excess)
                    .map(|(id, _)| id.clone())
                    .collect(),
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::GcPolicy;
    use crate::{EntityId, Meta, TypeKey};
    use std::collections::{BTreeMap, BTreeSet};

    fn snapshot(records: &[(&str, Option<u64>)]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let bucket = snapshot.bucket_mut(&TypeKey::from("post"));
        for (id, accessed) in records {
            let meta = accessed.map(|t| Meta {
                created_at: 0,
                updated_at: 0,
                accessed_at: t,
            });
            bucket.upsert(EntityId::from(*id), BTreeMap::new(), |_| meta);
        }
        snapshot
    }

    fn ids(out: &IdsByType) -> BTreeSet<&str> {
        out.get(&TypeKey::from("post"))
            .map(|ids| ids.iter().map(EntityId::as_str).collect())
            .unwrap_or_default()
    }

    fn config(ttl_ms: u64, max: usize) -> GcConfig {
        GcConfig {
            default: GcPolicy { ttl_ms, max },
            ..GcConfig::default()
        }
    }

    #[test]
    fn ttl_boundary_is_exclusive() {
        let snap = snapshot(&[("edge", Some(900)), ("old", Some(899)), ("none", None)]);
        let expired = Analyzer::expired(&snap, &config(100, 10), 1000);
        assert_eq!(ids(&expired), BTreeSet::from(["old", "none"]));
    }

    #[test]
    fn ttl_longer_than_clock_expires_only_missing_meta() {
        let snap = snapshot(&[("a", Some(0)), ("b", None)]);
        let expired = Analyzer::expired(&snap, &config(5000, 10), 10);
        assert_eq!(ids(&expired), BTreeSet::from(["b"]));
    }

    #[test]
    fn lru_removes_exactly_the_oldest() {
        let snap = snapshot(&[("a", Some(1)), ("b", Some(2)), ("c", Some(3))]);
        let overflow = Analyzer::overflow(&snap, &config(0, 2));
        assert_eq!(ids(&overflow), BTreeSet::from(["a"]));
    }

    #[test]
    fn lru_ties_follow_insertion_order() {
        let snap = snapshot(&[("z", Some(5)), ("y", Some(5)), ("x", None), ("w", Some(9))]);
        let overflow = Analyzer::overflow(&snap, &config(0, 2));
        assert_eq!(ids(&overflow), BTreeSet::from(["x", "z"]));
        assert!(Analyzer::overflow(&snap, &config(0, 4)).is_empty());
    }
}
