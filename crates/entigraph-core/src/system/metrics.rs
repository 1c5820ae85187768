//! # Snapshot Metrics
//!
//! Size and shape of a session: bucket sizes, reference graph shape, and how
//! close each bucket is to its LRU limit.
//!
//! Ratios are fixed-point integers (parts per thousand / percent); no float
//! arithmetic.

use crate::gc::GcConfig;
use crate::graph::{GcGraph, NodeKind};
use crate::session::Session;
use crate::{EntitiesStore, TypeKey};
use serde::Serialize;
use std::collections::BTreeMap;

// =============================================================================
// GRAPH METRICS
// =============================================================================

/// Shape of the entity store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SnapshotMetrics {
    /// Total number of records.
    pub record_count: usize,
    /// Records per bucket.
    pub bucket_sizes: BTreeMap<TypeKey, usize>,
    /// Resolved references (dangling ones excluded).
    pub edge_count: usize,
    pub roots: usize,
    pub internal: usize,
    pub leaves: usize,
    pub isolated: usize,
    /// References per record, in thousandths.
    pub density_per_thousand: u64,
}

impl SnapshotMetrics {
    /// Compute metrics from a store.
    #[must_use]
    pub fn from_store(store: &EntitiesStore) -> Self {
        let graph = GcGraph::build(store.snapshot(), store.registry());
        let kinds = graph.kind_counts();
        let count = |kind: NodeKind| kinds.get(&kind).copied().unwrap_or(0);

        let record_count = store.len();
        let edge_count = graph.edge_count();
        let density_per_thousand = if record_count > 0 {
            (edge_count as u64).saturating_mul(1000) / (record_count as u64)
        } else {
            0
        };

        Self {
            record_count,
            bucket_sizes: store
                .snapshot()
                .buckets()
                .map(|(type_key, bucket)| (type_key.clone(), bucket.len()))
                .collect(),
            edge_count,
            roots: count(NodeKind::Root),
            internal: count(NodeKind::Internal),
            leaves: count(NodeKind::Leaf),
            isolated: count(NodeKind::Isolated),
            density_per_thousand,
        }
    }
}

// =============================================================================
// BUCKET PRESSURE
// =============================================================================

/// How full a bucket is relative to its LRU limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPressure {
    pub records: usize,
    pub max: usize,
    /// `records * 100 / max`, may exceed 100 before an LRU pass.
    pub percent: u64,
}

impl BucketPressure {
    /// Pressure of every non-empty bucket under `config`.
    #[must_use]
    pub fn of(store: &EntitiesStore, config: &GcConfig) -> BTreeMap<TypeKey, Self> {
        store
            .snapshot()
            .buckets()
            .map(|(type_key, bucket)| {
                let max = config.policy_for(type_key).max;
                let records = bucket.len();
                let percent = if max > 0 {
                    (records as u64).saturating_mul(100) / (max as u64)
                } else {
                    u64::from(records > 0).saturating_mul(100)
                };
                (
                    type_key.clone(),
                    Self {
                        records,
                        max,
                        percent,
                    },
                )
            })
            .collect()
    }

    /// Check if the next LRU pass would evict from this bucket.
    #[must_use]
    pub fn is_over(&self) -> bool {
        self.records > self.max
    }
}

// =============================================================================
// SESSION STATUS
// =============================================================================

/// Everything `status` reports about a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub snapshot: SnapshotMetrics,
    pub pressure: BTreeMap<TypeKey, BucketPressure>,
    pub collections: usize,
    pub state_fields: usize,
}

impl SessionStatus {
    #[must_use]
    pub fn from_session(session: &Session, config: &GcConfig) -> Self {
        Self {
            snapshot: SnapshotMetrics::from_store(session.entities()),
            pressure: BucketPressure::of(session.entities(), config),
            collections: session.collections().len(),
            state_fields: session.state().len(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::gc::GcPolicy;
    use crate::schema::{Schema, SchemaRegistry};
    use serde_json::json;

    fn store() -> EntitiesStore {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("post").one("author", "viewer"),
            Schema::new("viewer"),
        ])
        .expect("registry");
        EntitiesStore::with_clock(registry, ManualClock::new(0)).expect("store")
    }

    #[test]
    fn empty_store_metrics() {
        let metrics = SnapshotMetrics::from_store(&store());
        assert_eq!(metrics, SnapshotMetrics::default());
    }

    #[test]
    fn counts_buckets_edges_and_kinds() {
        let mut store = store();
        store
            .merge(
                "post",
                &json!([{"id": 1, "author": {"id": 7}}, {"id": 2, "author": 7}, {"id": 3}]),
            )
            .expect("merge");

        let metrics = SnapshotMetrics::from_store(&store);
        assert_eq!(metrics.record_count, 4);
        assert_eq!(metrics.bucket_sizes.get(&TypeKey::from("post")), Some(&3));
        assert_eq!(metrics.edge_count, 2);
        assert_eq!(metrics.roots, 2);
        assert_eq!(metrics.leaves, 1);
        assert_eq!(metrics.isolated, 1);
        assert_eq!(metrics.density_per_thousand, 500);
    }

    #[test]
    fn pressure_against_policy() {
        let mut store = store();
        store
            .merge("viewer", &json!([{"id": 1}, {"id": 2}, {"id": 3}]))
            .expect("merge");
        let config = GcConfig::default().with_policy("viewer", GcPolicy { ttl_ms: 0, max: 2 });

        let pressure = BucketPressure::of(&store, &config);
        let viewer = pressure.get(&TypeKey::from("viewer")).expect("viewer");
        assert_eq!(viewer.percent, 150);
        assert!(viewer.is_over());
    }
}
