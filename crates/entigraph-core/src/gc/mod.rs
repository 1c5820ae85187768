//! # Garbage Collector
//!
//! Composes the graph builder, the walker and the analyzer into cleanup
//! passes over an `EntitiesStore`.
//!
//! Every pass first computes its full selection against the snapshot as it
//! is at invocation, then removes the selection in one batch. Collections
//! are never touched: they skip evicted ids on hydration.

mod analyzer;
mod config;
mod walker;

pub use analyzer::Analyzer;
pub use config::{GcConfig, GcPolicy};
pub use walker::{GraphWalker, WalkResult};

use crate::entities::EntitiesStore;
use crate::graph::GcGraph;
use crate::schema::SchemaRegistry;
use crate::{EntigraphError, EntityId, EntityRef, IdsByType, TypeKey};
use serde::Serialize;
use std::collections::BTreeMap;

/// One kind of cleanup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcPass {
    /// Evict records not reachable from a root.
    Graph,
    /// Evict records not accessed within their TTL.
    Ttl,
    /// Trim buckets over their size limit.
    Lru,
}

impl GcPass {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Ttl => "ttl",
            Self::Lru => "lru",
        }
    }
}

/// Records removed by one or more passes, grouped by bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GcReport {
    pub removed: BTreeMap<TypeKey, Vec<EntityId>>,
}

impl GcReport {
    fn from_refs(refs: Vec<EntityRef>) -> Self {
        let mut report = Self::default();
        for key in refs {
            report.removed.entry(key.type_key).or_default().push(key.id);
        }
        report
    }

    /// Total number of removed records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.removed.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty()
    }

    /// Fold another report into this one.
    pub fn merge(&mut self, other: GcReport) {
        for (type_key, ids) in other.removed {
            self.removed.entry(type_key).or_default().extend(ids);
        }
    }
}

/// The GC orchestrator.
#[derive(Debug, Clone, Default)]
pub struct GarbageCollector {
    config: GcConfig,
}

impl GarbageCollector {
    /// Create a collector after checking `config` against the schemas.
    pub fn new(config: GcConfig, registry: &SchemaRegistry) -> Result<Self, EntigraphError> {
        config.validate(registry)?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// What a pass would remove right now, without removing it.
    #[must_use]
    pub fn plan(&self, store: &EntitiesStore, pass: GcPass) -> IdsByType {
        match pass {
            GcPass::Graph => {
                let walk = GraphWalker::walk(&GcGraph::build(store.snapshot(), store.registry()));
                if !walk.rootless.is_empty() {
                    tracing::warn!(
                        count = walk.rootless.len(),
                        evicted = self.config.evict_rootless_cycles,
                        "unreached records still hold references (rootless cycle)"
                    );
                }
                if self.config.evict_rootless_cycles {
                    walk.unreachable
                } else {
                    let mut isolated = IdsByType::new();
                    for key in walk.isolated_refs() {
                        isolated.entry(key.type_key).or_default().insert(key.id);
                    }
                    isolated
                }
            }
            GcPass::Ttl => Analyzer::expired(store.snapshot(), &self.config, store.now()),
            GcPass::Lru => Analyzer::overflow(store.snapshot(), &self.config),
        }
    }

    /// Run one pass.
    pub fn run(&self, store: &mut EntitiesStore, pass: GcPass) -> GcReport {
        let selection = self.plan(store, pass);
        let keys = selection.into_iter().flat_map(|(type_key, ids)| {
            ids.into_iter().map(move |id| EntityRef {
                type_key: type_key.clone(),
                id,
            })
        });
        let report = GcReport::from_refs(store.remove(keys));
        tracing::info!(
            pass = pass.name(),
            removed = report.total(),
            remaining = store.len(),
            "gc pass complete"
        );
        report
    }

    /// Remove unreached records. Records that still hold references, such as
    /// a rootless cycle, are kept unless `evict_rootless_cycles` is set.
    pub fn process_graph(&self, store: &mut EntitiesStore) -> GcReport {
        self.run(store, GcPass::Graph)
    }

    /// Remove every expired record.
    pub fn process_ttl(&self, store: &mut EntitiesStore) -> GcReport {
        self.run(store, GcPass::Ttl)
    }

    /// Trim every bucket over its limit.
    pub fn process_lru(&self, store: &mut EntitiesStore) -> GcReport {
        self.run(store, GcPass::Lru)
    }

    /// Startup cleanup: graph pass, then TTL pass. LRU is not run.
    pub fn run_startup(&self, store: &mut EntitiesStore) -> GcReport {
        let mut report = self.process_graph(store);
        report.merge(self.process_ttl(store));
        report
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::schema::Schema;
    use serde_json::json;

    fn store(clock: &ManualClock) -> EntitiesStore {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("feed").many("posts", "post"),
            Schema::new("post").one("author", "viewer"),
            Schema::new("viewer"),
            Schema::new("node").one("next", "node"),
        ])
        .expect("registry");
        EntitiesStore::with_clock(registry, clock.clone()).expect("store")
    }

    fn gc(store: &EntitiesStore, config: GcConfig) -> GarbageCollector {
        GarbageCollector::new(config, store.registry()).expect("gc")
    }

    #[test]
    fn graph_pass_is_idempotent() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("feed", &json!({"id": "home", "posts": [{"id": 1, "author": {"id": 9}}]}))
            .expect("merge");
        store.merge("viewer", &json!({"id": 2})).expect("merge");
        store
            .merge("node", &json!([{"id": "a", "next": "b"}, {"id": "b", "next": "a"}]))
            .expect("merge");

        let gc = gc(&store, GcConfig::default());
        let first = gc.process_graph(&mut store);
        assert_eq!(first.total(), 1);
        assert!(store.get_entity("viewer", "2").is_none());
        assert!(store.get_entity("node", "a").is_some());
        assert!(store.get_entity("viewer", "9").is_some());

        assert!(gc.process_graph(&mut store).is_empty());
    }

    #[test]
    fn rootless_cycles_are_kept_by_default() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("node", &json!([{"id": "a", "next": "b"}, {"id": "b", "next": "a"}, {"id": "c"}]))
            .expect("merge");

        let report = gc(&store, GcConfig::default()).process_graph(&mut store);
        assert_eq!(report.removed.get(&TypeKey::from("node")), Some(&vec![EntityId::from("c")]));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn startup_keeps_a_rootless_two_cycle() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("node", &json!([{"id": "a", "next": "b"}, {"id": "b", "next": "a"}]))
            .expect("merge");

        let report = gc(&store, GcConfig::default()).run_startup(&mut store);
        assert!(report.is_empty());
        assert_eq!(store.len(), 2);
        assert!(store.get_entity("node", "a").is_some());
        assert!(store.get_entity("node", "b").is_some());
    }

    #[test]
    fn rootless_cycles_can_be_evicted() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("node", &json!([{"id": "a", "next": "b"}, {"id": "b", "next": "a"}, {"id": "c"}]))
            .expect("merge");

        let config = GcConfig {
            evict_rootless_cycles: true,
            ..GcConfig::default()
        };
        let report = gc(&store, config).process_graph(&mut store);
        assert_eq!(report.total(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn startup_runs_graph_then_ttl_without_lru() {
        let clock = ManualClock::new(1_000);
        let mut store = store(&clock);
        store
            .merge(
                "feed",
                &json!({"id": "home", "posts": [{"id": 1}, {"id": 2}, {"id": 3}]}),
            )
            .expect("merge");
        clock.set(5_000);
        store
            .access(&EntityRef::new("post", "2"))
            .expect("post 2");
        store
            .access(&EntityRef::new("feed", "home"))
            .expect("home");

        let config = GcConfig {
            default: GcPolicy {
                ttl_ms: 1_000,
                max: 1,
            },
            ..GcConfig::default()
        };
        let report = gc(&store, config).run_startup(&mut store);

        assert_eq!(
            report.removed.get(&TypeKey::from("post")),
            Some(&vec![EntityId::from("1"), EntityId::from("3")])
        );
        assert!(store.get_entity("post", "2").is_some());
        assert!(store.get_entity("feed", "home").is_some());
    }

    #[test]
    fn lru_pass_trims_to_max() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        for id in 1..=3 {
            clock.advance(1);
            store.merge("viewer", &json!({"id": id})).expect("merge");
        }

        let config = GcConfig::default().with_policy("viewer", GcPolicy { ttl_ms: 0, max: 2 });
        let report = gc(&store, config).process_lru(&mut store);
        assert_eq!(report.total(), 1);
        assert!(store.get_entity("viewer", "1").is_none());
    }
}
