//! # Graph Walker
//!
//! Reachability over a `GcGraph`.
//!
//! Depth-first from every root with an explicit stack and a shared visited
//! set: each node is pushed at most once, so a walk is linear in edges and
//! terminates on any cycle. The result is a pure partition of the node set;
//! root visitation order cannot change it.

use crate::graph::{GcGraph, NodeKind};
use crate::{EntityRef, IdsByType};
use std::collections::BTreeSet;

/// Partition of a graph into reachable and unreachable nodes, per bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkResult {
    pub roots: IdsByType,
    /// Every node visited from some root, roots included.
    pub reachable: IdsByType,
    /// Every node not visited, isolated or merely unreached.
    pub unreachable: IdsByType,
    /// Unreachable nodes that still have references (rootless cycles and
    /// what hangs off them).
    pub rootless: BTreeSet<EntityRef>,
}

impl WalkResult {
    /// Check if a node was visited.
    #[must_use]
    pub fn is_reachable(&self, key: &EntityRef) -> bool {
        self.reachable
            .get(&key.type_key)
            .is_some_and(|ids| ids.contains(&key.id))
    }

    /// Unreachable nodes as keys, in key order.
    #[must_use]
    pub fn unreachable_refs(&self) -> Vec<EntityRef> {
        flatten(&self.unreachable)
    }

    /// Unreachable nodes that have no references at all.
    #[must_use]
    pub fn isolated_refs(&self) -> Vec<EntityRef> {
        flatten(&self.unreachable)
            .into_iter()
            .filter(|key| !self.rootless.contains(key))
            .collect()
    }
}

fn flatten(ids: &IdsByType) -> Vec<EntityRef> {
    ids.iter()
        .flat_map(|(type_key, ids)| {
            ids.iter().map(move |id| EntityRef {
                type_key: type_key.clone(),
                id: id.clone(),
            })
        })
        .collect()
}

fn insert(ids: &mut IdsByType, key: &EntityRef) {
    ids.entry(key.type_key.clone())
        .or_default()
        .insert(key.id.clone());
}

/// Reachability analysis.
pub struct GraphWalker;

impl GraphWalker {
    /// Walk `graph` from every root.
    #[must_use]
    pub fn walk(graph: &GcGraph) -> WalkResult {
        let mut visited: BTreeSet<&EntityRef> = BTreeSet::new();
        let mut stack: Vec<&EntityRef> = Vec::new();
        let mut result = WalkResult::default();

        for root in graph.roots() {
            insert(&mut result.roots, root);
            if visited.insert(root) {
                stack.push(root);
            }
            while let Some(current) = stack.pop() {
                let Some(node) = graph.node(current) else {
                    continue;
                };
                for child in &node.children {
                    if visited.insert(child) {
                        stack.push(child);
                    }
                }
            }
        }

        for (key, node) in graph.nodes() {
            if visited.contains(key) {
                insert(&mut result.reachable, key);
            } else {
                insert(&mut result.unreachable, key);
                if node.kind != NodeKind::Isolated {
                    result.rootless.insert(key.clone());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::EntitiesStore;
    use crate::schema::{Schema, SchemaRegistry};
    use serde_json::json;

    fn store() -> EntitiesStore {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("feed").many("items", "node"),
            Schema::new("node").one("parent", "node").one("child", "node"),
        ])
        .expect("registry");
        EntitiesStore::with_clock(registry, ManualClock::new(0)).expect("store")
    }

    fn walk(store: &EntitiesStore) -> WalkResult {
        GraphWalker::walk(&GcGraph::build(store.snapshot(), store.registry()))
    }

    #[test]
    fn rootless_two_cycle_terminates_and_is_unreachable() {
        let mut store = store();
        store
            .merge("node", &json!([{"id": "a", "parent": "b"}, {"id": "b", "child": "a"}]))
            .expect("merge");

        let result = walk(&store);
        assert!(result.roots.is_empty());
        assert_eq!(result.unreachable_refs().len(), 2);
        assert_eq!(result.rootless.len(), 2);
        assert!(result.isolated_refs().is_empty());
    }

    #[test]
    fn cycle_below_a_root_is_reachable() {
        let mut store = store();
        store
            .merge("node", &json!([{"id": "a", "parent": "b"}, {"id": "b", "child": "a"}]))
            .expect("merge");
        store
            .merge("feed", &json!({"id": "home", "items": ["a"]}))
            .expect("merge");
        store.merge("node", &json!({"id": "lonely"})).expect("merge");

        let result = walk(&store);
        assert!(result.is_reachable(&EntityRef::new("node", "a")));
        assert!(result.is_reachable(&EntityRef::new("node", "b")));
        assert!(result.is_reachable(&EntityRef::new("feed", "home")));
        assert_eq!(result.isolated_refs(), vec![EntityRef::new("node", "lonely")]);
        assert!(result.rootless.is_empty());
    }
}
