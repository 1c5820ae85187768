//! # GC Graph
//!
//! The derived reference graph the garbage collector walks.
//!
//! Nodes are keyed by `(typeKey, id)` in a `BTreeMap` arena; edges are held
//! on both ends as ordered key sets, so edge lists are deduplicated by
//! construction and iteration is deterministic. The graph is rebuilt from a
//! snapshot for every pass and never stored.

use crate::schema::{Cardinality, SchemaRegistry};
use crate::snapshot::{Record, Snapshot};
use crate::{EntityId, EntityRef, FieldValue, Meta};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// NODE
// =============================================================================

/// Structural role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    /// No parents, at least one child.
    Root,
    /// At least one parent and one child.
    Internal,
    /// At least one parent, no children.
    Leaf,
    /// No parents, no children. Always unreachable.
    Isolated,
}

impl NodeKind {
    fn classify(parents: usize, children: usize) -> Self {
        match (parents, children) {
            (0, 0) => Self::Isolated,
            (0, _) => Self::Root,
            (_, 0) => Self::Leaf,
            _ => Self::Internal,
        }
    }
}

/// One record in the reference graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcNode {
    pub parents: BTreeSet<EntityRef>,
    pub children: BTreeSet<EntityRef>,
    pub kind: NodeKind,
    pub meta: Option<Meta>,
}

// =============================================================================
// GRAPH
// =============================================================================

/// Parent/child graph over every record of a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcGraph {
    nodes: BTreeMap<EntityRef, GcNode>,
}

impl GcGraph {
    /// Build the graph of `snapshot`.
    ///
    /// For each record, every `<relation>Id` / `<relation>Ids` field declared
    /// by its schema becomes an edge `record -> target` plus the back edge.
    /// References to records absent from the snapshot are dropped. Buckets
    /// without a schema contribute nodes but no edges.
    #[must_use]
    pub fn build(snapshot: &Snapshot, registry: &SchemaRegistry) -> Self {
        let mut nodes: BTreeMap<EntityRef, GcNode> = snapshot
            .records()
            .map(|(key, record)| {
                (
                    key,
                    GcNode {
                        parents: BTreeSet::new(),
                        children: BTreeSet::new(),
                        kind: NodeKind::Isolated,
                        meta: record.meta().copied(),
                    },
                )
            })
            .collect();

        let mut edges: Vec<(EntityRef, EntityRef)> = Vec::new();
        for (type_key, bucket) in snapshot.buckets() {
            let Some(schema) = registry.get(type_key) else {
                tracing::warn!(type_key = %type_key, "bucket has no schema, building no edges");
                continue;
            };
            for (id, record) in bucket.iter() {
                let from = EntityRef {
                    type_key: type_key.clone(),
                    id: id.clone(),
                };
                for (relation, rel) in schema.relations() {
                    let field = rel.reference_field(relation);
                    for target_id in references(record, &field, rel.cardinality) {
                        let to = EntityRef {
                            type_key: rel.target.clone(),
                            id: target_id,
                        };
                        if nodes.contains_key(&to) {
                            edges.push((from.clone(), to));
                        }
                    }
                }
            }
        }

        for (from, to) in edges {
            if let Some(node) = nodes.get_mut(&to) {
                node.parents.insert(from.clone());
            }
            if let Some(node) = nodes.get_mut(&from) {
                node.children.insert(to);
            }
        }

        for node in nodes.values_mut() {
            node.kind = NodeKind::classify(node.parents.len(), node.children.len());
        }

        Self { nodes }
    }

    /// Get a node.
    #[must_use]
    pub fn node(&self, key: &EntityRef) -> Option<&GcNode> {
        self.nodes.get(key)
    }

    /// All nodes in key order.
    pub fn nodes(&self) -> impl Iterator<Item = (&EntityRef, &GcNode)> {
        self.nodes.iter()
    }

    /// Nodes classified as roots, in key order.
    pub fn roots(&self) -> impl Iterator<Item = &EntityRef> {
        self.nodes_of(NodeKind::Root)
    }

    /// Nodes of one kind, in key order.
    pub fn nodes_of(&self, kind: NodeKind) -> impl Iterator<Item = &EntityRef> {
        self.nodes
            .iter()
            .filter(move |(_, node)| node.kind == kind)
            .map(|(key, _)| key)
    }

    /// Every edge `(parent, child)` in deterministic order.
    pub fn edges(&self) -> impl Iterator<Item = (&EntityRef, &EntityRef)> {
        self.nodes
            .iter()
            .flat_map(|(from, node)| node.children.iter().map(move |to| (from, to)))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.children.len()).sum()
    }

    /// Node count per kind.
    #[must_use]
    pub fn kind_counts(&self) -> BTreeMap<NodeKind, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.kind).or_insert(0usize) += 1;
        }
        counts
    }
}

/// Ids referenced by one relation field of a record.
fn references(record: &Record, field: &str, cardinality: Cardinality) -> Vec<EntityId> {
    match (cardinality, record.get(field)) {
        (Cardinality::One, Some(value)) => EntityId::from_field(value).into_iter().collect(),
        (Cardinality::Many, Some(FieldValue::List(ids))) => {
            ids.iter().filter_map(EntityId::from_field).collect()
        }
        _ => Vec::new(),
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::entities::EntitiesStore;
    use crate::schema::Schema;
    use serde_json::json;

    fn store() -> EntitiesStore {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("feed").many("posts", "post"),
            Schema::new("post")
                .one("author", "viewer")
                .many("comments", "comment"),
            Schema::new("viewer"),
            Schema::new("comment").one("author", "viewer"),
            Schema::new("node").one("parent", "node").one("child", "node"),
        ])
        .expect("registry");
        EntitiesStore::with_clock(registry, ManualClock::new(0)).expect("store")
    }

    fn build(store: &EntitiesStore) -> GcGraph {
        GcGraph::build(store.snapshot(), store.registry())
    }

    #[test]
    fn classifies_every_kind() {
        let mut store = store();
        store
            .merge(
                "feed",
                &json!({"id": "home", "posts": [{"id": 1, "author": {"id": 10}}]}),
            )
            .expect("merge");
        store.merge("comment", &json!({"id": 99})).expect("merge");

        let graph = build(&store);
        let kind = |t: &str, i: &str| graph.node(&EntityRef::new(t, i)).map(|n| n.kind);
        assert_eq!(kind("feed", "home"), Some(NodeKind::Root));
        assert_eq!(kind("post", "1"), Some(NodeKind::Internal));
        assert_eq!(kind("viewer", "10"), Some(NodeKind::Leaf));
        assert_eq!(kind("comment", "99"), Some(NodeKind::Isolated));
        assert_eq!(graph.edge_count(), 2);
    }

    #[test]
    fn dangling_references_are_dropped() {
        let mut store = store();
        store
            .merge("post", &json!({"id": 1, "author": 404, "comments": [5, 6]}))
            .expect("merge");
        store.merge("comment", &json!({"id": 6})).expect("merge");

        let graph = build(&store);
        let post = graph.node(&EntityRef::new("post", "1")).expect("post");
        assert_eq!(post.children, BTreeSet::from([EntityRef::new("comment", "6")]));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn shared_children_keep_both_parents() {
        let mut store = store();
        store
            .merge(
                "post",
                &json!([
                    {"id": 1, "author": {"id": 10}, "comments": [{"id": 5, "author": 10}]},
                ]),
            )
            .expect("merge");

        let graph = build(&store);
        let viewer = graph.node(&EntityRef::new("viewer", "10")).expect("viewer");
        assert_eq!(
            viewer.parents,
            BTreeSet::from([EntityRef::new("comment", "5"), EntityRef::new("post", "1")])
        );
    }

    #[test]
    fn two_cycle_is_two_internal_nodes() {
        let mut store = store();
        store
            .merge("node", &json!([{"id": "a", "parent": "b"}, {"id": "b", "child": "a"}]))
            .expect("merge");

        let graph = build(&store);
        assert_eq!(graph.roots().count(), 0);
        assert_eq!(graph.nodes_of(NodeKind::Internal).count(), 2);
        assert_eq!(graph.kind_counts().get(&NodeKind::Internal), Some(&2));
    }
}
