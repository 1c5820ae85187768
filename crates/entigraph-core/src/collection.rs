//! # Entity Collections
//!
//! Ordered, paginated lists of ids over one type key.
//!
//! A collection stores only ids. Records are looked up in the
//! `EntitiesStore` on every `list`, so an id evicted by GC simply disappears
//! from the hydrated list while its slot in `items` is kept. GC never touches
//! collection order or pagination.

use crate::entities::{EntitiesStore, Entity};
use crate::{EntigraphError, EntityId, EntityRef, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Serializable state of a collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    pub items: Vec<EntityId>,
    /// Page size. 0 means unpaged.
    pub limit: u32,
    pub has_no_more: bool,
    pub reversed: bool,
    /// Pages loaded so far. 0 before the first `set`.
    pub page_number: u32,
}

impl CollectionSnapshot {
    /// Empty snapshot with a page size.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// A page is the last one when it is shorter than the page size.
    fn is_last_page(&self, received: usize) -> bool {
        self.limit == 0 || received < self.limit as usize
    }
}

/// Number of raw items in a page payload, counted before normalization so
/// that items skipped for lacking an id still fill the page.
fn page_len(raw: &serde_json::Value) -> usize {
    match raw {
        serde_json::Value::Array(items) => items.len(),
        _ => 1,
    }
}

// =============================================================================
// COLLECTION
// =============================================================================

/// A paginated list of one type key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCollection {
    type_key: TypeKey,
    snapshot: CollectionSnapshot,
    revision: u64,
}

impl EntityCollection {
    /// Create an empty collection.
    #[must_use]
    pub fn new(type_key: impl Into<TypeKey>, limit: u32) -> Self {
        Self {
            type_key: type_key.into(),
            snapshot: CollectionSnapshot::with_limit(limit),
            revision: 0,
        }
    }

    /// Newest-first collection: `list` reads items back to front.
    #[must_use]
    pub fn reversed(mut self) -> Self {
        self.snapshot.reversed = true;
        self
    }

    /// Replace the items with the first page of a raw payload.
    pub fn set(
        &mut self,
        store: &mut EntitiesStore,
        raw: &serde_json::Value,
    ) -> Result<&CollectionSnapshot, EntigraphError> {
        let ids = store.merge(self.type_key.clone(), raw)?.ids;
        self.snapshot.has_no_more = self.snapshot.is_last_page(page_len(raw));
        self.snapshot.items = dedup(ids);
        self.snapshot.page_number = 1;
        self.bump();
        Ok(&self.snapshot)
    }

    /// Add the next page at the end. Ids already listed keep their slot.
    pub fn append(
        &mut self,
        store: &mut EntitiesStore,
        raw: &serde_json::Value,
    ) -> Result<&CollectionSnapshot, EntigraphError> {
        let ids = store.merge(self.type_key.clone(), raw)?.ids;
        self.snapshot.has_no_more = self.snapshot.is_last_page(page_len(raw));
        let fresh = self.fresh(ids);
        self.snapshot.items.extend(fresh);
        self.snapshot.page_number = self.snapshot.page_number.saturating_add(1);
        self.bump();
        Ok(&self.snapshot)
    }

    /// Add new items at the front, in payload order. Pagination is unchanged.
    pub fn prepend(
        &mut self,
        store: &mut EntitiesStore,
        raw: &serde_json::Value,
    ) -> Result<&CollectionSnapshot, EntigraphError> {
        let ids = store.merge(self.type_key.clone(), raw)?.ids;
        let mut items = self.fresh(ids);
        items.append(&mut self.snapshot.items);
        self.snapshot.items = items;
        self.bump();
        Ok(&self.snapshot)
    }

    /// Drop all items and pagination progress. Records stay in the store.
    pub fn reset(&mut self) {
        self.snapshot.items.clear();
        self.snapshot.page_number = 0;
        self.snapshot.has_no_more = false;
        self.bump();
    }

    /// Hydrated items in read order. Ids missing from the store are skipped.
    #[must_use]
    pub fn list<'a>(&self, store: &'a EntitiesStore) -> Vec<Entity<'a>> {
        let hydrate = |id: &EntityId| {
            store.get(&EntityRef {
                type_key: self.type_key.clone(),
                id: id.clone(),
            })
        };
        if self.snapshot.reversed {
            self.snapshot.items.iter().rev().filter_map(hydrate).collect()
        } else {
            self.snapshot.items.iter().filter_map(hydrate).collect()
        }
    }

    /// The item type key.
    #[must_use]
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Ids in stored order, including ids no longer in the store.
    #[must_use]
    pub fn items(&self) -> &[EntityId] {
        &self.snapshot.items
    }

    #[must_use]
    pub fn has_no_more(&self) -> bool {
        self.snapshot.has_no_more
    }

    #[must_use]
    pub fn page_number(&self) -> u32 {
        self.snapshot.page_number
    }

    /// Page to request next.
    #[must_use]
    pub fn next_page(&self) -> u32 {
        self.snapshot.page_number.saturating_add(1)
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.snapshot.limit
    }

    /// Serializable state.
    #[must_use]
    pub fn snapshot(&self) -> &CollectionSnapshot {
        &self.snapshot
    }

    /// Replace the state with a restored snapshot.
    pub fn restore(&mut self, snapshot: CollectionSnapshot) {
        self.snapshot = snapshot;
        self.bump();
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Ids of `ids` not yet listed, deduplicated in first-seen order.
    fn fresh(&self, ids: Vec<EntityId>) -> Vec<EntityId> {
        let listed: BTreeSet<&EntityId> = self.snapshot.items.iter().collect();
        dedup(ids)
            .into_iter()
            .filter(|id| !listed.contains(id))
            .collect()
    }

    fn bump(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }
}

fn dedup(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = BTreeSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Identity of a collection: a name plus an optional group (one list per
/// filter, per parent, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    pub name: String,
    pub group: Option<String>,
}

impl CollectionKey {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: None,
        }
    }

    #[must_use]
    pub fn grouped(name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: Some(group.into()),
        }
    }
}

impl std::fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.group {
            Some(group) => write!(f, "{}[{}]", self.name, group),
            None => write!(f, "{}", self.name),
        }
    }
}

/// All live collections of a session.
#[derive(Debug, Clone, Default)]
pub struct CollectionRegistry {
    collections: BTreeMap<CollectionKey, EntityCollection>,
    structural: u64,
}

impl CollectionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection, replacing any previous one under `key`.
    pub fn insert(&mut self, key: CollectionKey, collection: EntityCollection) {
        let replaced = self.collections.insert(key, collection);
        let carried = replaced.map_or(0, |c| c.revision());
        self.structural = self.structural.saturating_add(carried).saturating_add(1);
    }

    #[must_use]
    pub fn get(&self, key: &CollectionKey) -> Option<&EntityCollection> {
        self.collections.get(key)
    }

    pub fn get_mut(&mut self, key: &CollectionKey) -> Option<&mut EntityCollection> {
        self.collections.get_mut(key)
    }

    /// Get a collection, creating an empty one of `type_key` if absent.
    ///
    /// # Errors
    ///
    /// `InvalidConfig` if a collection already exists under `key` with a
    /// different type key.
    pub fn get_or_insert(
        &mut self,
        key: CollectionKey,
        type_key: impl Into<TypeKey>,
        limit: u32,
    ) -> Result<&mut EntityCollection, EntigraphError> {
        let type_key = type_key.into();
        if let Some(existing) = self.collections.get(&key) {
            if existing.type_key != type_key {
                return Err(EntigraphError::InvalidConfig(format!(
                    "collection {} holds {}, not {}",
                    key, existing.type_key, type_key
                )));
            }
        } else {
            self.structural = self.structural.saturating_add(1);
        }
        Ok(self
            .collections
            .entry(key)
            .or_insert_with(|| EntityCollection::new(type_key, limit)))
    }

    pub fn remove(&mut self, key: &CollectionKey) -> Option<EntityCollection> {
        let removed = self.collections.remove(key);
        if let Some(collection) = &removed {
            // Carry the removed revision so the total never goes back.
            self.structural = self
                .structural
                .saturating_add(collection.revision())
                .saturating_add(1);
        }
        removed
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CollectionKey, &EntityCollection)> {
        self.collections.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collections.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Reset every collection.
    pub fn reset_all(&mut self) {
        for collection in self.collections.values_mut() {
            collection.reset();
        }
    }

    /// Changes whenever a collection is added, removed or mutated.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.collections
            .values()
            .fold(self.structural, |acc, c| acc.saturating_add(c.revision()))
    }
}

// =============================================================================
// TESTS
// =============================================================================
