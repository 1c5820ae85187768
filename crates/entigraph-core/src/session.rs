//! # Session Module
//!
//! Session management combining the entity store, its collections and the
//! plain state fields.
//!
//! A session is the unit the persistence runtime observes: its three parts
//! map one-to-one onto the `state`, `collections` and `entities` channels,
//! and each part carries its own revision counter so unchanged channels are
//! never re-encoded.

use crate::clock::Clock;
use crate::collection::{CollectionKey, CollectionRegistry, EntityCollection};
use crate::entities::{EntitiesStore, Entity, MergeReport};
use crate::schema::SchemaRegistry;
use crate::state::StateFields;
use crate::EntigraphError;

/// Per-channel change counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Revisions {
    pub state: u64,
    pub collections: u64,
    pub entities: u64,
}

/// Entities, collections and state of one process.
#[derive(Debug)]
pub struct Session {
    entities: EntitiesStore,
    collections: CollectionRegistry,
    state: StateFields,
}

impl Session {
    /// Create a session reading wall-clock time.
    pub fn new(registry: SchemaRegistry) -> Result<Self, EntigraphError> {
        Ok(Self::with_store(EntitiesStore::new(registry)?))
    }

    /// Create a session with an explicit clock.
    pub fn with_clock(
        registry: SchemaRegistry,
        clock: impl Clock + 'static,
    ) -> Result<Self, EntigraphError> {
        Ok(Self::with_store(EntitiesStore::with_clock(registry, clock)?))
    }

    /// Wrap an existing store.
    #[must_use]
    pub fn with_store(entities: EntitiesStore) -> Self {
        Self {
            entities,
            collections: CollectionRegistry::new(),
            state: StateFields::new(),
        }
    }

    // =========================================================================
    // PARTS
    // =========================================================================

    #[must_use]
    pub fn entities(&self) -> &EntitiesStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntitiesStore {
        &mut self.entities
    }

    #[must_use]
    pub fn collections(&self) -> &CollectionRegistry {
        &self.collections
    }

    pub fn collections_mut(&mut self) -> &mut CollectionRegistry {
        &mut self.collections
    }

    #[must_use]
    pub fn state(&self) -> &StateFields {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut StateFields {
        &mut self.state
    }

    // =========================================================================
    // SHORTCUTS
    // =========================================================================

    /// Merge a raw payload into the entity store.
    pub fn merge(
        &mut self,
        type_key: &str,
        payload: &serde_json::Value,
    ) -> Result<MergeReport, EntigraphError> {
        self.entities.merge(type_key, payload)
    }

    /// Hydrate a record.
    #[must_use]
    pub fn get_entity(&self, type_key: &str, id: &str) -> Option<Entity<'_>> {
        self.entities.get_entity(type_key, id)
    }

    /// Replace a collection's items with a first page, creating the
    /// collection if needed.
    pub fn set_collection(
        &mut self,
        key: CollectionKey,
        type_key: &str,
        limit: u32,
        payload: &serde_json::Value,
    ) -> Result<&EntityCollection, EntigraphError> {
        let collection = self.collections.get_or_insert(key, type_key, limit)?;
        collection.set(&mut self.entities, payload)?;
        Ok(collection)
    }

    /// Append a page to a collection, creating the collection if needed.
    pub fn append_collection(
        &mut self,
        key: CollectionKey,
        type_key: &str,
        limit: u32,
        payload: &serde_json::Value,
    ) -> Result<&EntityCollection, EntigraphError> {
        let collection = self.collections.get_or_insert(key, type_key, limit)?;
        collection.append(&mut self.entities, payload)?;
        Ok(collection)
    }

    /// Put new items at the front of a collection, creating the collection
    /// if needed.
    pub fn prepend_collection(
        &mut self,
        key: CollectionKey,
        type_key: &str,
        limit: u32,
        payload: &serde_json::Value,
    ) -> Result<&EntityCollection, EntigraphError> {
        let collection = self.collections.get_or_insert(key, type_key, limit)?;
        collection.prepend(&mut self.entities, payload)?;
        Ok(collection)
    }

    /// Hydrated items of a collection. Empty when the collection is unknown.
    #[must_use]
    pub fn list(&self, key: &CollectionKey) -> Vec<Entity<'_>> {
        self.collections
            .get(key)
            .map(|c| c.list(&self.entities))
            .unwrap_or_default()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Current change counters.
    #[must_use]
    pub fn revisions(&self) -> Revisions {
        Revisions {
            state: self.state.revision(),
            collections: self.collections.revision(),
            entities: self.entities.revision(),
        }
    }

    /// Drop every record, collection item and state field.
    pub fn reset(&mut self) {
        self.entities.reset();
        self.collections.reset_all();
        self.state.clear();
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

    fn session() -> Session {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("post").one("viewer", "viewer"),
            Schema::new("viewer"),
        ])
        .expect("registry");
        Session::with_clock(registry, ManualClock::new(0)).expect("session")
    }

    #[test]
    fn collection_shortcuts_hydrate_through_store() {
        let mut session = session();
        let feed = CollectionKey::new("feed");
        session
            .set_collection(
                feed.clone(),
                "post",
                20,
                &json!([{"id": 1, "viewer": {"id": 7}}, {"id": 2}]),
            )
            .expect("set");

        let listed = session.list(&feed);
        assert_eq!(listed.len(), 2);
        assert_eq!(
            listed[0].one("viewer").map(|v| v.id().clone()),
            Some(crate::EntityId::from("7"))
        );
        assert!(session.list(&CollectionKey::new("other")).is_empty());
    }

    #[test]
    fn prepend_shortcut_puts_new_items_first() {
        let mut session = session();
        let feed = CollectionKey::new("feed");
        session
            .set_collection(feed.clone(), "post", 20, &json!([{"id": 1}, {"id": 2}]))
            .expect("set");
        let collection = session
            .prepend_collection(feed.clone(), "post", 20, &json!([{"id": 3}, {"id": 2}]))
            .expect("prepend");
        assert_eq!(collection.page_number(), 1);

        let ids: Vec<String> = session
            .list(&feed)
            .iter()
            .map(|e| e.id().as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn shortcut_with_another_type_is_rejected() {
        let mut session = session();
        let feed = CollectionKey::new("feed");
        session
            .set_collection(feed.clone(), "post", 20, &json!([{"id": 1}]))
            .expect("set");

        let result = session.append_collection(feed.clone(), "viewer", 20, &json!([{"id": 9}]));
        assert!(matches!(result, Err(EntigraphError::InvalidConfig(_))));
        assert!(session.get_entity("viewer", "9").is_none());
        assert_eq!(session.list(&feed).len(), 1);
    }

    #[test]
    fn revisions_move_per_channel() {
        let mut session = session();
        let r0 = session.revisions();

        session.state_mut().set("filter", "all");
        let r1 = session.revisions();
        assert!(r1.state > r0.state);
        assert_eq!(r1.entities, r0.entities);

        session.merge("viewer", &json!({"id": 1})).expect("merge");
        let r2 = session.revisions();
        assert!(r2.entities > r1.entities);
        assert_eq!(r2.collections, r1.collections);
    }

    #[test]
    fn reset_clears_every_part() {
        let mut session = session();
        let feed = CollectionKey::new("feed");
        session
            .set_collection(feed.clone(), "post", 0, &json!([{"id": 1}]))
            .expect("set");
        session.state_mut().set("filter", "all");

        session.reset();
        assert!(session.entities().is_empty());
        assert!(session.state().is_empty());
        assert!(session.collections().get(&feed).expect("kept").items().is_empty());
    }
}
