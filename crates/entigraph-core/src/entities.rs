//! # Entities Store
//!
//! Owner of the snapshot. The only legal mutators are:
//! - `merge` (raw payloads, through the normalizer)
//! - `reset` (explicit store action)
//! - GC removal (crate-private, driven by `GarbageCollector`)
//!
//! Reads hand out `Entity` views that borrow the store. A view resolves its
//! relations by looking keys up in the store it borrows; it never owns or
//! prolongs the life of any record. Domain types that outlive the borrow
//! implement `Model` and keep an `EntityRef` instead.

use crate::clock::{Clock, SystemClock};
use crate::normalizer::{NormalizedEntry, Normalizer};
use crate::notify::{ChangeEvent, ChangeFeed, SubscriptionId};
use crate::schema::{Cardinality, SchemaRegistry};
use crate::snapshot::{Record, Snapshot};
use crate::{EntigraphError, EntityId, EntityRef, FieldValue, Meta, TypeKey};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

// =============================================================================
// MERGE REPORT
// =============================================================================

/// Outcome of one `merge` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Ids of the top-level records of the payload, in payload order.
    pub ids: Vec<EntityId>,
    /// Every record written (nested ones included), in write order.
    pub written: Vec<EntityRef>,
    /// Raw records skipped as data errors.
    pub skipped: usize,
}

// =============================================================================
// ENTITY VIEW
// =============================================================================

/// A hydrated record: read-only view borrowing the store.
#[derive(Clone)]
pub struct Entity<'a> {
    store: &'a EntitiesStore,
    key: EntityRef,
    record: &'a Record,
}

impl fmt::Debug for Entity<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("key", &self.key)
            .field("record", self.record)
            .finish_non_exhaustive()
    }
}

impl<'a> Entity<'a> {
    /// The `(typeKey, id)` of this record.
    #[must_use]
    pub fn key(&self) -> &EntityRef {
        &self.key
    }

    /// The type key.
    #[must_use]
    pub fn type_key(&self) -> &TypeKey {
        &self.key.type_key
    }

    /// The id.
    #[must_use]
    pub fn id(&self) -> &EntityId {
        &self.key.id
    }

    /// Read a plain field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'a FieldValue> {
        self.record.get(field)
    }

    /// Read a text field.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&'a str> {
        self.record.get(field).and_then(FieldValue::as_str)
    }

    /// Record metadata.
    #[must_use]
    pub fn meta(&self) -> Option<&'a Meta> {
        self.record.meta()
    }

    /// The underlying normalized record.
    #[must_use]
    pub fn record(&self) -> &'a Record {
        self.record
    }

    /// Resolve a cardinality-one relation. `None` when the relation is not
    /// declared, the reference is empty, or the target is not in the store.
    #[must_use]
    pub fn one(&self, relation: &str) -> Option<Entity<'a>> {
        let schema = self.store.registry.get(&self.key.type_key)?;
        let rel = schema.relation_for(relation)?;
        if rel.cardinality != Cardinality::One {
            return None;
        }
        let id = EntityId::from_field(self.record.get(&rel.reference_field(relation))?)?;
        self.store.get(&EntityRef {
            type_key: rel.target.clone(),
            id,
        })
    }

    /// Resolve a cardinality-many relation, skipping ids that are not in the
    /// store.
    #[must_use]
    pub fn many(&self, relation: &str) -> Vec<Entity<'a>> {
        let Some(rel) = self
            .store
            .registry
            .get(&self.key.type_key)
            .and_then(|schema| schema.relation_for(relation))
        else {
            return Vec::new();
        };
        if rel.cardinality != Cardinality::Many {
            return Vec::new();
        }
        match self.record.get(&rel.reference_field(relation)) {
            Some(FieldValue::List(ids)) => ids
                .iter()
                .filter_map(EntityId::from_field)
                .filter_map(|id| {
                    self.store.get(&EntityRef {
                        type_key: rel.target.clone(),
                        id,
                    })
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Wire form of the record.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        self.record.to_json()
    }
}

/// A domain type hydrated from an entity view.
///
/// Implementors pick the fields they need and keep `EntityRef`s (not views)
/// for relations they want to resolve later.
pub trait Model: Sized {
    /// Type key this model hydrates from.
    const TYPE_KEY: &'static str;

    /// Build the model, or `None` if the record lacks required fields.
    fn hydrate(entity: &Entity<'_>) -> Option<Self>;
}

// =============================================================================
// STORE
// =============================================================================

/// How a write stamps record metadata.
enum Stamp {
    /// A live merge at `now`.
    Merge(u64),
    /// A restore: keep the stored metadata as-is.
    Preserve(Option<Meta>),
}

/// The normalized entity store.
pub struct EntitiesStore {
    registry: SchemaRegistry,
    snapshot: Snapshot,
    clock: Rc<dyn Clock>,
    feed: ChangeFeed,
    revision: u64,
}

impl fmt::Debug for EntitiesStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitiesStore")
            .field("types", &self.registry.len())
            .field("records", &self.snapshot.len())
            .field("revision", &self.revision)
            .finish_non_exhaustive()
    }
}

impl EntitiesStore {
    /// Create a store reading wall-clock time.
    pub fn new(registry: SchemaRegistry) -> Result<Self, EntigraphError> {
        Self::with_clock(registry, SystemClock)
    }

    /// Create a store with an explicit clock.
    ///
    /// The registry is validated here; a store never holds a registry with
    /// dangling relation targets.
    pub fn with_clock(
        registry: SchemaRegistry,
        clock: impl Clock + 'static,
    ) -> Result<Self, EntigraphError> {
        registry.validate()?;
        Ok(Self {
            registry,
            snapshot: Snapshot::new(),
            clock: Rc::new(clock),
            feed: ChangeFeed::new(),
            revision: 0,
        })
    }

    // =========================================================================
    // MERGE
    // =========================================================================

    /// Normalize `payload` as `type_key` and merge every resulting record.
    pub fn merge(
        &mut self,
        type_key: impl Into<TypeKey>,
        payload: &serde_json::Value,
    ) -> Result<MergeReport, EntigraphError> {
        let type_key = type_key.into();
        let normalized = Normalizer::new(&self.registry).normalize(&type_key, payload)?;
        let now = self.now();

        let written = self.write(
            normalized
                .entries
                .into_iter()
                .map(|entry| (entry, Stamp::Merge(now))),
        );

        Ok(MergeReport {
            ids: normalized.ids,
            written,
            skipped: normalized.skipped,
        })
    }

    /// Re-insert already-normalized records of one bucket, preserving their
    /// stored metadata. Used by the persistence restore path.
    pub(crate) fn merge_restored(
        &mut self,
        type_key: &TypeKey,
        records: Vec<(EntityId, BTreeMap<String, FieldValue>, Option<Meta>)>,
    ) -> Result<usize, EntigraphError> {
        self.registry.require(type_key)?;
        let written = self.write(records.into_iter().map(|(id, fields, meta)| {
            (
                NormalizedEntry {
                    key: EntityRef {
                        type_key: type_key.clone(),
                        id,
                    },
                    fields,
                },
                Stamp::Preserve(meta),
            )
        }));
        Ok(written.len())
    }

    /// The single write path shared by live merges and restores.
    fn write(
        &mut self,
        entries: impl IntoIterator<Item = (NormalizedEntry, Stamp)>,
    ) -> Vec<EntityRef> {
        let mut written = Vec::new();
        for (entry, stamp) in entries {
            let bucket = self.snapshot.bucket_mut(&entry.key.type_key);
            match stamp {
                Stamp::Merge(now) => bucket.upsert(entry.key.id.clone(), entry.fields, |prev| {
                    Some(match prev {
                        Some(meta) => Meta {
                            created_at: meta.created_at,
                            updated_at: now,
                            accessed_at: now,
                        },
                        None => Meta::at(now),
                    })
                }),
                Stamp::Preserve(meta) => bucket.upsert(entry.key.id.clone(), entry.fields, |_| meta),
            }
            written.push(entry.key);
        }

        if !written.is_empty() {
            self.bump();
            self.feed.emit(&ChangeEvent::Merged(written.clone()));
        }
        written
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Hydrate a record, or `None` if it was evicted or never existed.
    #[must_use]
    pub fn get(&self, key: &EntityRef) -> Option<Entity<'_>> {
        let record = self.snapshot.get_ref(key)?;
        Some(Entity {
            store: self,
            key: key.clone(),
            record,
        })
    }

    /// Hydrate a record by type key and id.
    #[must_use]
    pub fn get_entity(&self, type_key: &str, id: &str) -> Option<Entity<'_>> {
        self.get(&EntityRef::new(type_key, id))
    }

    /// Hydrate a domain model.
    #[must_use]
    pub fn get_model<M: Model>(&self, id: &str) -> Option<M> {
        M::hydrate(&self.get_entity(M::TYPE_KEY, id)?)
    }

    /// Refresh `accessedAt` for a record. Returns `false` if it is absent.
    pub fn touch(&mut self, key: &EntityRef) -> bool {
        let now = self.now();
        let touched = self
            .snapshot
            .bucket(&key.type_key)
            .is_some_and(|bucket| bucket.contains(&key.id))
            && self.snapshot.bucket_mut(&key.type_key).touch(&key.id, now);
        if touched {
            self.bump();
        }
        touched
    }

    /// Refresh `accessedAt` and hydrate: a read that counts for GC.
    pub fn access(&mut self, key: &EntityRef) -> Option<Entity<'_>> {
        if self.touch(key) {
            self.get(key)
        } else {
            None
        }
    }

    /// Check if a record exists.
    #[must_use]
    pub fn contains(&self, key: &EntityRef) -> bool {
        self.snapshot.contains(key)
    }

    /// Read-only access to the snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// The schema registry.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot.len()
    }

    /// Check if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_empty()
    }

    /// Current logical time.
    #[must_use]
    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    // =========================================================================
    // REMOVAL
    // =========================================================================

    /// Drop every record.
    pub fn reset(&mut self) {
        self.snapshot.clear();
        self.bump();
        self.feed.emit(&ChangeEvent::Reset);
    }

    /// Remove records by key. Absent keys are ignored.
    pub(crate) fn remove(&mut self, keys: impl IntoIterator<Item = EntityRef>) -> Vec<EntityRef> {
        let removed: Vec<EntityRef> = keys
            .into_iter()
            .filter(|key| self.snapshot.remove(key).is_some())
            .collect();
        if !removed.is_empty() {
            self.bump();
            self.feed.emit(&ChangeEvent::Removed(removed.clone()));
        }
        removed
    }

    // =========================================================================
    // SUBSCRIPTIONS
    // =========================================================================

    /// Receive every change event.
    pub fn subscribe(&mut self, callback: impl FnMut(&ChangeEvent) + 'static) -> SubscriptionId {
        self.feed.subscribe(callback)
    }

    /// Receive change events touching any of `keys`.
    pub fn watch(
        &mut self,
        keys: impl IntoIterator<Item = EntityRef>,
        callback: impl FnMut(&ChangeEvent) + 'static,
    ) -> SubscriptionId {
        self.feed.watch(keys, callback)
    }

    /// Stop a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.feed.unsubscribe(id)
    }

    fn bump(&mut self) {
        self.revision = self.revision.saturating_add(1);
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
    use std::cell::RefCell;

    fn store(clock: &ManualClock) -> EntitiesStore {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("post")
                .one("viewer", "viewer")
                .many("comments", "comment"),
            Schema::new("viewer").many("posts", "post"),
            Schema::new("comment"),
        ])
        .expect("registry");
        EntitiesStore::with_clock(registry, clock.clone()).expect("store")
    }

    #[derive(Debug, PartialEq)]
    struct Viewer {
        key: EntityRef,
        name: String,
    }

    impl Model for Viewer {
        const TYPE_KEY: &'static str = "viewer";

        fn hydrate(entity: &Entity<'_>) -> Option<Self> {
            Some(Self {
                key: entity.key().clone(),
                name: entity.text("name")?.to_string(),
            })
        }
    }

    #[test]
    fn merge_normalizes_and_hydrates_relations() {
        let clock = ManualClock::new(100);
        let mut store = store(&clock);

        let report = store
            .merge(
                "post",
                &json!({"id": "101", "viewer": {"id": "10", "name": "Anna"}}),
            )
            .expect("merge");
        assert_eq!(report.ids, vec![EntityId::from("101")]);
        assert_eq!(report.written.len(), 2);

        let post = store.get_entity("post", "101").expect("post");
        assert_eq!(post.text("viewerId"), Some("10"));
        assert_eq!(post.get("viewer"), None);

        let viewer = post.one("viewer").expect("viewer resolves");
        assert_eq!(viewer.key(), &EntityRef::new("viewer", "10"));
        assert_eq!(viewer.text("name"), Some("Anna"));
    }

    #[test]
    fn merge_shallow_merges_and_stamps_meta() {
        let clock = ManualClock::new(100);
        let mut store = store(&clock);
        store
            .merge("viewer", &json!({"id": 10, "name": "Anna", "bio": "hi"}))
            .expect("merge");
        clock.set(250);
        store
            .merge("viewer", &json!({"id": "10", "name": "Anna K"}))
            .expect("merge");

        let viewer = store.get_entity("viewer", "10").expect("viewer");
        assert_eq!(viewer.text("name"), Some("Anna K"));
        assert_eq!(viewer.text("bio"), Some("hi"));
        assert_eq!(
            viewer.meta().copied(),
            Some(Meta {
                created_at: 100,
                updated_at: 250,
                accessed_at: 250
            })
        );
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn many_relation_skips_missing_targets() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("post", &json!({"id": 1, "comments": [{"id": 7}, 8]}))
            .expect("merge");

        let post = store.get_entity("post", "1").expect("post");
        let comments: Vec<_> = post.many("comments").iter().map(|c| c.id().clone()).collect();
        assert_eq!(comments, vec![EntityId::from("7")]);
        assert!(post.one("comments").is_none());
        assert!(post.many("viewer").is_empty());
    }

    #[test]
    fn missing_records_are_not_found() {
        let clock = ManualClock::new(0);
        let store = store(&clock);
        assert!(store.get_entity("post", "nope").is_none());
        assert!(store.get_entity("ghost-type", "1").is_none());
        assert!(store.get_model::<Viewer>("1").is_none());
    }

    #[test]
    fn models_hold_keys_not_records() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        store
            .merge("viewer", &json!({"id": 3, "name": "Ben"}))
            .expect("merge");

        let viewer: Viewer = store.get_model("3").expect("model");
        assert_eq!(viewer.name, "Ben");

        store.reset();
        assert!(store.get(&viewer.key).is_none());
    }

    #[test]
    fn access_refreshes_accessed_at_only() {
        let clock = ManualClock::new(10);
        let mut store = store(&clock);
        store.merge("comment", &json!({"id": 1})).expect("merge");
        clock.set(90);

        let key = EntityRef::new("comment", "1");
        let meta = store.access(&key).and_then(|e| e.meta().copied());
        assert_eq!(
            meta,
            Some(Meta {
                created_at: 10,
                updated_at: 10,
                accessed_at: 90
            })
        );
        assert!(!store.touch(&EntityRef::new("comment", "2")));
    }

    #[test]
    fn mutations_notify_subscribers_and_bump_revision() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&events);
        store.subscribe(move |event| sink.borrow_mut().push(event.clone()));

        let before = store.revision();
        store
            .merge("post", &json!({"id": 1, "viewer": 2}))
            .expect("merge");
        store.remove([EntityRef::new("post", "1"), EntityRef::new("post", "9")]);
        store.reset();

        assert!(store.revision() > before);
        let events = events.borrow();
        assert_eq!(
            events[0],
            ChangeEvent::Merged(vec![EntityRef::new("post", "1")])
        );
        assert_eq!(
            events[1],
            ChangeEvent::Removed(vec![EntityRef::new("post", "1")])
        );
        assert_eq!(events[2], ChangeEvent::Reset);
    }

    #[test]
    fn unknown_type_is_a_configuration_error() {
        let clock = ManualClock::new(0);
        let mut store = store(&clock);
        assert!(matches!(
            store.merge("ghost", &json!({"id": 1})),
            Err(EntigraphError::UnknownType(_))
        ));
    }
}
