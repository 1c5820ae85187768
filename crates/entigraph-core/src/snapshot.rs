//! # Snapshot
//!
//! The single source of truth: type key -> id -> normalized record.
//!
//! Buckets are `BTreeMap`s keyed by id for deterministic lookup and
//! iteration. Each record also carries an insertion ordinal so policies that
//! need "stable input order" (LRU tie-breaks, persisted bucket order) can
//! recover the order records were first inserted in.

use crate::{EntityId, EntityRef, FieldValue, Meta, TypeKey};
use std::collections::BTreeMap;

// =============================================================================
// RECORD
// =============================================================================

/// A normalized record: plain fields plus metadata.
///
/// Relation fields only ever hold ids (`<relation>Id` / `<relation>Ids`).
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    fields: BTreeMap<String, FieldValue>,
    meta: Option<Meta>,
    seq: u64,
}

impl Record {
    /// Plain fields in deterministic order.
    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    /// Get one field.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Record metadata. `None` only for records restored without metadata.
    #[must_use]
    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    /// Insertion ordinal within the bucket.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Last access timestamp, 0 when metadata is missing.
    #[must_use]
    pub fn accessed_at(&self) -> u64 {
        self.meta.map(|m| m.accessed_at).unwrap_or(0)
    }

    /// Wire form: fields plus `_meta`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut object: serde_json::Map<String, serde_json::Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v)))
            .collect();
        if let Some(meta) = &self.meta {
            object.insert(
                "_meta".to_string(),
                serde_json::json!({
                    "createdAt": meta.created_at,
                    "updatedAt": meta.updated_at,
                    "accessedAt": meta.accessed_at,
                }),
            );
        }
        serde_json::Value::Object(object)
    }
}

// =============================================================================
// BUCKET
// =============================================================================

/// All records of one type key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bucket {
    records: BTreeMap<EntityId, Record>,
    next_seq: u64,
}

impl Bucket {
    /// Get a record by id.
    #[must_use]
    pub fn get(&self, id: &EntityId) -> Option<&Record> {
        self.records.get(id)
    }

    /// Check if the bucket holds an id.
    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.records.contains_key(id)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the bucket is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, &Record)> {
        self.records.iter()
    }

    /// Records ordered by first insertion.
    #[must_use]
    pub fn in_insertion_order(&self) -> Vec<(&EntityId, &Record)> {
        let mut entries: Vec<_> = self.records.iter().collect();
        entries.sort_by_key(|(_, record)| record.seq);
        entries
    }

    /// Shallow-merge `fields` into the record at `id`.
    ///
    /// New fields win, unspecified fields keep their prior value. `meta`
    /// computes the new metadata from the previous one (`None` on first insert).
    pub(crate) fn upsert(
        &mut self,
        id: EntityId,
        fields: BTreeMap<String, FieldValue>,
        meta: impl FnOnce(Option<Meta>) -> Option<Meta>,
    ) {
        match self.records.get_mut(&id) {
            Some(record) => {
                record.fields.extend(fields);
                record.meta = meta(record.meta);
            }
            None => {
                let seq = self.next_seq;
                self.next_seq = self.next_seq.saturating_add(1);
                self.records.insert(
                    id,
                    Record {
                        fields,
                        meta: meta(None),
                        seq,
                    },
                );
            }
        }
    }

    /// Set `accessedAt` on a record. Returns `false` if the id is absent.
    pub(crate) fn touch(&mut self, id: &EntityId, now: u64) -> bool {
        match self.records.get_mut(id) {
            Some(record) => {
                let mut meta = record.meta.unwrap_or_else(|| Meta::at(now));
                meta.accessed_at = now;
                record.meta = Some(meta);
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, id: &EntityId) -> Option<Record> {
        self.records.remove(id)
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// Every normalized record across all type keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    buckets: BTreeMap<TypeKey, Bucket>,
}

impl Snapshot {
    /// Create an empty snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a bucket.
    #[must_use]
    pub fn bucket(&self, type_key: &TypeKey) -> Option<&Bucket> {
        self.buckets.get(type_key)
    }

    /// Get a record.
    #[must_use]
    pub fn get(&self, type_key: &TypeKey, id: &EntityId) -> Option<&Record> {
        self.buckets.get(type_key)?.get(id)
    }

    /// Get a record by reference.
    #[must_use]
    pub fn get_ref(&self, key: &EntityRef) -> Option<&Record> {
        self.get(&key.type_key, &key.id)
    }

    /// Check if a record exists.
    #[must_use]
    pub fn contains(&self, key: &EntityRef) -> bool {
        self.get_ref(key).is_some()
    }

    /// All buckets in type-key order.
    pub fn buckets(&self) -> impl Iterator<Item = (&TypeKey, &Bucket)> {
        self.buckets.iter()
    }

    /// Every record as `(ref, record)` in deterministic order.
    pub fn records(&self) -> impl Iterator<Item = (EntityRef, &Record)> {
        self.buckets.iter().flat_map(|(type_key, bucket)| {
            bucket.iter().map(move |(id, record)| {
                (
                    EntityRef {
                        type_key: type_key.clone(),
                        id: id.clone(),
                    },
                    record,
                )
            })
        })
    }

    /// Total number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buckets.values().map(Bucket::len).sum()
    }

    /// Check if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(Bucket::is_empty)
    }

    /// Wire form: `{ typeKey: { id: { ...fields, _meta } } }`, buckets in
    /// type-key order and records in insertion order.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .buckets
            .iter()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(type_key, bucket)| {
                let records = bucket
                    .in_insertion_order()
                    .into_iter()
                    .map(|(id, record)| (id.0.clone(), record.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                (type_key.0.clone(), serde_json::Value::Object(records))
            })
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }

    pub(crate) fn bucket_mut(&mut self, type_key: &TypeKey) -> &mut Bucket {
        self.buckets.entry(type_key.clone()).or_default()
    }

    /// Remove a record. Empty buckets are dropped.
    pub(crate) fn remove(&mut self, key: &EntityRef) -> Option<Record> {
        let bucket = self.buckets.get_mut(&key.type_key)?;
        let removed = bucket.remove(&key.id);
        if bucket.is_empty() {
            self.buckets.remove(&key.type_key);
        }
        removed
    }

    pub(crate) fn clear(&mut self) {
        self.buckets.clear();
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), FieldValue::from(*v)))
            .collect()
    }

    #[test]
    fn upsert_shallow_merges_and_keeps_seq() {
        let mut bucket = Bucket::default();
        bucket.upsert(EntityId::from("b"), fields(&[("name", "B")]), |_| {
            Some(Meta::at(1))
        });
        bucket.upsert(
            EntityId::from("a"),
            fields(&[("name", "A"), ("bio", "x")]),
            |_| Some(Meta::at(2)),
        );
        bucket.upsert(EntityId::from("a"), fields(&[("name", "A2")]), |prev| {
            prev.map(|m| Meta {
                updated_at: 3,
                accessed_at: 3,
                ..m
            })
        });

        let a = bucket.get(&EntityId::from("a")).expect("a");
        assert_eq!(a.get("name"), Some(&FieldValue::from("A2")));
        assert_eq!(a.get("bio"), Some(&FieldValue::from("x")));
        assert_eq!(a.meta().map(|m| m.created_at), Some(2));
        assert_eq!(a.meta().map(|m| m.updated_at), Some(3));

        let order: Vec<_> = bucket
            .in_insertion_order()
            .into_iter()
            .map(|(id, _)| id.as_str().to_string())
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn remove_drops_empty_bucket() {
        let mut snapshot = Snapshot::new();
        let key = EntityRef::new("post", "1");
        snapshot
            .bucket_mut(&key.type_key)
            .upsert(key.id.clone(), BTreeMap::new(), |_| Some(Meta::at(0)));
        assert_eq!(snapshot.len(), 1);

        assert!(snapshot.remove(&key).is_some());
        assert!(snapshot.bucket(&key.type_key).is_none());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn wire_json_shape() {
        let mut snapshot = Snapshot::new();
        snapshot.bucket_mut(&TypeKey::from("post")).upsert(
            EntityId::from("101"),
            fields(&[("id", "101"), ("viewerId", "10")]),
            |_| Some(Meta::at(5)),
        );

        let json = snapshot.to_json();
        assert_eq!(json["post"]["101"]["viewerId"], "10");
        assert_eq!(json["post"]["101"]["_meta"]["createdAt"], 5);
    }
}
