//! Serializable view of a session.
//!
//! Only plain data leaves the process: plain state fields, collection
//! snapshots (never the live collections) and normalized records. Derived
//! and transient state is dropped here.

use crate::collection::{CollectionKey, CollectionSnapshot};
use crate::session::Session;
use crate::{EntityId, FieldValue, Meta, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCollection {
    pub key: CollectionKey,
    pub type_key: TypeKey,
    pub snapshot: CollectionSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    pub id: EntityId,
    pub fields: BTreeMap<String, FieldValue>,
    pub meta: Option<Meta>,
}

/// One bucket, records in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBucket {
    pub type_key: TypeKey,
    pub records: Vec<StoredRecord>,
}

/// All three channels of a session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedSnapshot {
    pub state: BTreeMap<String, FieldValue>,
    pub collections: Vec<StoredCollection>,
    pub entities: Vec<StoredBucket>,
}

/// Session -> channel values.
pub struct Extractor;

impl Extractor {
    #[must_use]
    pub fn extract(session: &Session) -> ExtractedSnapshot {
        ExtractedSnapshot {
            state: Self::state(session),
            collections: Self::collections(session),
            entities: Self::entities(session),
        }
    }

    /// Plain state fields only.
    #[must_use]
    pub fn state(session: &Session) -> BTreeMap<String, FieldValue> {
        session
            .state()
            .persistable()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    #[must_use]
    pub fn collections(session: &Session) -> Vec<StoredCollection> {
        session
            .collections()
            .iter()
            .map(|(key, collection)| StoredCollection {
                key: key.clone(),
                type_key: collection.type_key().clone(),
                snapshot: collection.snapshot().clone(),
            })
            .collect()
    }

    /// Non-empty buckets in type-key order, records in insertion order so a
    /// restore reproduces LRU tie-breaks.
    #[must_use]
    pub fn entities(session: &Session) -> Vec<StoredBucket> {
        session
            .entities()
            .snapshot()
            .buckets()
            .filter(|(_, bucket)| !bucket.is_empty())
            .map(|(type_key, bucket)| StoredBucket {
                type_key: type_key.clone(),
                records: bucket
                    .in_insertion_order()
                    .into_iter()
                    .map(|(id, record)| StoredRecord {
                        id: id.clone(),
                        fields: record.fields().clone(),
                        meta: record.meta().copied(),
                    })
                    .collect(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::schema::{Schema, SchemaRegistry};
    use serde_json::json;

    #[test]
    fn derived_and_transient_state_is_dropped() {
        let registry = SchemaRegistry::from_schemas([Schema::new("post")]).expect("registry");
        let mut session = Session::with_clock(registry, ManualClock::new(3)).expect("session");
        session.state_mut().set("filter", "top");
        session.state_mut().set_derived("count", 2_i64);
        session.state_mut().set_transient("socket", "open");
        session
            .set_collection(CollectionKey::new("feed"), "post", 10, &json!([{"id": 2}, {"id": 1}]))
            .expect("set");

        let extracted = Extractor::extract(&session);
        assert_eq!(extracted.state.keys().collect::<Vec<_>>(), vec!["filter"]);
        assert_eq!(extracted.collections.len(), 1);
        assert_eq!(extracted.collections[0].snapshot.items.len(), 2);

        let ids: Vec<_> = extracted.entities[0]
            .records
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["2", "1"]);
        assert_eq!(extracted.entities[0].records[0].meta, Some(Meta::at(3)));
    }
}
