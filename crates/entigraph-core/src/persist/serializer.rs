//! Channel values <-> bytes, and restore into a live session.
//!
//! Restores never write into the snapshot directly: entities go back in
//! through the store's merge path, keeping their stored metadata.

use super::extractor::{ExtractedSnapshot, Extractor, StoredBucket, StoredCollection};
use super::Channel;
use crate::formats::{decode_channel, encode_channel};
use crate::session::Session;
use crate::{EntigraphError, FieldValue};
use std::collections::BTreeMap;

/// Pure transforms between channel values and stored bytes.
pub struct Serializer;

impl Serializer {
    /// Extract and encode one channel of a session.
    pub fn encode(session: &Session, channel: Channel) -> Result<Vec<u8>, EntigraphError> {
        match channel {
            Channel::State => encode_channel(&Extractor::state(session)),
            Channel::Collections => encode_channel(&Extractor::collections(session)),
            Channel::Entities => encode_channel(&Extractor::entities(session)),
        }
    }

    /// Decode one channel into `into`.
    pub fn decode(
        channel: Channel,
        bytes: &[u8],
        into: &mut ExtractedSnapshot,
    ) -> Result<(), EntigraphError> {
        match channel {
            Channel::State => into.state = decode_channel(bytes)?,
            Channel::Collections => into.collections = decode_channel(bytes)?,
            Channel::Entities => into.entities = decode_channel(bytes)?,
        }
        Ok(())
    }

    /// Load plain state fields.
    pub fn restore_state(session: &mut Session, state: BTreeMap<String, FieldValue>) -> usize {
        let count = state.len();
        if count > 0 {
            session.state_mut().restore(state);
        }
        count
    }

    /// Re-create collections from their snapshots. Collections over a type
    /// with no schema are dropped.
    pub fn restore_collections(session: &mut Session, collections: Vec<StoredCollection>) -> usize {
        let mut restored = 0usize;
        for stored in collections {
            if !session.entities().registry().contains(&stored.type_key) {
                tracing::warn!(
                    collection = %stored.key,
                    type_key = %stored.type_key,
                    "dropping stored collection of unregistered type"
                );
                continue;
            }
            let limit = stored.snapshot.limit;
            match session
                .collections_mut()
                .get_or_insert(stored.key.clone(), stored.type_key, limit)
            {
                Ok(collection) => {
                    collection.restore(stored.snapshot);
                    restored = restored.saturating_add(1);
                }
                Err(e) => {
                    tracing::warn!(
                        collection = %stored.key,
                        "dropping stored collection: {}",
                        e
                    );
                }
            }
        }
        restored
    }

    /// Merge stored records back into the entity store. Buckets of a type
    /// with no schema are dropped.
    pub fn restore_entities(
        session: &mut Session,
        buckets: Vec<StoredBucket>,
    ) -> Result<usize, EntigraphError> {
        let mut restored = 0usize;
        for bucket in buckets {
            let records = bucket
                .records
                .into_iter()
                .map(|r| (r.id, r.fields, r.meta))
                .collect();
            match session
                .entities_mut()
                .merge_restored(&bucket.type_key, records)
            {
                Ok(count) => restored = restored.saturating_add(count),
                Err(EntigraphError::UnknownType(type_key)) => {
                    tracing::warn!(type_key = %type_key, "dropping stored bucket of unregistered type");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(restored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::collection::CollectionKey;
    use crate::schema::{Schema, SchemaRegistry};
    use crate::Meta;
    use serde_json::json;

    fn session(clock: &ManualClock) -> Session {
        let registry = SchemaRegistry::from_schemas([
            Schema::new("post").one("author", "viewer"),
            Schema::new("viewer"),
        ])
        .expect("registry");
        Session::with_clock(registry, clock.clone()).expect("session")
    }

    #[test]
    fn entities_restore_keeps_metadata_and_relations() {
        let clock = ManualClock::new(100);
        let mut source = session(&clock);
        source
            .merge("post", &json!({"id": 1, "author": {"id": 5, "name": "Eve"}}))
            .expect("merge");

        let mut decoded = ExtractedSnapshot::default();
        let bytes = Serializer::encode(&source, Channel::Entities).expect("encode");
        Serializer::decode(Channel::Entities, &bytes, &mut decoded).expect("decode");

        clock.set(900);
        let mut target = session(&clock);
        let restored = Serializer::restore_entities(&mut target, decoded.entities).expect("restore");
        assert_eq!(restored, 2);

        let post = target.get_entity("post", "1").expect("post");
        assert_eq!(post.meta().copied(), Some(Meta::at(100)));
        assert_eq!(post.one("author").and_then(|a| a.text("name")), Some("Eve"));
    }

    #[test]
    fn unregistered_types_are_dropped_on_restore() {
        let clock = ManualClock::new(0);
        let mut target = session(&clock);

        let buckets = vec![StoredBucket {
            type_key: "ghost".into(),
            records: Vec::new(),
        }];
        assert_eq!(Serializer::restore_entities(&mut target, buckets).expect("restore"), 0);

        let collections = vec![StoredCollection {
            key: CollectionKey::new("ghosts"),
            type_key: "ghost".into(),
            snapshot: Default::default(),
        }];
        assert_eq!(Serializer::restore_collections(&mut target, collections), 0);
        assert!(target.collections().is_empty());
    }
}
