//! # Normalizer
//!
//! Flattens nested raw payloads into normalized entries.
//!
//! - Walks the payload with the schema of its type key
//! - Normalizes nested relation payloads depth-first, so children are emitted
//!   before the record that references them
//! - Replaces relation fields with `<relation>Id` / `<relation>Ids`
//! - Deduplicates "many" references, keeping first-seen order
//! - Skips (and logs) records without an id
//!
//! The normalizer is a pure transformation: it never touches the store. The
//! `EntitiesStore` applies its output in order.

use crate::primitives::MAX_NORMALIZE_DEPTH;
use crate::schema::{Cardinality, RawObject, Relation, Schema, SchemaRegistry};
use crate::{EntigraphError, EntityId, EntityRef, FieldValue, TypeKey};
use std::collections::{BTreeMap, BTreeSet};

/// One flat record produced by normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedEntry {
    pub key: EntityRef,
    pub fields: BTreeMap<String, FieldValue>,
}

/// Output of normalizing one payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    /// Ids of the top-level records, in payload order.
    pub ids: Vec<EntityId>,
    /// Every flat record, children before parents.
    pub entries: Vec<NormalizedEntry>,
    /// Number of raw records skipped as data errors.
    pub skipped: usize,
}

/// Schema-driven payload normalizer.
pub struct Normalizer<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> Normalizer<'a> {
    /// Create a normalizer over a validated registry.
    #[must_use]
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Normalize a payload (one object or an array of objects) of `type_key`.
    ///
    /// Returns `UnknownType` if the type has no schema and `InvalidPayload`
    /// if the payload has the wrong shape. Problems inside individual records
    /// are counted in `skipped`.
    pub fn normalize(
        &self,
        type_key: &TypeKey,
        payload: &serde_json::Value,
    ) -> Result<Normalized, EntigraphError> {
        let schema = self.registry.require(type_key)?;
        let mut out = Normalized::default();

        match payload {
            serde_json::Value::Object(object) => {
                if let Some(id) = self.normalize_object(schema, object, 0, &mut out) {
                    out.ids.push(id);
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    match item {
                        serde_json::Value::Object(object) => {
                            if let Some(id) = self.normalize_object(schema, object, 0, &mut out) {
                                out.ids.push(id);
                            }
                        }
                        other => {
                            tracing::warn!(
                                type_key = %type_key,
                                "skipping non-object item in payload: {}",
                                other
                            );
                            out.skipped = out.skipped.saturating_add(1);
                        }
                    }
                }
            }
            _ => return Err(EntigraphError::InvalidPayload(type_key.clone())),
        }

        Ok(out)
    }

    /// Normalize one raw object and its nested relations.
    fn normalize_object(
        &self,
        schema: &Schema,
        object: &RawObject,
        depth: usize,
        out: &mut Normalized,
    ) -> Option<EntityId> {
        if depth > MAX_NORMALIZE_DEPTH {
            tracing::warn!(
                type_key = %schema.type_key(),
                "skipping record nested deeper than {}",
                MAX_NORMALIZE_DEPTH
            );
            out.skipped = out.skipped.saturating_add(1);
            return None;
        }

        let Some(id) = schema.id_rule().extract(object) else {
            tracing::warn!(type_key = %schema.type_key(), "skipping record without id");
            out.skipped = out.skipped.saturating_add(1);
            return None;
        };

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            match schema.relation_for(name) {
                Some(relation) => {
                    if let Some(reference) = self.normalize_relation(relation, value, depth, out) {
                        fields.insert(relation.reference_field(name), reference);
                    }
                }
                None => {
                    fields.insert(name.clone(), FieldValue::from(value));
                }
            }
        }

        out.entries.push(NormalizedEntry {
            key: EntityRef {
                type_key: schema.type_key().clone(),
                id: id.clone(),
            },
            fields,
        });
        Some(id)
    }

    /// Normalize the raw value of a relation field into its reference value.
    ///
    /// Returns `None` when the field should not be written at all (a nested
    /// record that had to be skipped).
    fn normalize_relation(
        &self,
        relation: &Relation,
        value: &serde_json::Value,
        depth: usize,
        out: &mut Normalized,
    ) -> Option<FieldValue> {
        // Targets are checked by SchemaRegistry::validate.
        let target = self.registry.get(&relation.target)?;

        match relation.cardinality {
            Cardinality::One => match value {
                serde_json::Value::Null => Some(FieldValue::Null),
                other => self
                    .reference(target, other, depth, out)
                    .map(|id| FieldValue::Text(id.0)),
            },
            Cardinality::Many => {
                let items: &[serde_json::Value] = match value {
                    serde_json::Value::Null => &[],
                    serde_json::Value::Array(items) => items,
                    single => std::slice::from_ref(single),
                };

                let mut seen = BTreeSet::new();
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(id) = self.reference(target, item, depth, out) {
                        if seen.insert(id.clone()) {
                            ids.push(FieldValue::Text(id.0));
                        }
                    }
                }
                Some(FieldValue::List(ids))
            }
        }
    }

    /// Resolve one related item: a nested record is normalized, a primitive
    /// is taken as an already-extracted id.
    fn reference(
        &self,
        target: &Schema,
        item: &serde_json::Value,
        depth: usize,
        out: &mut Normalized,
    ) -> Option<EntityId> {
        match item {
            serde_json::Value::Object(object) => {
                self.normalize_object(target, object, depth.saturating_add(1), out)
            }
            primitive => {
                let id = EntityId::from_json(primitive);
                if id.is_none() {
                    tracing::warn!(
                        type_key = %target.type_key(),
                        "skipping unusable reference: {}",
                        primitive
                    );
                    out.skipped = out.skipped.saturating_add(1);
                }
                id
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
