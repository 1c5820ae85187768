//! # Core Type Definitions
//!
//! This module contains the shared vocabulary of the entity graph:
//! - Identifiers (`TypeKey`, `EntityId`, `EntityRef`)
//! - Record metadata (`Meta`)
//! - Field values (`FieldValue`)
//! - Error types (`EntigraphError`)
//!
//! ## Determinism Guarantees
//!
//! All identifier types implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Ids are always held in their string-normalized form: a numeric id `101`
//! and a textual id `"101"` name the same entity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Stable identifier naming a category of record (e.g. `"post"`, `"viewer"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(pub String);

impl TypeKey {
    /// Create a new type key.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the type key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TypeKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// String-normalized identifier of one entity instance within a bucket.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(pub String);

impl EntityId {
    /// Create a new id from anything string-like.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize a raw JSON id.
    ///
    /// Non-empty strings are taken verbatim, integers are coerced to their
    /// decimal form. Anything else (floats, booleans, objects, empty strings)
    /// is not an id.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Self(i.to_string()))
                } else {
                    n.as_u64().map(|u| Self(u.to_string()))
                }
            }
            _ => None,
        }
    }

    /// Normalize an id held in a record field.
    #[must_use]
    pub fn from_field(value: &FieldValue) -> Option<Self> {
        match value {
            FieldValue::Text(s) if !s.is_empty() => Some(Self(s.clone())),
            FieldValue::Int(i) => Some(Self(i.to_string())),
            FieldValue::UInt(u) => Some(Self(u.to_string())),
            _ => None,
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fully-qualified key of a record: `(typeKey, id)`.
///
/// This is the only handle anything outside the store keeps on a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub type_key: TypeKey,
    pub id: EntityId,
}

impl EntityRef {
    /// Create a new reference.
    #[must_use]
    pub fn new(type_key: impl Into<TypeKey>, id: impl Into<EntityId>) -> Self {
        Self {
            type_key: type_key.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_key, self.id)
    }
}

/// Ids grouped by bucket, the result shape of every GC analysis.
pub type IdsByType = BTreeMap<TypeKey, std::collections::BTreeSet<EntityId>>;

// =============================================================================
// RECORD METADATA
// =============================================================================

/// Logical timestamps (milliseconds) attached to every normalized record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    pub created_at: u64,
    pub updated_at: u64,
    pub accessed_at: u64,
}

impl Meta {
    /// Metadata for a record first seen at `now`.
    #[must_use]
    pub const fn at(now: u64) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            accessed_at: now,
        }
    }
}

// =============================================================================
// FIELD VALUES
// =============================================================================

/// A plain field value inside a normalized record or a state field.
///
/// Mirrors the JSON data model, but every variant is externally tagged so the
/// whole snapshot can be encoded with `postcard`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    List(Vec<FieldValue>),
    Map(BTreeMap<String, FieldValue>),
}

impl FieldValue {
    /// Shorthand for a text value.
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Get the value as a string slice, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Check if the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<&serde_json::Value> for FieldValue {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(u) = n.as_u64() {
                    Self::UInt(u)
                } else {
                    n.as_f64().map(Self::Float).unwrap_or(Self::Null)
                }
            }
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => Self::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&FieldValue> for serde_json::Value {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => Self::Null,
            FieldValue::Bool(b) => Self::Bool(*b),
            FieldValue::Int(i) => Self::from(*i),
            FieldValue::UInt(u) => Self::from(*u),
            FieldValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(Self::Number)
                .unwrap_or(Self::Null),
            FieldValue::Text(s) => Self::String(s.clone()),
            FieldValue::List(items) => Self::Array(items.iter().map(Self::from).collect()),
            FieldValue::Map(map) => Self::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the entigraph system.
///
/// - Configuration errors are fatal at registration/validation time
/// - Data errors inside a payload are logged and skipped, never returned,
///   except when the payload as a whole has the wrong shape
/// - Persistence errors are recovered by the runtime with a full wipe
/// - Hydration of a missing record is `None`, never an error
#[derive(Debug, Error)]
pub enum EntigraphError {
    /// A type key was used without a registered schema.
    #[error("Unknown entity type: {0}")]
    UnknownType(TypeKey),

    /// The same type key was registered twice.
    #[error("Duplicate schema for entity type: {0}")]
    DuplicateSchema(TypeKey),

    /// A relation points at a type key that has no schema.
    #[error("Relation {type_key}.{relation} targets unregistered type {target}")]
    UnknownRelationTarget {
        type_key: TypeKey,
        relation: String,
        target: TypeKey,
    },

    /// A GC policy was configured for a type key that has no schema.
    #[error("GC policy configured for unregistered type: {0}")]
    UnknownPolicyType(TypeKey),

    /// A configuration value is structurally invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The raw payload is neither an object nor an array of objects.
    #[error("Invalid payload for {0}: expected an object or an array of objects")]
    InvalidPayload(TypeKey),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// A stored blob failed header or payload validation.
    #[error("Corrupt stored blob under {key}: {reason}")]
    CorruptBlob { key: String, reason: String },

    /// The stored version stamp does not match the configured one.
    #[error("Stored version {stored} does not match expected {expected}")]
    VersionMismatch { stored: u32, expected: u32 },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_and_text_ids_normalize_identically() {
        assert_eq!(EntityId::from_json(&json!(101)), Some(EntityId::from("101")));
        assert_eq!(
            EntityId::from_json(&json!("101")),
            Some(EntityId::from("101"))
        );
        assert_eq!(
            EntityId::from_field(&FieldValue::UInt(101)),
            Some(EntityId::from("101"))
        );
    }

    #[test]
    fn non_ids_are_rejected() {
        assert_eq!(EntityId::from_json(&json!("")), None);
        assert_eq!(EntityId::from_json(&json!(1.5)), None);
        assert_eq!(EntityId::from_json(&json!(true)), None);
        assert_eq!(EntityId::from_json(&json!({"id": 1})), None);
        assert_eq!(EntityId::from_field(&FieldValue::Null), None);
    }

    #[test]
    fn field_value_json_roundtrip() {
        let raw = json!({"name": "Anna", "age": 31, "tags": ["a", "b"], "score": 0.5, "ok": null});
        let value = FieldValue::from(&raw);
        assert_eq!(serde_json::Value::from(&value), raw);
    }

    #[test]
    fn entity_ref_ordering_groups_by_type() {
        let mut refs = [
            EntityRef::new("viewer", "1"),
            EntityRef::new("post", "2"),
            EntityRef::new("post", "1"),
        ];
        refs.sort();
        assert_eq!(refs[0], EntityRef::new("post", "1"));
        assert_eq!(refs[2], EntityRef::new("viewer", "1"));
    }

    #[test]
    fn meta_wire_names_are_camel_case() {
        let json = serde_json::to_string(&Meta::at(7)).expect("serialize");
        assert_eq!(json, r#"{"createdAt":7,"updatedAt":7,"accessedAt":7}"#);
    }
}
