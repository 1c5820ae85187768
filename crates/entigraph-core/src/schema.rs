//! # Schema Registry
//!
//! Declarative description of every entity type: which fields are relations
//! to other types (and with what cardinality), and how to extract a stable id
//! from a raw record.
//!
//! Relations name their target by `TypeKey`, not by reference, so the schema
//! graph may be cyclic (`post -> viewer -> post`) without any ownership cycle.
//! The registry is the factory table the store consults at normalization and
//! hydration time.

use crate::primitives::{COMPOSITE_ID_SEPARATOR, DEFAULT_ID_FIELD, MANY_SUFFIX, ONE_SUFFIX};
use crate::{EntigraphError, EntityId, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw JSON object as received from a data source.
pub type RawObject = serde_json::Map<String, serde_json::Value>;

// =============================================================================
// RELATIONS
// =============================================================================

/// How many records a relation field points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// One relation field of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Type key of the related records.
    pub target: TypeKey,
    /// Single reference or id list.
    pub cardinality: Cardinality,
}

impl Relation {
    /// Name of the field holding the reference(s) in a normalized record.
    ///
    /// `viewer` (one) becomes `viewerId`, `comments` (many) becomes `commentsIds`.
    #[must_use]
    pub fn reference_field(&self, relation: &str) -> String {
        match self.cardinality {
            Cardinality::One => format!("{relation}{ONE_SUFFIX}"),
            Cardinality::Many => format!("{relation}{MANY_SUFFIX}"),
        }
    }
}

// =============================================================================
// ID RULES
// =============================================================================

/// Extraction function for schemas whose identity is not a plain field.
pub type IdExtractor = fn(&RawObject) -> Option<EntityId>;

/// How a stable id is produced from a raw record.
#[derive(Debug, Clone)]
pub enum IdRule {
    /// Read a single field (string or integer).
    Field(String),
    /// Join several fields with `:`; every field must be present.
    Composite(Vec<String>),
    /// Arbitrary extraction function.
    Custom(IdExtractor),
}

impl Default for IdRule {
    fn default() -> Self {
        Self::Field(DEFAULT_ID_FIELD.to_string())
    }
}

impl IdRule {
    /// Extract the id from a raw record, or `None` if it has none.
    #[must_use]
    pub fn extract(&self, raw: &RawObject) -> Option<EntityId> {
        match self {
            Self::Field(field) => raw.get(field).and_then(EntityId::from_json),
            Self::Composite(fields) => {
                let parts = fields
                    .iter()
                    .map(|f| raw.get(f).and_then(EntityId::from_json).map(|id| id.0))
                    .collect::<Option<Vec<_>>>()?;
                if parts.is_empty() {
                    return None;
                }
                Some(EntityId(parts.join(COMPOSITE_ID_SEPARATOR)))
            }
            Self::Custom(extract) => extract(raw),
        }
    }
}

// =============================================================================
// SCHEMA
// =============================================================================

/// Schema of one entity type.
#[derive(Debug, Clone)]
pub struct Schema {
    type_key: TypeKey,
    relations: BTreeMap<String, Relation>,
    id_rule: IdRule,
}

impl Schema {
    /// Create a schema with no relations and the default `id` field rule.
    #[must_use]
    pub fn new(type_key: impl Into<TypeKey>) -> Self {
        Self {
            type_key: type_key.into(),
            relations: BTreeMap::new(),
            id_rule: IdRule::default(),
        }
    }

    /// Declare a cardinality-one relation.
    #[must_use]
    pub fn one(self, relation: impl Into<String>, target: impl Into<TypeKey>) -> Self {
        self.relation(relation, target, Cardinality::One)
    }

    /// Declare a cardinality-many relation.
    #[must_use]
    pub fn many(self, relation: impl Into<String>, target: impl Into<TypeKey>) -> Self {
        self.relation(relation, target, Cardinality::Many)
    }

    /// Declare a relation with an explicit cardinality.
    #[must_use]
    pub fn relation(
        mut self,
        relation: impl Into<String>,
        target: impl Into<TypeKey>,
        cardinality: Cardinality,
    ) -> Self {
        self.relations.insert(
            relation.into(),
            Relation {
                target: target.into(),
                cardinality,
            },
        );
        self
    }

    /// Replace the id rule.
    #[must_use]
    pub fn with_id_rule(mut self, rule: IdRule) -> Self {
        self.id_rule = rule;
        self
    }

    /// The type key this schema describes.
    #[must_use]
    pub fn type_key(&self) -> &TypeKey {
        &self.type_key
    }

    /// Look up a relation by its raw field name.
    #[must_use]
    pub fn relation_for(&self, field: &str) -> Option<&Relation> {
        self.relations.get(field)
    }

    /// All relations in deterministic order.
    pub fn relations(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The id rule.
    #[must_use]
    pub fn id_rule(&self) -> &IdRule {
        &self.id_rule
    }
}

// =============================================================================
// DECLARATIVE FORM
// =============================================================================

/// Serializable declaration of a relation, as written in configuration files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDecl {
    pub target: TypeKey,
    #[serde(default)]
    pub cardinality: Cardinality,
}

/// Serializable declaration of a schema, as written in configuration files.
///
/// ```toml
/// [[schema]]
/// type = "post"
/// relations = { viewer = { target = "viewer" }, comments = { target = "comment", cardinality = "many" } }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDecl {
    #[serde(rename = "type")]
    pub type_key: TypeKey,
    /// Id fields; empty means the default `id` field, several means composite.
    #[serde(default)]
    pub id: Vec<String>,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDecl>,
}

impl From<&SchemaDecl> for Schema {
    fn from(decl: &SchemaDecl) -> Self {
        let id_rule = match decl.id.as_slice() {
            [] => IdRule::default(),
            [single] => IdRule::Field(single.clone()),
            many => IdRule::Composite(many.to_vec()),
        };
        decl.relations.iter().fold(
            Schema::new(decl.type_key.clone()).with_id_rule(id_rule),
            |schema, (name, rel)| schema.relation(name.clone(), rel.target.clone(), rel.cardinality),
        )
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Mapping from type key to schema. Must be fully populated and validated
/// before any merge that references its types.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<TypeKey, Schema>,
}

impl SchemaRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build and validate a registry from a list of schemas.
    pub fn from_schemas(schemas: impl IntoIterator<Item = Schema>) -> Result<Self, EntigraphError> {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Build and validate a registry from declarations.
    pub fn from_decls(decls: &[SchemaDecl]) -> Result<Self, EntigraphError> {
        Self::from_schemas(decls.iter().map(Schema::from))
    }

    /// Register a schema. A type key may only be registered once.
    pub fn register(&mut self, schema: Schema) -> Result<(), EntigraphError> {
        if self.schemas.contains_key(schema.type_key()) {
            return Err(EntigraphError::DuplicateSchema(schema.type_key().clone()));
        }
        self.schemas.insert(schema.type_key().clone(), schema);
        Ok(())
    }

    /// Check that every relation targets a registered type.
    pub fn validate(&self) -> Result<(), EntigraphError> {
        for schema in self.schemas.values() {
            for (name, relation) in schema.relations() {
                if !self.schemas.contains_key(&relation.target) {
                    return Err(EntigraphError::UnknownRelationTarget {
                        type_key: schema.type_key().clone(),
                        relation: name.to_string(),
                        target: relation.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Get the schema for a type key.
    #[must_use]
    pub fn get(&self, type_key: &TypeKey) -> Option<&Schema> {
        self.schemas.get(type_key)
    }

    /// Get the schema for a type key, or a configuration error.
    pub fn require(&self, type_key: &TypeKey) -> Result<&Schema, EntigraphError> {
        self.get(type_key)
            .ok_or_else(|| EntigraphError::UnknownType(type_key.clone()))
    }

    /// Check if a type key is registered.
    #[must_use]
    pub fn contains(&self, type_key: &TypeKey) -> bool {
        self.schemas.contains_key(type_key)
    }

    /// All registered type keys in deterministic order.
    pub fn type_keys(&self) -> impl Iterator<Item = &TypeKey> {
        self.schemas.keys()
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if no schema is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}

// =============================================================================
// TESTS
// =============================================================================
