//! # State Fields
//!
//! Plain values a session keeps next to its entities and collections
//! (filters, cursors, feature flags). Only `Plain` fields are persisted;
//! `Derived` values are recomputed from other state and `Transient` values
//! (handles, in-flight markers) never leave the process.

use crate::FieldValue;
use std::collections::BTreeMap;

/// Persistence class of a state field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldKind {
    #[default]
    Plain,
    Derived,
    Transient,
}

#[derive(Debug, Clone, PartialEq)]
struct StateField {
    kind: FieldKind,
    value: FieldValue,
}

/// Named state fields with a change counter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateFields {
    fields: BTreeMap<String, StateField>,
    revision: u64,
}

impl StateFields {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a persisted field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.insert(name.into(), FieldKind::Plain, value.into());
    }

    /// Set a field computed from other state. Not persisted.
    pub fn set_derived(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.insert(name.into(), FieldKind::Derived, value.into());
    }

    /// Set a process-local field. Not persisted.
    pub fn set_transient(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.insert(name.into(), FieldKind::Transient, value.into());
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name).map(|f| &f.value)
    }

    #[must_use]
    pub fn kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).map(|f| f.kind)
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        let removed = self.fields.remove(name).map(|f| f.value);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Fields that survive a restart, in name order.
    pub fn persistable(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields
            .iter()
            .filter(|(_, f)| f.kind == FieldKind::Plain)
            .map(|(name, f)| (name.as_str(), &f.value))
    }

    /// Load restored plain fields. Existing fields of other kinds are kept.
    pub fn restore(&mut self, values: BTreeMap<String, FieldValue>) {
        for (name, value) in values {
            self.fields.insert(
                name,
                StateField {
                    kind: FieldKind::Plain,
                    value,
                },
            );
        }
        self.bump();
    }

    pub fn clear(&mut self) {
        self.fields.clear();
        self.bump();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Monotonic counter bumped by every mutation.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn insert(&mut self, name: String, kind: FieldKind, value: FieldValue) {
        let unchanged = self
            .fields
            .get(&name)
            .is_some_and(|f| f.kind == kind && f.value == value);
        if unchanged {
            return;
        }
        self.fields.insert(name, StateField { kind, value });
        self.bump();
    }

    fn bump(&mut self) {
        self.revision = self.revision.saturating_add(1);
    }
}
