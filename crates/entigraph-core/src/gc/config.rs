//! GC policy configuration.

use crate::primitives::{DEFAULT_MAX_RECORDS, DEFAULT_TTL_MS};
use crate::schema::SchemaRegistry;
use crate::{EntigraphError, TypeKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Eviction limits for one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcPolicy {
    /// Records not accessed for longer than this are expired.
    pub ttl_ms: u64,
    /// Bucket size above which the least recently accessed records go.
    pub max: usize,
}

impl Default for GcPolicy {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL_MS,
            max: DEFAULT_MAX_RECORDS,
        }
    }
}

/// Policies for every bucket: an explicit entry or the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    pub default: GcPolicy,
    pub types: BTreeMap<TypeKey, GcPolicy>,
    /// Also evict unreached nodes that still have references in the graph
    /// pass. Off by default: such nodes are reported and kept, and only
    /// isolated nodes are evicted.
    pub evict_rootless_cycles: bool,
}

impl GcConfig {
    /// Effective policy of a bucket.
    #[must_use]
    pub fn policy_for(&self, type_key: &TypeKey) -> GcPolicy {
        self.types.get(type_key).copied().unwrap_or(self.default)
    }

    /// Builder-style override for one type.
    #[must_use]
    pub fn with_policy(mut self, type_key: impl Into<TypeKey>, policy: GcPolicy) -> Self {
        self.types.insert(type_key.into(), policy);
        self
    }

    /// Reject policies for types the registry does not know.
    pub fn validate(&self, registry: &SchemaRegistry) -> Result<(), EntigraphError> {
        match self.types.keys().find(|t| !registry.contains(t)) {
            Some(unknown) => Err(EntigraphError::UnknownPolicyType(unknown.clone())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Schema;

    #[test]
    fn falls_back_to_default() {
        let config = GcConfig::default().with_policy(
            "post",
            GcPolicy {
                ttl_ms: 10,
                max: 2,
            },
        );
        assert_eq!(config.policy_for(&TypeKey::from("post")).max, 2);
        assert_eq!(config.policy_for(&TypeKey::from("viewer")), GcPolicy::default());
    }

    #[test]
    fn policy_for_unknown_type_is_rejected() {
        let registry = SchemaRegistry::from_schemas([Schema::new("post")]).expect("registry");
        let config = GcConfig::default().with_policy("ghost", GcPolicy::default());
        assert!(matches!(
            config.validate(&registry),
            Err(EntigraphError::UnknownPolicyType(t)) if t.as_str() == "ghost"
        ));
        assert!(GcConfig::default().validate(&registry).is_ok());
    }

    #[test]
    fn rootless_cycles_are_kept_by_default() {
        assert!(!GcConfig::default().evict_rootless_cycles);
    }
}
