//! # Persistence Pipeline
//!
//! Versioned, diffed persistence of a `Session` into a `BlobStorage`.
//!
//! ## Channels
//!
//! | Channel | Content | Restored |
//! |---------|---------|----------|
//! | `state` | plain state fields | 1st |
//! | `collections` | collection snapshots | 2nd |
//! | `entities` | normalized records with metadata | 3rd |
//!
//! Each channel lives under `<namespace>/<channel>` and is written only when
//! its encoded form differs from the last one written. A version stamp under
//! `<namespace>/version` guards all three: a mismatch wipes them together.
//!
//! ## Layers
//!
//! - `extractor`: session -> serializable channel values
//! - `serializer`: channel values <-> bytes, and restore into a session
//! - `processor`: diff cache, ordered write and ordered restore
//! - `runtime`: version check, bootstrap flow, throttled observation

mod extractor;
mod processor;
mod runtime;
mod serializer;

pub use extractor::{
    ExtractedSnapshot, Extractor, StoredBucket, StoredCollection, StoredRecord,
};
pub use processor::{Processor, RestoreReport, WriteReport};
pub use runtime::{BootstrapReport, PersistenceRuntime, WipeReason};
pub use serializer::Serializer;

use crate::primitives::{DEFAULT_NAMESPACE, DEFAULT_STORE_VERSION, DEFAULT_THROTTLE_MS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One persisted channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    State,
    Collections,
    Entities,
}

impl Channel {
    /// Write and restore order.
    pub const ORDER: [Channel; 3] = [Channel::State, Channel::Collections, Channel::Entities];

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Collections => "collections",
            Self::Entities => "entities",
        }
    }

    /// Storage key of this channel under `namespace`.
    #[must_use]
    pub fn storage_key(&self, namespace: &str) -> String {
        format!("{}/{}", namespace, self.name())
    }

    /// Storage key of the version stamp under `namespace`.
    #[must_use]
    pub fn version_key(namespace: &str) -> String {
        format!("{}/version", namespace)
    }

    /// Every key owned by `namespace`: the channels and the version stamp.
    #[must_use]
    pub fn all_keys(namespace: &str) -> Vec<String> {
        let mut keys: Vec<String> = Self::ORDER
            .iter()
            .map(|channel| channel.storage_key(namespace))
            .collect();
        keys.push(Self::version_key(namespace));
        keys
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Persistence settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Key prefix of every stored blob.
    pub namespace: String,
    /// Application store version. Bump it when the stored data shape
    /// changes; stored data of any other version is discarded.
    pub version: u32,
    /// Minimum interval between two writes.
    pub throttle_ms: u64,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: DEFAULT_STORE_VERSION,
            throttle_ms: DEFAULT_THROTTLE_MS,
        }
    }
}
