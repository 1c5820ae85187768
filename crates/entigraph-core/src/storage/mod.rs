//! # Storage Module
//!
//! Key/blob backends for the persistence runtime.
//!
//! A backend stores opaque byte blobs under string keys. It knows nothing
//! about channels or versions; `remove_all` must drop every given key in one
//! atomic step so a version wipe can never leave a partial store behind.

mod redb_blob;

pub use redb_blob::RedbStorage;

use crate::EntigraphError;
use std::collections::BTreeMap;

/// A key/blob store.
pub trait BlobStorage {
    /// Read a blob. `None` if the key was never written or was removed.
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EntigraphError>;

    /// Write (or overwrite) a blob.
    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), EntigraphError>;

    /// Remove every key in `keys` atomically. Absent keys are ignored.
    fn remove_all(&mut self, keys: &[String]) -> Result<(), EntigraphError>;

    /// Every stored key, in order.
    fn keys(&self) -> Result<Vec<String>, EntigraphError>;
}

/// In-memory backend, for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: BTreeMap<String, Vec<u8>>,
    writes: usize,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `write` calls so far.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl BlobStorage for MemoryStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EntigraphError> {
        Ok(self.entries.get(key).cloned())
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), EntigraphError> {
        self.entries.insert(key.to_string(), bytes.to_vec());
        self.writes = self.writes.saturating_add(1);
        Ok(())
    }

    fn remove_all(&mut self, keys: &[String]) -> Result<(), EntigraphError> {
        for key in keys {
            self.entries.remove(key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, EntigraphError> {
        Ok(self.entries.keys().cloned().collect())
    }
}
