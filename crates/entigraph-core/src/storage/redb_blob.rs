//! # redb-backed Blob Storage
//!
//! Disk-backed key/blob store on the redb embedded database.
//!
//! One table holds every blob. Each `write` is its own committed
//! transaction; `remove_all` drops all given keys in a single transaction,
//! which is what makes a version wipe atomic.

use super::BlobStorage;
use crate::EntigraphError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

/// Table for blobs: storage key -> encoded bytes
const BLOBS: TableDefinition<&str, &[u8]> = TableDefinition::new("blobs");

fn io_error(e: impl std::fmt::Display) -> EntigraphError {
    EntigraphError::IoError(e.to_string())
}

/// A disk-backed blob store using redb.
pub struct RedbStorage {
    db: Database,
}

impl std::fmt::Debug for RedbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStorage").finish_non_exhaustive()
    }
}

impl RedbStorage {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EntigraphError> {
        let db = Database::create(path.as_ref()).map_err(io_error)?;

        // Make sure the table exists so reads never fail on a fresh file.
        let write_txn = db.begin_write().map_err(io_error)?;
        {
            let _ = write_txn.open_table(BLOBS).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;

        Ok(Self { db })
    }

    /// Compact the database file.
    pub fn compact(&mut self) -> Result<(), EntigraphError> {
        self.db.compact().map_err(io_error)?;
        Ok(())
    }
}

impl BlobStorage for RedbStorage {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, EntigraphError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(BLOBS).map_err(io_error)?;
        Ok(table
            .get(key)
            .map_err(io_error)?
            .map(|guard| guard.value().to_vec()))
    }

    fn write(&mut self, key: &str, bytes: &[u8]) -> Result<(), EntigraphError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(BLOBS).map_err(io_error)?;
            table.insert(key, bytes).map_err(io_error)?;
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }

    fn remove_all(&mut self, keys: &[String]) -> Result<(), EntigraphError> {
        let write_txn = self.db.begin_write().map_err(io_error)?;
        {
            let mut table = write_txn.open_table(BLOBS).map_err(io_error)?;
            for key in keys {
                table.remove(key.as_str()).map_err(io_error)?;
            }
        }
        write_txn.commit().map_err(io_error)?;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, EntigraphError> {
        let read_txn = self.db.begin_read().map_err(io_error)?;
        let table = read_txn.open_table(BLOBS).map_err(io_error)?;
        let mut keys = Vec::new();
        for entry in table.iter().map_err(io_error)? {
            let (key, _) = entry.map_err(io_error)?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }
}

// =============================================================================
// TESTS
// =============================================================================
