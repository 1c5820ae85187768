//! # Persistence Runtime
//!
//! Owns the storage, the version stamp and the restore flag.
//!
//! Bootstrap flow:
//! 1. check the version stamp (mismatch or corrupt stamp: wipe)
//! 2. load the stored blob (corrupt channel: wipe, cold start)
//! 3. restore plain state fields
//! 4. restore collection snapshots
//! 5. restore entities through the merge path
//! 6. run the startup GC passes
//! 7. clear `is_restoring`
//!
//! After bootstrap, `observe` compares the session revisions against the last
//! persisted ones and writes dirty channels at most once per throttle window.

use super::processor::{Processor, RestoreReport, WriteReport};
use super::{Channel, PersistConfig};
use crate::formats::{decode_version, encode_version};
use crate::gc::{GarbageCollector, GcReport};
use crate::session::{Revisions, Session};
use crate::storage::BlobStorage;
use crate::EntigraphError;
use serde::Serialize;

/// Why bootstrap discarded stored data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum WipeReason {
    /// The stored stamp names another store version.
    VersionMismatch { stored: u32, expected: u32 },
    /// The stamp is missing or unreadable, or a channel failed to decode.
    Corrupt(String),
}

/// Outcome of bootstrap.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootstrapReport {
    pub wiped: Option<WipeReason>,
    pub restored: RestoreReport,
    pub gc: GcReport,
}

/// Drives the persistence pipeline for one session.
#[derive(Debug)]
pub struct PersistenceRuntime<S: BlobStorage> {
    storage: S,
    config: PersistConfig,
    processor: Processor,
    restoring: bool,
    /// Session revisions as of the last write (or the end of restore).
    seen: Revisions,
    pending: bool,
    last_write_at: Option<u64>,
}

impl<S: BlobStorage> PersistenceRuntime<S> {
    /// Create a runtime. It stays in restoring mode until `bootstrap`.
    pub fn new(storage: S, config: PersistConfig) -> Result<Self, EntigraphError> {
        if config.namespace.is_empty() || config.namespace.contains('/') {
            return Err(EntigraphError::InvalidConfig(format!(
                "persist namespace must be non-empty and contain no '/': {:?}",
                config.namespace
            )));
        }
        Ok(Self {
            storage,
            config,
            processor: Processor::new(),
            restoring: true,
            seen: Revisions::default(),
            pending: false,
            last_write_at: None,
        })
    }

    // =========================================================================
    // BOOTSTRAP
    // =========================================================================

    /// Restore `session` from storage and run startup GC.
    ///
    /// Stored data that cannot be trusted is wiped and bootstrap continues
    /// from an empty store; only storage I/O errors are returned.
    pub fn bootstrap(
        &mut self,
        session: &mut Session,
        gc: &GarbageCollector,
    ) -> Result<BootstrapReport, EntigraphError> {
        self.restoring = true;
        let mut report = BootstrapReport::default();

        match self.check_version() {
            Ok(()) => {}
            Err(EntigraphError::VersionMismatch { stored, expected }) => {
                report.wiped = Some(WipeReason::VersionMismatch { stored, expected });
            }
            Err(EntigraphError::CorruptBlob { reason, .. }) => {
                report.wiped = Some(WipeReason::Corrupt(reason));
            }
            Err(e) => return Err(e),
        }
        if let Some(reason) = &report.wiped {
            tracing::warn!(reason = ?reason, namespace = %self.config.namespace, "discarding stored data");
            self.wipe()?;
        }

        let loaded = match self.processor.load(&self.storage, &self.config.namespace) {
            Ok(loaded) => Some(loaded),
            Err(EntigraphError::CorruptBlob { key, reason }) => {
                tracing::warn!(key = %key, reason = %reason, "corrupt stored channel, cold start");
                report.wiped = Some(WipeReason::Corrupt(reason));
                self.wipe()?;
                None
            }
            Err(e) => return Err(e),
        };

        if let Some(loaded) = loaded {
            report.restored = self.processor.apply(session, loaded)?;
        }
        self.seen = session.revisions();

        report.gc = gc.run_startup(session.entities_mut());
        self.restoring = false;

        tracing::info!(
            state_fields = report.restored.state_fields,
            collections = report.restored.collections,
            records = report.restored.records,
            evicted = report.gc.total(),
            wiped = report.wiped.is_some(),
            "bootstrap complete"
        );
        Ok(report)
    }

    /// Check the stored stamp against the configured version, writing the
    /// stamp on a fresh store.
    fn check_version(&mut self) -> Result<(), EntigraphError> {
        let key = Channel::version_key(&self.config.namespace);
        match self.storage.read(&key)? {
            Some(bytes) => {
                let stored = decode_version(&bytes).map_err(|e| EntigraphError::CorruptBlob {
                    key,
                    reason: e.to_string(),
                })?;
                if stored != self.config.version {
                    return Err(EntigraphError::VersionMismatch {
                        stored,
                        expected: self.config.version,
                    });
                }
                Ok(())
            }
            None => {
                let has_channels = Channel::ORDER.iter().try_fold(false, |found, channel| {
                    Ok::<_, EntigraphError>(
                        found
                            || self
                                .storage
                                .read(&channel.storage_key(&self.config.namespace))?
                                .is_some(),
                    )
                })?;
                if has_channels {
                    return Err(EntigraphError::CorruptBlob {
                        key,
                        reason: "channels stored without a version stamp".to_string(),
                    });
                }
                self.storage
                    .write(&key, &encode_version(self.config.version)?)
            }
        }
    }

    /// Drop every channel and the stamp in one step, then stamp the current
    /// version.
    fn wipe(&mut self) -> Result<(), EntigraphError> {
        self.storage
            .remove_all(&Channel::all_keys(&self.config.namespace))?;
        self.processor.clear();
        self.storage.write(
            &Channel::version_key(&self.config.namespace),
            &encode_version(self.config.version)?,
        )
    }

    // =========================================================================
    // OBSERVATION
    // =========================================================================

    /// Note session changes and write them if the throttle window allows.
    ///
    /// Returns `None` while restoring, when nothing changed, or when the
    /// write was deferred (see `has_pending`). The runtime never schedules a
    /// deferred write on its own: the caller retries with `flush_if_due` once
    /// `due_at` has passed, or calls `flush`.
    pub fn observe(&mut self, session: &Session) -> Result<Option<WriteReport>, EntigraphError> {
        if self.restoring {
            return Ok(None);
        }
        if self.dirty(session).is_empty() {
            self.pending = false;
            return Ok(None);
        }

        let now = session.entities().now();
        let throttled = self
            .last_write_at
            .is_some_and(|last| now.saturating_sub(last) < self.config.throttle_ms);
        if throttled {
            self.pending = true;
            return Ok(None);
        }
        self.flush(session).map(Some)
    }

    /// Write a deferred change once its throttle window is over.
    ///
    /// Returns `None` when nothing is pending or the window is still open.
    pub fn flush_if_due(
        &mut self,
        session: &Session,
    ) -> Result<Option<WriteReport>, EntigraphError> {
        if !self.pending {
            return Ok(None);
        }
        self.observe(session)
    }

    /// Write every dirty channel now, ignoring the throttle.
    pub fn flush(&mut self, session: &Session) -> Result<WriteReport, EntigraphError> {
        if self.restoring {
            return Ok(WriteReport::default());
        }
        let dirty = self.dirty(session);
        let report =
            self.processor
                .write(&mut self.storage, &self.config.namespace, session, &dirty)?;
        self.seen = session.revisions();
        self.pending = false;
        self.last_write_at = Some(session.entities().now());
        Ok(report)
    }

    fn dirty(&self, session: &Session) -> Vec<Channel> {
        let now = session.revisions();
        let mut dirty = Vec::new();
        if now.state != self.seen.state {
            dirty.push(Channel::State);
        }
        if now.collections != self.seen.collections {
            dirty.push(Channel::Collections);
        }
        if now.entities != self.seen.entities {
            dirty.push(Channel::Entities);
        }
        dirty
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    /// A change was observed inside the throttle window and is not written yet.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending
    }

    /// Store-clock time at which a pending write may go out.
    #[must_use]
    pub fn due_at(&self) -> Option<u64> {
        if !self.pending {
            return None;
        }
        self.last_write_at
            .map(|last| last.saturating_add(self.config.throttle_ms))
    }

    #[must_use]
    pub fn config(&self) -> &PersistConfig {
        &self.config
    }

    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Give the storage back.
    pub fn into_storage(self) -> S {
        self.storage
    }
}

// =============================================================================
// TESTS
// =============================================================================
