//! Ordered, diffed channel writes and ordered restores.

use super::extractor::ExtractedSnapshot;
use super::serializer::Serializer;
use super::Channel;
use crate::session::Session;
use crate::storage::BlobStorage;
use crate::EntigraphError;
use serde::Serialize;
use std::collections::BTreeMap;

/// What the diff cache remembers of the last bytes written per channel.
#[cfg(feature = "crypto-hash")]
type Fingerprint = [u8; 32];
#[cfg(not(feature = "crypto-hash"))]
type Fingerprint = Vec<u8>;

#[cfg(feature = "crypto-hash")]
fn fingerprint(bytes: &[u8]) -> Fingerprint {
    *blake3::hash(bytes).as_bytes()
}

#[cfg(not(feature = "crypto-hash"))]
fn fingerprint(bytes: &[u8]) -> Fingerprint {
    bytes.to_vec()
}

/// Channels written and skipped by one write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub written: Vec<Channel>,
    /// Channels whose encoded form was unchanged.
    pub skipped: Vec<Channel>,
}

/// Counts restored per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub state_fields: usize,
    pub collections: usize,
    pub records: usize,
}

/// Diff cache plus the ordered write/restore sequences.
#[derive(Debug, Default)]
pub struct Processor {
    cache: BTreeMap<Channel, Fingerprint>,
}

impl Processor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode `channels` (in fixed channel order) and write those whose bytes
    /// differ from the last write.
    pub fn write<S: BlobStorage>(
        &mut self,
        storage: &mut S,
        namespace: &str,
        session: &Session,
        channels: &[Channel],
    ) -> Result<WriteReport, EntigraphError> {
        let mut report = WriteReport::default();
        for channel in Channel::ORDER.into_iter().filter(|c| channels.contains(c)) {
            let bytes = Serializer::encode(session, channel)?;
            let print = fingerprint(&bytes);
            if self.cache.get(&channel) == Some(&print) {
                tracing::debug!(channel = %channel, "channel unchanged, skipping write");
                report.skipped.push(channel);
                continue;
            }
            storage.write(&channel.storage_key(namespace), &bytes)?;
            self.cache.insert(channel, print);
            report.written.push(channel);
        }
        Ok(report)
    }

    /// Read and decode all three channels. Missing channels decode as empty.
    ///
    /// Fails with `CorruptBlob` if any stored channel does not decode; in
    /// that case nothing has been applied anywhere.
    pub fn load<S: BlobStorage>(
        &mut self,
        storage: &S,
        namespace: &str,
    ) -> Result<ExtractedSnapshot, EntigraphError> {
        let mut snapshot = ExtractedSnapshot::default();
        let mut prints = BTreeMap::new();
        for channel in Channel::ORDER {
            let key = channel.storage_key(namespace);
            let Some(bytes) = storage.read(&key)? else {
                continue;
            };
            Serializer::decode(channel, &bytes, &mut snapshot).map_err(|e| {
                EntigraphError::CorruptBlob {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?;
            prints.insert(channel, fingerprint(&bytes));
        }
        self.cache = prints;
        Ok(snapshot)
    }

    /// Restore in fixed order: state, collections, entities.
    pub fn apply(
        &self,
        session: &mut Session,
        snapshot: ExtractedSnapshot,
    ) -> Result<RestoreReport, EntigraphError> {
        let state_fields = Serializer::restore_state(session, snapshot.state);
        let collections = Serializer::restore_collections(session, snapshot.collections);
        let records = Serializer::restore_entities(session, snapshot.entities)?;
        Ok(RestoreReport {
            state_fields,
            collections,
            records,
        })
    }

    /// Forget every cached channel, forcing the next write of each.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
