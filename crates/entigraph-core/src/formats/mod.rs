//! # Formats Module
//!
//! Byte-level encoding of persisted channels.
//!
//! Storage backends only move opaque blobs; everything about how a channel
//! looks on disk (header, size limits, payload encoding) lives here.

mod persistence;

pub use persistence::{
    MAX_PERSISTENCE_PAYLOAD_SIZE, PersistenceHeader, decode_channel, decode_version,
    encode_channel, encode_version,
};
