//! # Persistence Format
//!
//! Binary framing for persisted channels.
//!
//! Format: Header (5 bytes) + postcard-serialized channel payload.
//! - 4 bytes: Magic ("EGPS")
//! - 1 byte: Version
//!
//! The version stamp key is not framed: it is a bare postcard `u32`, so a
//! future header change can never make the stamp itself unreadable.
//!
//! Size and header are validated before any payload is deserialized.

use crate::{EntigraphError, primitives};
use serde::Serialize;
use serde::de::DeserializeOwned;

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum accepted size of one stored channel blob (256 MB).
pub const MAX_PERSISTENCE_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

const HEADER_SIZE: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The header that precedes every channel payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PersistenceHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl PersistenceHeader {
    /// Header for the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate magic and version.
    pub fn validate(&self) -> Result<(), EntigraphError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(EntigraphError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(EntigraphError::DeserializationError(format!(
                "Unsupported format version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EntigraphError> {
        let Some(header) = bytes.get(0..HEADER_SIZE) else {
            return Err(EntigraphError::DeserializationError(
                "Header too short".to_string(),
            ));
        };
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&header[0..4]);
        Ok(Self {
            magic,
            version: header[4],
        })
    }
}

impl Default for PersistenceHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// CHANNELS
// =============================================================================

/// Encode a channel payload (header + postcard).
pub fn encode_channel<T: Serialize>(value: &T) -> Result<Vec<u8>, EntigraphError> {
    let payload = postcard::to_stdvec(value)
        .map_err(|e| EntigraphError::SerializationError(e.to_string()))?;

    let mut bytes = Vec::with_capacity(HEADER_SIZE + payload.len());
    bytes.extend_from_slice(&PersistenceHeader::new().to_bytes());
    bytes.extend_from_slice(&payload);
    Ok(bytes)
}

/// Decode a channel payload after checking size and header.
pub fn decode_channel<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EntigraphError> {
    if bytes.len() > MAX_PERSISTENCE_PAYLOAD_SIZE {
        return Err(EntigraphError::DeserializationError(format!(
            "Blob size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_PERSISTENCE_PAYLOAD_SIZE
        )));
    }

    PersistenceHeader::from_bytes(bytes)?.validate()?;

    postcard::from_bytes(&bytes[HEADER_SIZE..]).map_err(|e| {
        EntigraphError::DeserializationError(format!("Failed to decode channel payload: {}", e))
    })
}

/// Encode the store version stamp.
pub fn encode_version(version: u32) -> Result<Vec<u8>, EntigraphError> {
    postcard::to_stdvec(&version).map_err(|e| EntigraphError::SerializationError(e.to_string()))
}

/// Decode the store version stamp.
pub fn decode_version(bytes: &[u8]) -> Result<u32, EntigraphError> {
    postcard::from_bytes(bytes).map_err(|e| {
        EntigraphError::DeserializationError(format!("Failed to decode version stamp: {}", e))
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FieldValue;
    use std::collections::BTreeMap;

    #[test]
    fn header_roundtrip() {
        let bytes = PersistenceHeader::new().to_bytes();
        let restored = PersistenceHeader::from_bytes(&bytes).expect("parse header");

        assert_eq!(restored.magic, *primitives::MAGIC_BYTES);
        assert_eq!(restored.version, primitives::FORMAT_VERSION);
    }

    #[test]
    fn channel_reencodes_bit_exact() {
        let state = BTreeMap::from([
            ("filter".to_string(), FieldValue::from("recent")),
            ("page".to_string(), FieldValue::Int(3)),
        ]);
        let bytes1 = encode_channel(&state).expect("encode");
        let restored: BTreeMap<String, FieldValue> = decode_channel(&bytes1).expect("decode");
        let bytes2 = encode_channel(&restored).expect("encode again");

        assert_eq!(bytes1, bytes2);
    }

    #[test]
    fn invalid_magic_and_short_blobs_are_rejected() {
        let mut bytes = vec![0u8; 10];
        bytes[0..4].copy_from_slice(b"XXXX");
        assert!(decode_channel::<u32>(&bytes).is_err());
        assert!(decode_channel::<u32>(b"EGP").is_err());
    }

    #[test]
    fn future_format_version_is_rejected() {
        let mut bytes = encode_channel(&7u32).expect("encode");
        bytes[4] = primitives::FORMAT_VERSION.wrapping_add(1);
        assert!(matches!(
            decode_channel::<u32>(&bytes),
            Err(EntigraphError::DeserializationError(_))
        ));
    }

    #[test]
    fn version_stamp_roundtrip() {
        let bytes = encode_version(42).expect("encode");
        assert_eq!(decode_version(&bytes).expect("decode"), 42);
        assert!(decode_version(&[]).is_err());
    }
}
