//! # Engine Primitives
//!
//! Hardcoded constants for the entigraph engine.
//!
//! These values are compiled into the binary; anything a deployment should
//! tune lives in `GcConfig` / `PersistConfig` instead, with these as defaults.

/// Magic bytes for the persisted channel header.
///
/// - Channel blob = Magic Bytes ("EGPS") + Version (u8) before payload.
pub const MAGIC_BYTES: &[u8; 4] = b"EGPS";

/// Current channel encoding version.
///
/// Increment this when making breaking changes to the channel encoding.
/// This is independent of the application-level store version in
/// `PersistConfig::version`, which domain code bumps when its data shape changes.
pub const FORMAT_VERSION: u8 = 1;

/// Field name the default id rule reads.
pub const DEFAULT_ID_FIELD: &str = "id";

/// Suffix appended to a cardinality-one relation name in a normalized record.
pub const ONE_SUFFIX: &str = "Id";

/// Suffix appended to a cardinality-many relation name in a normalized record.
pub const MANY_SUFFIX: &str = "Ids";

/// Separator used by composite id rules.
pub const COMPOSITE_ID_SEPARATOR: &str = ":";

/// Maximum nesting depth the normalizer follows inside one payload.
///
/// Nested records below this depth are skipped as data errors.
pub const MAX_NORMALIZE_DEPTH: usize = 64;

/// Default time-to-live of a record since its last access (7 days).
pub const DEFAULT_TTL_MS: u64 = 7 * 24 * 60 * 60 * 1000;

/// Default maximum bucket size before LRU trimming kicks in.
pub const DEFAULT_MAX_RECORDS: usize = 1000;

/// Default storage namespace for persisted channels.
pub const DEFAULT_NAMESPACE: &str = "entigraph";

/// Default application store version.
pub const DEFAULT_STORE_VERSION: u32 = 1;

/// Default minimum interval between two persisted writes.
pub const DEFAULT_THROTTLE_MS: u64 = 1000;
