//! # entigraph-core
//!
//! The normalized entity graph for entigraph - THE ENGINE.
//!
//! This crate turns nested raw payloads into a flat, schema-driven store of
//! records keyed by `(typeKey, id)`, keeps ordered collections over it,
//! evicts what is no longer needed (reachability, TTL, LRU), and persists a
//! session into three versioned channels.
//!
//! ## Data Flow
//!
//! raw payload -> `EntitiesStore::merge` -> snapshot ->
//! - `PersistenceRuntime::observe` writes changed channels
//! - `GarbageCollector` builds a `GcGraph`, walks it and evicts
//!
//! ## Architectural Constraints
//!
//! - Single-threaded and synchronous: no async, no network dependencies
//! - `BTreeMap`/`BTreeSet` only, for deterministic iteration everywhere
//! - The only snapshot mutators are merge, reset and GC removal
//! - No global state: every component receives its store explicitly

// =============================================================================
// MODULES
// =============================================================================

pub mod clock;
pub mod collection;
pub mod entities;
pub mod formats;
pub mod gc;
pub mod graph;
pub mod normalizer;
pub mod notify;
pub mod persist;
pub mod primitives;
pub mod schema;
pub mod session;
pub mod snapshot;
pub mod state;
pub mod storage;
pub mod system;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{EntigraphError, EntityId, EntityRef, FieldValue, IdsByType, Meta, TypeKey};

// =============================================================================
// RE-EXPORTS: Entity Store
// =============================================================================

pub use clock::{Clock, ManualClock, SystemClock};
pub use collection::{CollectionKey, CollectionRegistry, CollectionSnapshot, EntityCollection};
pub use entities::{EntitiesStore, Entity, MergeReport, Model};
pub use normalizer::{Normalized, NormalizedEntry, Normalizer};
pub use notify::{ChangeEvent, ChangeFeed, SubscriptionId};
pub use schema::{
    Cardinality, IdRule, RawObject, Relation, RelationDecl, Schema, SchemaDecl, SchemaRegistry,
};
pub use session::{Revisions, Session};
pub use snapshot::{Bucket, Record, Snapshot};
pub use state::{FieldKind, StateFields};

// =============================================================================
// RE-EXPORTS: Garbage Collection
// =============================================================================

pub use gc::{
    Analyzer, GarbageCollector, GcConfig, GcPass, GcPolicy, GcReport, GraphWalker, WalkResult,
};
pub use graph::{GcGraph, GcNode, NodeKind};

// =============================================================================
// RE-EXPORTS: Persistence
// =============================================================================

pub use formats::{PersistenceHeader, decode_channel, encode_channel};
pub use persist::{
    BootstrapReport, Channel, PersistConfig, PersistenceRuntime, RestoreReport, WipeReason,
    WriteReport,
};
pub use storage::{BlobStorage, MemoryStorage, RedbStorage};

// =============================================================================
// RE-EXPORTS: System (from system module)
// =============================================================================

pub use system::{BucketPressure, SessionStatus, SnapshotMetrics};
