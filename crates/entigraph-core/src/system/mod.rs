//! # System Module
//!
//! Snapshot statistics for status reporting.
//!
//! Everything here is read-only and integer-only; it never changes what the
//! store or the collector do.

mod metrics;

pub use metrics::*;
