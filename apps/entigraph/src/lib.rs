//! # entigraph
//!
//! Command line front end for `entigraph-core`: configuration loading and
//! the CLI commands. The binary in `main.rs` only wires logging and parses
//! arguments.

pub mod cli;
pub mod config;
