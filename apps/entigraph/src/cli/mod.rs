//! # entigraph CLI Module
//!
//! This module implements the CLI interface for entigraph.
//!
//! ## Available Commands
//!
//! - `init` - Create an empty store and stamp its version
//! - `ingest` - Merge a JSON payload file, optionally into a collection
//! - `gc` - Run garbage collection passes
//! - `status` - Show store size, graph shape and bucket pressure
//! - `export` - Write the JSON wire snapshot to a file
//! - `watch` - Run the maintenance loop until Ctrl+C

mod commands;

use crate::config::DEFAULT_CONFIG_PATH;
use clap::{Parser, Subcommand, ValueEnum};
use entigraph_core::EntigraphError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// entigraph - normalized entity store
///
/// Merges nested payloads into a flat schema-driven store, evicts what is no
/// longer referenced or used, and keeps the result in a redb file.
#[derive(Parser, Debug)]
#[command(name = "entigraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Path to the store database
    #[arg(short = 'D', long, global = true, default_value = "entigraph.redb")]
    pub database: PathBuf,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// GC pass selection for the `gc` command.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassArg {
    Graph,
    Ttl,
    Lru,
    All,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty store
    Init {
        /// Replace an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Merge a JSON payload file into the store
    Ingest {
        /// Path to the payload file (object or array of objects)
        #[arg(short, long)]
        file: PathBuf,

        /// Type key the payload is normalized as
        #[arg(short = 't', long = "type")]
        type_key: String,

        /// Store the resulting ids in this collection
        #[arg(long)]
        collection: Option<String>,

        /// Collection group (for grouped collections)
        #[arg(long, requires = "collection")]
        group: Option<String>,

        /// Append to the collection instead of replacing its items
        #[arg(long, requires = "collection")]
        append: bool,

        /// Collection page size
        #[arg(long, default_value = "20")]
        limit: u32,
    },

    /// Run garbage collection
    Gc {
        /// Pass to run
        #[arg(short, long, value_enum, default_value = "all")]
        pass: PassArg,
    },

    /// Show store status
    Status,

    /// Export the store as a JSON snapshot
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Run TTL/LRU maintenance on an interval until Ctrl+C
    Watch {
        /// Seconds between passes (overrides the config)
        #[arg(short, long)]
        interval: Option<u64>,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), EntigraphError> {
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&cli.config, &cli.database, force),
        Some(Commands::Ingest {
            file,
            type_key,
            collection,
            group,
            append,
            limit,
        }) => {
            let target = IngestTarget {
                type_key,
                collection,
                group,
                append,
                limit,
            };
            cmd_ingest(&cli.config, &cli.database, json_mode, &file, &target)
        }
        Some(Commands::Gc { pass }) => cmd_gc(&cli.config, &cli.database, json_mode, pass),
        Some(Commands::Status) => cmd_status(&cli.config, &cli.database, json_mode),
        Some(Commands::Export { output }) => cmd_export(&cli.config, &cli.database, &output),
        Some(Commands::Watch { interval }) => {
            cmd_watch(&cli.config, &cli.database, interval).await
        }
        None => {
            // No subcommand - show status by default
            cmd_status(&cli.config, &cli.database, json_mode)
        }
    }
}
