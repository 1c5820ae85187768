//! # entigraph - Normalized Entity Store
//!
//! The command line binary for the entigraph entity store.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │              apps/entigraph (THE BINARY)             │
//! │                                                      │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────┐   │
//! │  │    CLI      │  │   Config    │  │ Maintenance │   │
//! │  │   (clap)    │  │   (toml)    │  │   (tokio)   │   │
//! │  └──────┬──────┘  └──────┬──────┘  └──────┬──────┘   │
//! │         └────────────────┼────────────────┘          │
//! │                          ▼                           │
//! │                 ┌────────────────┐                   │
//! │                 │ entigraph-core │                   │
//! │                 │  (THE ENGINE)  │                   │
//! │                 └────────────────┘                   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! entigraph init
//! entigraph ingest -f feed.json -t post --collection feed
//! entigraph gc --pass all
//! entigraph status --json-mode
//! entigraph watch --interval 30
//! ```

use clap::Parser;
use entigraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // ENTIGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format =
        std::env::var("ENTIGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_env("ENTIGRAPH_LOG")
        .or_else(|_| tracing_subscriber::EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| "entigraph=info,entigraph_core=info".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
