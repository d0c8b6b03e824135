//! # Quintet - Fact Server
//!
//! The main binary for the Quintet fact store.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for store operations
//! - Wall-clock driver for timer triggers
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                 apps/quintet (THE BINARY)              │
//! │                                                        │
//! │  ┌─────────────┐    ┌─────────────┐    ┌────────────┐  │
//! │  │    CLI      │    │  HTTP API   │    │   Timer    │  │
//! │  │   (clap)    │    │   (axum)    │    │  (tokio)   │  │
//! │  └──────┬──────┘    └──────┬──────┘    └─────┬──────┘  │
//! │         └──────────────────┼─────────────────┘         │
//! │                            ▼                           │
//! │                    ┌───────────────┐                   │
//! │                    │ quintet-core  │                   │
//! │                    │ (THE ENGINE)  │                   │
//! │                    └───────────────┘                   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! quintet server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! quintet status
//! quintet assert -f statements.json
//! quintet query people --as person1
//! ```

use clap::Parser;
use quintet::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // QUINTET_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("QUINTET_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "quintet=debug,quintet_core=debug,tower_http=debug"
    } else {
        "quintet=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    if !cli.quiet && !cli.json {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Quintet startup banner.
fn print_banner() {
    println!(
        r#"
   ___  _   _ ___ _   _ _____ _____ _____
  / _ \| | | |_ _| \ | |_   _| ____|_   _|
 | | | | | | || ||  \| | | | |  _|   | |
 | |_| | |_| || || |\  | | | | |___  | |
  \__\_\\___/|___|_| \_| |_| |_____| |_|

  Fact Server v{}

  Append-only • Unifying • Reactive
"#,
        env!("CARGO_PKG_VERSION")
    );
}
