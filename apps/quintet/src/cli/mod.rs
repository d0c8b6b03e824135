//! # Quintet CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show store counters
//! - `assert` - Append statements from a JSON file or inline JSON
//! - `retract` - Append a tombstone
//! - `query` - Literal read, property read or evaluation
//! - `explain` - Show requirements and the evaluation trace
//! - `export` - Export the log (canonical or JSON)
//! - `import` - Import a canonical export (file backend only)
//! - `init` - Initialize a new database
//! - `hash` - Compute the BLAKE3 hash of the canonical export

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use quintet_core::QuintetError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Storage backend for the database path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// Binary snapshot file, rewritten after every write.
    File,
    /// redb journal, appended to after every write.
    Redb,
}

impl Backend {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Redb => "redb",
        }
    }
}

/// Quintet - fact store and unification engine
///
/// Facts are appended, never changed. Queries unify, computations resolve
/// on read, triggers react.
#[derive(Parser, Debug)]
#[command(name = "quintet")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the database
    #[arg(short = 'D', long, global = true, default_value = "quintet.db")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value = "redb")]
    pub backend: Backend,

    /// Configuration file (default: ./quintet.toml if present)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to (overrides the config file)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides the config file)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show store counters
    Status,

    /// Append statements
    Assert {
        /// JSON file holding one statement or an array of statements
        #[arg(short, long, conflicts_with = "statement")]
        file: Option<PathBuf>,

        /// Inline JSON statement or array of statements
        #[arg(short, long)]
        statement: Option<String>,
    },

    /// Withdraw values of a property
    Retract {
        /// Target subject
        target: String,

        /// Property
        property: String,

        /// JSON value to withdraw; every value when omitted
        #[arg(long)]
        value: Option<String>,
    },

    /// Query a subject
    Query {
        /// Subject to query
        subject: String,

        /// Read a single property instead
        #[arg(short = 'p', long)]
        property: Option<String>,

        /// Return stored facts instead of evaluating
        #[arg(short, long)]
        literal: bool,

        /// Read as this identity
        #[arg(long = "as")]
        reader: Option<String>,

        /// Bypass access filtering and poison suppression (#FORCE)
        #[arg(long)]
        force: bool,

        /// Return every live value, not only the newest
        #[arg(long)]
        all: bool,

        /// Pin the read to a logical timestamp
        #[arg(long)]
        as_of: Option<u64>,

        /// Include system:: properties in literal reads
        #[arg(long)]
        system: bool,
    },

    /// Explain why candidates match or fail
    Explain {
        /// Subject to explain
        subject: String,

        /// Read as this identity
        #[arg(long = "as")]
        reader: Option<String>,
    },

    /// Export the log
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (canonical, json)
        #[arg(short = 't', long, default_value = "canonical")]
        format: String,
    },

    /// Import a canonical export (file backend only)
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Initialize a new empty database
    Init {
        /// Force initialization even if database exists
        #[arg(short, long)]
        force: bool,
    },

    /// Compute BLAKE3 cryptographic hash of the log
    Hash,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), QuintetError> {
    let config = crate::config::AppConfig::load(cli.config.as_deref())?;
    let store = Store {
        path: cli.database,
        backend: cli.backend,
        engine: config.engine.clone(),
    };
    let json = cli.json;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let mut server = config.server;
            if let Some(host) = host {
                server.host = host;
            }
            if let Some(port) = port {
                server.port = port;
            }
            cmd_server(&store, server).await
        }
        Some(Commands::Status) | None => cmd_status(&store, json),
        Some(Commands::Assert { file, statement }) => {
            cmd_assert(&store, json, file.as_deref(), statement.as_deref())
        }
        Some(Commands::Retract {
            target,
            property,
            value,
        }) => cmd_retract(&store, json, &target, &property, value.as_deref()),
        Some(Commands::Query {
            subject,
            property,
            literal,
            reader,
            force,
            all,
            as_of,
            system,
        }) => {
            let request = crate::api::QueryRequest {
                subject: parse_subject(&subject)?,
                mode: if literal {
                    quintet_core::QueryMode::Literal
                } else {
                    quintet_core::QueryMode::Evaluate
                },
                property: property.as_deref().map(parse_subject).transpose()?,
                force,
                all,
                as_of,
                include_system_meta: system,
            };
            cmd_query(&store, json, &request, reader.as_deref())
        }
        Some(Commands::Explain { subject, reader }) => {
            cmd_explain(&store, json, &subject, reader.as_deref())
        }
        Some(Commands::Export { output, format }) => cmd_export(&store, &output, &format),
        Some(Commands::Import { input }) => cmd_import(&store, &input),
        Some(Commands::Init { force }) => cmd_init(&store, force),
        Some(Commands::Hash) => cmd_hash(&store, json),
    }
}
