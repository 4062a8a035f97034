//! # loglens CLI
//!
//! ## Usage
//!
//! ```bash
//! loglens --config ./config/loglens.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `loglens init` | Create the database schema and the log file if missing |
//! | `loglens ingest` | Reconcile the last lines of the log once, then exit |
//! | `loglens watch` | Gap-fill, then tail the log until Ctrl-C |
//! | `loglens search "<query>"` | Show the lines retrieval would use |
//! | `loglens ask "<question>"` | Answer one question |
//! | `loglens chat` | Ingest in the background and answer questions from stdin |
//! | `loglens serve` | HTTP API with background ingest |
//! | `loglens generate` | Append synthetic log lines for demos |

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use loglens::config;
use loglens::sqlite_store::SqliteStore;
use loglens::generate::{self, GenerateOptions};
use loglens::{ask, ingest, logfile, search, server};

/// Ask natural-language questions about a live log file.
#[derive(Parser)]
#[command(name = "loglens", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/loglens.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema and an empty log file if none exists.
    ///
    /// Idempotent; running it again changes nothing.
    Init,

    /// Reconcile the tail of the log with the index once.
    Ingest,

    /// Run the ingester in the foreground (gap-fill, then live tailing).
    Watch,

    /// Retrieve the lines most similar to a query.
    Search {
        query: String,

        /// Number of lines to return (default: `[retrieval].top_k`).
        #[arg(long)]
        limit: Option<usize>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer one question about the logs.
    Ask {
        question: String,

        /// Wait for the full answer instead of streaming it.
        #[arg(long)]
        no_stream: bool,
    },

    /// Interactive question loop on stdin, with ingestion in the background.
    Chat,

    /// Start the HTTP API (with ingestion in the background).
    Serve,

    /// Append random log lines to the configured log file.
    Generate {
        /// Stop after this many lines (default: run until Ctrl-C).
        #[arg(long)]
        count: Option<u64>,

        /// Shortest pause between lines, in milliseconds.
        #[arg(long, default_value_t = 1000)]
        min_delay_ms: u64,

        /// Longest pause between lines, in milliseconds.
        #[arg(long, default_value_t = 4000)]
        max_delay_ms: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    config::init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let store = SqliteStore::open(&cfg).await?;
            store.close().await;
            println!("Database initialized successfully.");
            match logfile::ensure_log_file(&cfg.log.path) {
                Ok(()) => println!("Log file ready: {}", cfg.log.path.display()),
                Err(e) => {
                    tracing::warn!(error = %format!("{:#}", e), "log file not created");
                    println!("Log file not created: {:#}", e);
                }
            }
        }
        Commands::Ingest => {
            ingest::run_ingest(&cfg).await?;
        }
        Commands::Watch => {
            ingest::run_watch(&cfg).await?;
        }
        Commands::Search { query, limit, json } => {
            search::run_search(&cfg, &query, limit, json).await?;
        }
        Commands::Ask {
            question,
            no_stream,
        } => {
            ask::run_ask(&cfg, &question, no_stream).await?;
        }
        Commands::Chat => {
            ask::run_chat(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Generate {
            count,
            min_delay_ms,
            max_delay_ms,
        } => {
            let options = GenerateOptions {
                count,
                min_delay: Duration::from_millis(min_delay_ms),
                max_delay: Duration::from_millis(max_delay_ms),
            };
            generate::run_generate(&cfg, options).await?;
        }
    }

    Ok(())
}
