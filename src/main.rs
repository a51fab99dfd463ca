//! # logsift CLI
//!
//! ## Usage
//!
//! ```bash
//! logsift --config ./config/logsift.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `logsift init` | Create the SQLite database and schema |
//! | `logsift ingest <path>` | Ingest an access log, reporting progress |
//! | `logsift status <name>` | Print a run's status as JSON |
//! | `logsift files` | List ingested files |
//! | `logsift logs` | Query stored rows with filters |
//! | `logsift delete <name>` | Delete a file and its rows |
//! | `logsift reset` | Delete everything |
//! | `logsift stats` | Summary statistics |
//! | `logsift serve` | Start the HTTP server |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use logsift::config;
use logsift::db;
use logsift::ingest;
use logsift::logging;
use logsift::migrate;
use logsift::progress::ProgressMode;
use logsift::query::{self, LogFilter};
use logsift::server;
use logsift::sqlite_store::SqliteStore;
use logsift::stats;
use logsift::status::StatusQuery;
use logsift_core::tracker::ProgressTracker;

/// logsift: access-log ingestion with live progress.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/logsift.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "logsift",
    about = "logsift: ingest web-server access logs into SQLite and query them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/logsift.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file with the `logs` and `files` tables.
    /// Running it again is safe.
    Init,

    /// Ingest one access-log file.
    ///
    /// Lines that do not match the access-log format are skipped, as are
    /// repeated requests within the file. Exits non-zero if the run fails.
    Ingest {
        /// Path to the log file.
        path: PathBuf,

        /// Logical name to store the file under (defaults to the file name).
        /// A timestamp suffix is added if the name is taken.
        #[arg(long)]
        name: Option<String>,

        /// Progress output on stderr. Defaults to `human` on a terminal,
        /// `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Print the status of a run as JSON.
    ///
    /// Runs belong to the process that started them, so from a fresh
    /// process only the persisted record count is visible.
    Status {
        /// Logical file name.
        name: String,
    },

    /// List ingested files.
    Files,

    /// Query stored log rows, 100 per page, newest first.
    Logs {
        /// Only rows from this file.
        #[arg(long = "file")]
        file_name: Option<String>,

        /// Only rows with this status code.
        #[arg(long = "status")]
        status_code: Option<i64>,

        /// Only rows whose client address contains this text.
        #[arg(long)]
        ip: Option<String>,

        /// Only rows with this request method.
        #[arg(long = "method")]
        request_type: Option<String>,

        /// Page number, starting at 1.
        #[arg(long)]
        page: Option<i64>,
    },

    /// Delete a file and all of its rows.
    Delete {
        /// Logical file name.
        name: String,
    },

    /// Delete all files and rows.
    Reset,

    /// Show summary statistics.
    Stats,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Ingest {
            path,
            name,
            progress,
        } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            ingest::run_ingest(&cfg, &path, name.as_deref(), mode).await?;
        }
        Commands::Status { name } => {
            let pool = db::connect(&cfg).await?;
            let store = Arc::new(SqliteStore::new(pool.clone()));
            let tracker = ProgressTracker::new(cfg.ingest.retention());
            let status = StatusQuery::new(tracker, store).status(&name).await;
            pool.close().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Commands::Files => {
            query::run_list_files(&cfg).await?;
        }
        Commands::Logs {
            file_name,
            status_code,
            ip,
            request_type,
            page,
        } => {
            let filter = LogFilter {
                file_name,
                status_code,
                ip,
                request_type,
                page,
            };
            query::run_query_logs(&cfg, &filter).await?;
        }
        Commands::Delete { name } => {
            query::run_delete(&cfg, &name).await?;
        }
        Commands::Reset => {
            query::run_reset(&cfg).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
