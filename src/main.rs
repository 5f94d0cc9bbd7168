//! # Roam Sanity CLI (`rsp`)
//!
//! The `rsp` binary imports crawler output, maintains the search index, and
//! serves the search API.
//!
//! ## Usage
//!
//! ```bash
//! rsp --config ./config/rsp.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rsp init` | Create the raw store directory and the search index |
//! | `rsp import <source> <file>` | Normalize a raw export into the raw store |
//! | `rsp rebuild` | Drop the index and repopulate it from the raw store |
//! | `rsp search "<query>"` | Run a query and print one page of results |
//! | `rsp serve` | Start the HTTP search API |
//!
//! ## Examples
//!
//! ```bash
//! # Import a Roam export and index the new pages right away
//! rsp import roam-research ./help.json --database help --index
//!
//! # Import scraped tweets (JSON Lines) into the store only
//! rsp import twitter ./tweets.jsonl
//!
//! # Rebuild the index with JSON progress on stderr
//! rsp rebuild --progress json
//!
//! # Second page of results, as the API would return it
//! rsp search "daily notes" --offset 50 --html
//! ```
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default `info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roam_sanity::config::{self, Config};
use roam_sanity::models::Source;
use roam_sanity::progress::ProgressMode;
use roam_sanity::query::run_search;
use roam_sanity::{ingest, server};

/// Roam Sanity CLI: one search box for Roam pages, tweets, and Slack threads.
#[derive(Parser)]
#[command(
    name = "rsp",
    about = "Roam Sanity: a search engine over Roam Research pages, tweets, and Slack threads",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/rsp.toml` when present; built-in defaults apply
    /// otherwise. `RSP_DATA_PATH` and `RSP_SEARCH_URL` override the file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the raw store directory and the search index.
    ///
    /// Waits for the search backend to come up first. Idempotent.
    Init,

    /// Normalize a raw export and save its documents to the raw store.
    ///
    /// The file may be a JSON array, a single JSON object, or JSON Lines.
    /// Malformed records are logged and skipped.
    Import {
        /// Source of the records: `roam-research`, `twitter`, or `slack`.
        #[arg(value_parser = parse_source)]
        source: Source,

        /// Path to the raw export.
        file: PathBuf,

        /// Roam database the pages belong to (required for `roam-research`).
        #[arg(long)]
        database: Option<String>,

        /// Also add documents the index does not hold yet.
        #[arg(long)]
        index: bool,
    },

    /// Drop the search index and repopulate it from the raw store.
    Rebuild {
        /// Raw store root (overrides `[store].path` and `RSP_DATA_PATH`).
        #[arg(long)]
        data_path: Option<PathBuf>,

        /// Progress on stderr: `off`, `human`, or `json`. Defaults to `human` on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Search indexed documents and print one page of results.
    Search {
        /// The search query string.
        query: String,

        /// Number of ranked results to skip.
        #[arg(long, default_value_t = 0)]
        offset: usize,

        /// Print the `/search` JSON response (rendered HTML) instead of text.
        #[arg(long)]
        html: bool,
    },

    /// Start the HTTP search API on `[server].bind`.
    Serve,
}

fn parse_source(s: &str) -> Result<Source, String> {
    s.parse::<Source>().map_err(|e| e.to_string())
}

fn parse_progress(s: Option<&str>) -> anyhow::Result<ProgressMode> {
    Ok(match s {
        None => ProgressMode::default_for_tty(),
        Some("off") => ProgressMode::Off,
        Some("human") => ProgressMode::Human,
        Some("json") => ProgressMode::Json,
        Some(other) => anyhow::bail!(
            "Unknown progress mode: '{}'. Use off, human, or json.",
            other
        ),
    })
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut cfg: Config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Init => {
            ingest::run_init(&cfg).await?;
        }
        Commands::Import {
            source,
            file,
            database,
            index,
        } => {
            ingest::run_import(&cfg, source, &file, database.as_deref(), index).await?;
        }
        Commands::Rebuild {
            data_path,
            progress,
        } => {
            if let Some(path) = data_path {
                cfg.store.path = Some(path);
            }
            let reporter = parse_progress(progress.as_deref())?.reporter();
            ingest::run_rebuild(&cfg, reporter.as_ref()).await?;
        }
        Commands::Search {
            query,
            offset,
            html,
        } => {
            run_search(&cfg, &query, offset, html).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
