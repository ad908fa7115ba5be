//! # convo-sync
//!
//! CLI tool for mirroring recorded conversation feeds into a local SQLite store.
//!
//! ## Commands
//!
//! - `init`: Write a default config and create the database
//! - `replay`: Apply a JSON-lines feed of change batches
//! - `status`: Show record counts and schema compatibility
//!
//! ## Example
//!
//! ```bash
//! # Initialize config and database
//! convo-sync init
//!
//! # Apply a recorded feed
//! convo-sync replay feed.jsonl
//!
//! # Queue everything, then apply on resume
//! convo-sync replay feed.jsonl --suspended
//!
//! # Inspect the store
//! convo-sync status
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{init, replay, status};
use config::{Config, CONFIG_FILE};

/// CLI tool for mirroring recorded conversation feeds into a local store.
#[derive(Parser, Debug)]
#[command(name = "convo-sync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Data directory holding the config and database
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Config file (default: <data-dir>/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level regardless of RUST_LOG and config
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config and create the database
    Init,

    /// Replay a JSON-lines feed of change batches into the store
    Replay {
        /// Feed file, one batch per line
        file: PathBuf,

        /// Queue every batch first and apply them on resume
        #[arg(long)]
        suspended: bool,
    },

    /// Show record counts and schema compatibility
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine data directory
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => default_data_dir()?,
    };

    tokio::fs::create_dir_all(&data_dir)
        .await
        .context("Failed to create data directory")?;

    let config_path = cli.config.unwrap_or_else(|| data_dir.join(CONFIG_FILE));
    let config = Config::load_or_default(&config_path)?;

    init_logging(cli.verbose, &config.logging.log_level);

    match cli.command {
        Commands::Init => {
            init::run(&data_dir, &config_path).await?;
        }
        Commands::Replay { file, suspended } => {
            replay::run(&data_dir, &config, &file, suspended).await?;
        }
        Commands::Status => {
            if let status::StoreStatus::Present {
                schema_error: Some(e),
                ..
            } = status::run(&data_dir, &config_path, &config).await?
            {
                anyhow::bail!("Store schema is incompatible: {e}");
            }
        }
    }

    Ok(())
}

/// Install the tracing subscriber. Logs go to stderr.
fn init_logging(verbose: bool, log_level: &str) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Get the default data directory for convo-sync.
fn default_data_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("io", "convo-sync", "convo-sync")
        .context("Could not determine home directory")?;
    Ok(dirs.data_dir().to_path_buf())
}
