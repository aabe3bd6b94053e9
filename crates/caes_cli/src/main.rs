//! caes-sync daemon
//!
//! Keeps a column-family store and a document-search store converged.
//!
//! # Commands
//!
//! - `run` - Poll both stores until SIGINT or SIGTERM
//! - `once` - Run a single sync pass from a given timestamp
//! - `check` - Validate the configuration file and exit

mod config;
mod daemon;
mod signal;

use clap::{Parser, Subcommand};
use config::DaemonConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Column store / search store synchronization daemon.
#[derive(Parser)]
#[command(name = "caes-sync-daemon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll both stores until stopped
    Run,

    /// Run a single sync pass
    Once {
        /// Lower bound (epoch seconds, inclusive) of the changes to sync
        #[arg(short, long)]
        since: i64,
    },

    /// Validate the configuration file and exit
    Check,

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let load = |path: Option<PathBuf>| -> Result<DaemonConfig, Box<dyn std::error::Error>> {
        let path = path.ok_or("Configuration file required (--config <path>)")?;
        Ok(DaemonConfig::load(&path)?)
    };

    match cli.command {
        Commands::Run => daemon::run(&load(cli.config)?)?,
        Commands::Once { since } => daemon::once(&load(cli.config)?, since)?,
        Commands::Check => daemon::check(&load(cli.config)?)?,
        Commands::Version => {
            println!("caes-sync-daemon v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
