//! # Quasar CLI
//!
//! Command-line front end for the Quasar launcher.
//!
//! ## Commands
//!
//! - `quasar query <text>` - Run one search to completion and print the ranked rows
//! - `quasar interactive` - Read search text line by line from stdin
//!
//! ## Example Usage
//!
//! ```bash
//! # Top ten matches for "fire" as JSON
//! quasar query fire --limit 10 --json
//!
//! # Launch the best match
//! quasar query firefox --launch
//!
//! # Type-ahead session
//! quasar interactive
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use quasar_core::Config;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Quasar - search applications and files as you type
#[derive(Parser)]
#[command(name = "quasar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search once and print the ranked results
    Query {
        /// Search text
        text: String,

        /// Maximum number of results to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Print results as JSON
        #[arg(short, long)]
        json: bool,

        /// Launch the top result
        #[arg(long)]
        launch: bool,

        /// Stop searching after this many milliseconds and keep what arrived
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Read search text from stdin, one change per line
    #[command(alias = "i")]
    Interactive,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    // Setup logging; stdout is reserved for results
    let log_level = if cli.quiet {
        "error".to_string()
    } else {
        match cli.verbose {
            0 => config.general.log_level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .init();

    match cli.command {
        Commands::Query {
            text,
            limit,
            json,
            launch,
            timeout_ms,
        } => commands::query::run(config, &text, limit, json, launch, timeout_ms),
        Commands::Interactive => commands::interactive::run(config),
    }
}
