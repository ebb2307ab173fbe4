//! # Quarry CLI
//!
//! Command-line interface for searching a vault of notes.
//!
//! ## Commands
//!
//! - `quarry index` - Build the index (or load it from the stored snapshot)
//! - `quarry query <query>` - Rank files matching a query
//! - `quarry lines <path> <query>` - Show the best matching lines of one file
//! - `quarry status` - Show index status and statistics
//! - `quarry watch` - Keep the index current while files change
//! - `quarry clear` - Remove stored index data
//!
//! ## Example Usage
//!
//! ```bash
//! # Index a vault
//! quarry --vault ~/notes index
//!
//! # Search, turning prefix matching off for this query
//! quarry --vault ~/notes query "/np rust ownership"
//!
//! # Best lines of a single note
//! quarry --vault ~/notes lines rust/borrowing.md "lifetimes"
//! ```

mod app;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Quarry - Lexical search for your notes
#[derive(Parser)]
#[command(name = "quarry")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Vault directory (overrides `general.vault_path`)
    #[arg(long, global = true, env = "QUARRY_VAULT")]
    vault: Option<PathBuf>,

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
    /// Build the index, or load it from the stored snapshot
    Index {
        /// Rebuild from the vault even if a snapshot exists
        #[arg(short, long)]
        force: bool,

        /// Restore the backup snapshot before loading
        #[arg(long, conflicts_with = "force")]
        from_backup: bool,
    },

    /// Rank files matching a query
    #[command(alias = "q")]
    Query {
        /// Query text, optionally led by commands such as /np or /af
        query: String,

        /// Maximum number of results to show
        #[arg(short, long, default_value = "20")]
        limit: usize,

        /// Match any term instead of all terms
        #[arg(long)]
        or: bool,

        /// Best lines to show under each file
        #[arg(short = 'n', long, default_value = "0")]
        lines: usize,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show the best matching lines of one file
    Lines {
        /// Vault-relative path of the file
        path: String,

        /// Query text
        query: String,

        /// Maximum number of lines to show
        #[arg(short = 'n', long, default_value = "5")]
        max_lines: usize,

        /// Print the surrounding paragraph of each line
        #[arg(short = 'C', long)]
        context: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        output: OutputFormat,
    },

    /// Show index status and statistics
    Status,

    /// Watch the vault and keep the index current
    Watch {
        /// Quiet period in milliseconds before pending changes are applied
        #[arg(long, default_value = "1500")]
        idle_ms: u64,
    },

    /// Remove stored index data
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Clone, Copy, Debug, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => quarry_core::Config::load_from(path)?,
        None => quarry_core::Config::load()?,
    };

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

    let vault = cli.vault;

    match cli.command {
        Commands::Index { force, from_backup } => {
            commands::index::run(config, vault, force, from_backup)
        }
        Commands::Query {
            query,
            limit,
            or,
            lines,
            output,
        } => commands::query::run(config, vault, &query, limit, or, lines, output),
        Commands::Lines {
            path,
            query,
            max_lines,
            context,
            output,
        } => commands::lines::run(config, vault, &path, &query, max_lines, context, output),
        Commands::Status => commands::status::run(config, vault),
        Commands::Watch { idle_ms } => commands::watch::run(config, vault, idle_ms),
        Commands::Clear { yes } => commands::clear::run(config, yes),
    }
}
