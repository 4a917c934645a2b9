//! rentsync CLI
//!
//! Command-line tools for looking into a replica directory.
//!
//! # Commands
//!
//! - `inspect` - Display replica statistics and the checkpoint
//! - `list` - Print the live records of a collection
//! - `dump-changes` - Dump pending change log entries

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// rentsync replica tools.
#[derive(Parser)]
#[command(name = "rentsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the replica directory
    #[arg(global = true, short, long)]
    path: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display replica statistics and the checkpoint
    Inspect {
        /// Show per-collection counts
        #[arg(short, long)]
        collections: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Print the live records of a collection
    List {
        /// Collection name, e.g. cars
        collection: String,

        /// Include tombstones
        #[arg(short, long)]
        deleted: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Dump pending change log entries
    DumpChanges {
        /// Maximum number of entries to dump
        #[arg(short, long)]
        limit: Option<usize>,

        /// Show entries as they would be pushed
        #[arg(short, long)]
        coalesced: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect {
            collections,
            format,
        } => {
            let path = cli.path.ok_or("Replica path required for inspect")?;
            commands::inspect::run(&path, collections, &format)?;
        }
        Commands::List {
            collection,
            deleted,
            format,
        } => {
            let path = cli.path.ok_or("Replica path required for list")?;
            commands::list::run(&path, &collection, deleted, &format)?;
        }
        Commands::DumpChanges {
            limit,
            coalesced,
            format,
        } => {
            let path = cli.path.ok_or("Replica path required for dump-changes")?;
            commands::dump_changes::run(&path, limit, coalesced, &format)?;
        }
        Commands::Version => {
            println!("rentsync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
