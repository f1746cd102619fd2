//! Management command line for a memocache directory.

pub mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// memocache - inspect and maintain a persistent TTL cache directory.
#[derive(Parser, Debug)]
#[command(name = "memocache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file.
    #[arg(short, long, default_value = "memocache.toml")]
    pub config: PathBuf,

    /// Cache directory (overrides the configuration file).
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// Verbose mode.
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode.
    #[arg(short, long)]
    pub quiet: bool,

    /// Command to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Writes a default configuration file and creates the cache directory.
    Init {
        /// Target directory for memocache.toml (default: current directory).
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Shows entry counts and disk usage.
    Stats,

    /// Lists index entries, soonest expiration first.
    List {
        /// Maximum number of entries to show.
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Shows the index record of a key.
    Inspect {
        /// Cache key.
        key: String,
    },

    /// Prints the cached value of a key as JSON.
    Get {
        /// Cache key.
        key: String,
    },

    /// Deletes a key and its blob.
    Delete {
        /// Cache key.
        key: String,
    },

    /// Removes every expired entry.
    Prune,

    /// Removes every entry.
    Clear {
        /// Confirm the operation.
        #[arg(long)]
        yes: bool,
    },

    /// Checks the directory for dangling rows and orphaned blobs.
    Doctor,

    /// Prints the effective configuration.
    Config,

    /// Shows version.
    Version,
}
