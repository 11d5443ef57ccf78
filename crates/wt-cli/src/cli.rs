//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Weight tracker.
///
/// Connects to a weight-scale server, records items automatically once their
/// weight settles, and exports the session as CSV.
#[derive(Debug, Parser)]
#[command(name = "wt", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to the scale server and run the operator console.
    Run {
        /// Print status notifications as JSON lines.
        #[arg(long)]
        json: bool,

        /// Scale server URL (overrides config).
        #[arg(long)]
        url: Option<String>,
    },

    /// Record a session from a captured stream of server frames (JSONL).
    Replay {
        /// Capture file, one server frame per line.
        input: PathBuf,

        /// Write the CSV export here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the totals of an exported CSV file.
    Summarize {
        /// Exported CSV file.
        file: PathBuf,
    },
}
