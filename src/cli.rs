//! CLI definitions for TabPilot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// TabPilot CLI.
#[derive(Parser)]
#[command(name = "tabpilot")]
#[command(about = "Runs AI chat queries in background tabs of your own browser")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/tabpilot.toml", global = true, env = "TABPILOT_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Drive the queue against the browser until interrupted
    Run {
        /// JSON array of tasks to enqueue before starting
        #[arg(long)]
        tasks: Option<PathBuf>,

        /// Stop once nothing is pending or running
        #[arg(long)]
        until_empty: bool,
    },

    /// Show the persisted queue
    Status {
        /// List every task, not just the counts
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the error category for a failure message
    Classify {
        /// Error text
        text: String,
    },

    /// Show where results are written and how many there are
    Results,
}
