//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Coding-problem session tracker.
///
/// Turns raw page activity signals into session lifecycle events and
/// reliably delivers them to a collector, even through network outages.
#[derive(Debug, Parser)]
#[command(name = "gt", version, about, long_about = None)]
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
    /// Run the session engine, reading reporter messages from stdin.
    ///
    /// Each line is one JSON envelope:
    /// `{"tabId": "41", "message": {"type": "ACTIVITY_PING", "data": {...}}}`.
    /// EOF ends every session and flushes the retry queue to disk.
    Run,

    /// Check connectivity to the public submissions feed.
    CheckFeed {
        /// Username to query (defaults to the configured one).
        #[arg(long)]
        username: Option<String>,
    },
}
