//! Top-level argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Speak chat messages aloud through a chain of TTS engines.
#[derive(Parser)]
#[command(name = "chatvox")]
#[command(about = "Chat-to-speech orchestrator")]
#[command(version)]
pub struct Cli {
    /// Config file with settings and provider definitions
    #[arg(short = 'c', long = "config", env = "CHATVOX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory for permissions, cost ledger and cache
    #[arg(long = "data-dir", env = "CHATVOX_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}
