use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Main CLI interface for `insightlink`
#[derive(Parser)]
#[command(name = "insightlink")]
#[command(version = crate::VERSION)]
#[command(about = "insightlink - database connection manager for the analytics backend")]
#[command(
    long_about = "Connects to the analytics document store, reuses live sessions and retries TLS handshake failures"
)]
pub struct Cli {
    /// Configuration file (defaults to ./insightlink.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Connect once and report connection health
    Check,
    /// Connect and report state changes until interrupted
    Watch,
    /// Show resolved connection options with credentials masked
    ShowConfig,
}

impl Cli {
    /// Parse command line arguments
    #[must_use]
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }
}
