use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "dnstrail", version, about = "DNS query log monitor and analytics API")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the monitor (default)
    Start,

    /// Test configuration file validity
    Test,

    /// Display ingestion and query statistics from the store
    Stats {
        /// Number of hours to analyze (default: 24)
        #[arg(short = 'n', long, default_value = "24")]
        hours: u32,
    },

    /// Show version information
    Version,
}

impl Cli {
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}
