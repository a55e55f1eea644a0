//! CLI Commands
//!
//! Argument definitions for the token-snapshot binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Default configuration file
pub const DEFAULT_CONFIG: &str = "config/default.toml";

/// token-snapshot - multi-chain token metadata aggregator
#[derive(Parser, Debug)]
#[command(
    name = "token-snapshot",
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
    about = "Multi-chain token metadata aggregator",
    long_about = "token-snapshot pulls token metadata from CoinGecko and Alchemy, reconciles \
                  it against the existing snapshot and writes one canonical JSON file per \
                  token for static hosting."
)]
pub struct CliApp {
    /// The command to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Refresh the token snapshot once
    Run(RunCmd),

    /// List configured chains
    Chains(ChainsCmd),
}

/// Refresh the snapshot
#[derive(Parser, Debug)]
pub struct RunCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,

    /// Override the output directory
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// Only refresh one chain (by configured name, e.g. "base")
    #[arg(long, value_name = "NAME")]
    pub chain: Option<String>,

    /// Write the run report as JSON
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,
}

/// List chains
#[derive(Parser, Debug)]
pub struct ChainsCmd {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
}
