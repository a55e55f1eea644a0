//! CLI Adapter
//!
//! Command-line interface for token-snapshot.
//! Uses clap derive macros for argument parsing.

mod commands;

pub use commands::{ChainsCmd, CliApp, Command, RunCmd, DEFAULT_CONFIG};

/// Parse the process arguments
pub fn init() -> CliApp {
    use clap::Parser;
    CliApp::parse()
}
