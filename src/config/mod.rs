//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    AlchemySection, ChainSection, CoinGeckoSection, Config, ConfigError, LoggingSection,
    OutputSection, RequestSection, default_chains, load_config, read_config,
};
