//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - CoinGecko: market-ordered token discovery (PriceProvider)
//! - Alchemy: contract metadata lookups (ChainProvider)
//! - HTTP: shared rate limiting and retry for both providers
//! - Snapshot: canonical JSON files on the local filesystem
//! - CLI: command-line argument definitions

pub mod http;
pub mod coingecko;
pub mod alchemy;
pub mod snapshot;
pub mod cli;

pub use coingecko::{CoinGeckoClient, CoinGeckoConfig};
pub use alchemy::{AlchemyClient, AlchemyConfig};
pub use snapshot::FsSnapshotStore;
pub use cli::CliApp;
