//! CoinGecko Adapter
//!
//! General token-metadata provider (PriceProvider): names, symbols, logos
//! and market-cap rank, plus the per-platform contract addresses.
//!
//! # Endpoints Used
//! - `/coins/list?include_platform=true` (once per run)
//! - `/coins/markets?order=market_cap_desc` (paginated)

mod client;
mod types;

pub use client::{records_for_coin, CoinGeckoClient, CoinGeckoConfig, PlatformChain};
pub use types::{CoinListEntry, MarketCoin, PlatformIndex};
