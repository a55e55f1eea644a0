//! CoinGecko API Types

use serde::Deserialize;
use std::collections::HashMap;

/// Entry of `/coins/list?include_platform=true`
#[derive(Debug, Clone, Deserialize)]
pub struct CoinListEntry {
    pub id: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    /// Platform id -> contract address (values may be null or empty)
    #[serde(default)]
    pub platforms: HashMap<String, Option<String>>,
}

/// Entry of `/coins/markets`
#[derive(Debug, Clone, Deserialize)]
pub struct MarketCoin {
    pub id: String,
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub market_cap_rank: Option<u32>,
}

/// Coin id -> platform id -> non-empty contract address
#[derive(Debug, Clone, Default)]
pub struct PlatformIndex {
    coins: HashMap<String, HashMap<String, String>>,
}

impl PlatformIndex {
    pub fn from_list(entries: Vec<CoinListEntry>) -> Self {
        let coins = entries
            .into_iter()
            .map(|entry| {
                let platforms = entry
                    .platforms
                    .into_iter()
                    .filter_map(|(platform, address)| {
                        let address = address?.trim().to_string();
                        if platform.is_empty() || address.is_empty() {
                            None
                        } else {
                            Some((platform, address))
                        }
                    })
                    .collect();
                (entry.id, platforms)
            })
            .collect();
        Self { coins }
    }

    pub fn address(&self, coin_id: &str, platform: &str) -> Option<&str> {
        self.coins.get(coin_id)?.get(platform).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
