//! Token Records
//!
//! `RawRecord` is the normalized intermediate shape every provider emits.
//! `TokenRecord` is the canonical, reconciled representation persisted to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::identity::{normalize_address, normalize_symbol, normalize_text, TokenIdentity};

/// Which provider a record (or a winning field) came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSource {
    /// General token-metadata / market provider (CoinGecko)
    PriceProvider,
    /// Chain-specific contract-metadata provider (Alchemy)
    ChainProvider,
}

impl fmt::Display for ProviderSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSource::PriceProvider => write!(f, "price"),
            ProviderSource::ChainProvider => write!(f, "chain"),
        }
    }
}

/// Provider output normalized to a common schema.
///
/// Every field is optional; records whose identity cannot be derived are
/// dropped by the reconciler and counted as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub source: ProviderSource,
    pub chain_id: Option<u64>,
    pub contract_address: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub decimals: Option<u8>,
    pub logo_uri: Option<String>,
    pub market_cap_rank: Option<u32>,
    pub coin_id: Option<String>,
}

impl RawRecord {
    pub fn new(source: ProviderSource, chain_id: u64) -> Self {
        Self {
            source,
            chain_id: Some(chain_id),
            contract_address: None,
            symbol: None,
            name: None,
            decimals: None,
            logo_uri: None,
            market_cap_rank: None,
            coin_id: None,
        }
    }

    pub fn with_address(mut self, address: &str) -> Self {
        self.contract_address = normalize_address(address);
        self
    }

    pub fn with_symbol(mut self, symbol: &str) -> Self {
        self.symbol = normalize_symbol(symbol);
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = normalize_text(Some(name));
        self
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = Some(decimals);
        self
    }

    pub fn with_logo_uri(mut self, logo_uri: &str) -> Self {
        self.logo_uri = normalize_text(Some(logo_uri));
        self
    }

    pub fn with_market_cap_rank(mut self, rank: u32) -> Self {
        self.market_cap_rank = Some(rank);
        self
    }

    pub fn with_coin_id(mut self, coin_id: &str) -> Self {
        self.coin_id = normalize_text(Some(coin_id));
        self
    }

    /// Identity derived from the record, None when malformed
    pub fn identity(&self) -> Option<TokenIdentity> {
        let chain_id = self.chain_id?;
        TokenIdentity::new(chain_id, self.contract_address.as_deref(), self.symbol.as_deref())
    }
}

/// Canonical reconciled token, one file per non-native identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub identity: TokenIdentity,
    pub name: String,
    pub symbol: String,
    pub decimals: Option<u8>,
    pub logo_uri: Option<String>,
    pub market_cap_rank: Option<u32>,
    #[serde(default)]
    pub coin_id: Option<String>,
    pub provider_source: ProviderSource,
    pub last_fetched_at: DateTime<Utc>,
}

impl TokenRecord {
    /// Field-level equality that ignores `last_fetched_at`.
    ///
    /// Drives the write policy: a refreshed timestamp alone is not a change.
    pub fn same_content(&self, other: &TokenRecord) -> bool {
        self.identity == other.identity
            && self.name == other.name
            && self.symbol == other.symbol
            && self.decimals == other.decimals
            && self.logo_uri == other.logo_uri
            && self.market_cap_rank == other.market_cap_rank
            && self.coin_id == other.coin_id
            && self.provider_source == other.provider_source
    }

    pub fn is_native(&self) -> bool {
        self.identity.is_native()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(fetched_at: DateTime<Utc>) -> TokenRecord {
        TokenRecord {
            identity: TokenIdentity::contract(1, "0xabc", "foo").unwrap(),
            name: "Foo".to_string(),
            symbol: "foo".to_string(),
            decimals: Some(18),
            logo_uri: None,
            market_cap_rank: Some(42),
            coin_id: Some("foo".to_string()),
            provider_source: ProviderSource::ChainProvider,
            last_fetched_at: fetched_at,
        }
    }

    #[test]
    fn test_raw_record_normalizes_fields() {
        let raw = RawRecord::new(ProviderSource::PriceProvider, 1)
            .with_address(" 0xABC ")
            .with_symbol(" FOO ")
            .with_name("  Foo Token ")
            .with_logo_uri("");

        assert_eq!(raw.contract_address.as_deref(), Some("0xabc"));
        assert_eq!(raw.symbol.as_deref(), Some("foo"));
        assert_eq!(raw.name.as_deref(), Some("Foo Token"));
        assert!(raw.logo_uri.is_none());
    }

    #[test]
    fn test_raw_record_without_chain_is_malformed() {
        let mut raw = RawRecord::new(ProviderSource::ChainProvider, 1).with_address("0xabc");
        raw.chain_id = None;
        assert!(raw.identity().is_none());
    }

    #[test]
    fn test_same_content_ignores_timestamp() {
        let a = sample(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let b = sample(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap());
        assert!(a.same_content(&b));

        let mut c = b.clone();
        c.decimals = Some(6);
        assert!(!a.same_content(&c));
    }

    #[test]
    fn test_provider_source_serializes_snake_case() {
        let json = serde_json::to_string(&ProviderSource::ChainProvider).unwrap();
        assert_eq!(json, "\"chain_provider\"");
    }
}
