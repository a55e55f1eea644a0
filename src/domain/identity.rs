//! Token Identity
//!
//! Identity and normalization rules for tokens across chains.
//! Non-native tokens are keyed by chain id + contract address, native
//! assets by chain id + symbol.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CoinGecko marks a chain's base currency with this pseudo-address
pub const NATIVE_ADDRESS_MARKER: &str = "native";

/// Identity of a token as stored in a canonical record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenIdentity {
    /// Integer chain id (EIP-155 for EVM chains)
    pub chain_id: u64,
    /// Contract address (None = native asset)
    pub contract_address: Option<String>,
    /// Lowercased ticker symbol
    pub symbol: String,
}

/// Ordering/grouping key derived from a TokenIdentity
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TokenKey {
    Contract { chain_id: u64, address: String },
    Native { chain_id: u64, symbol: String },
}

impl TokenKey {
    pub fn chain_id(&self) -> u64 {
        match self {
            TokenKey::Contract { chain_id, .. } | TokenKey::Native { chain_id, .. } => *chain_id,
        }
    }

    pub fn is_native(&self) -> bool {
        matches!(self, TokenKey::Native { .. })
    }
}

impl fmt::Display for TokenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKey::Contract { chain_id, address } => write!(f, "{}:{}", chain_id, address),
            TokenKey::Native { chain_id, symbol } => write!(f, "{}:native:{}", chain_id, symbol),
        }
    }
}

impl TokenIdentity {
    /// Build a normalized identity. Returns None when the identity is unusable
    /// (no contract address and no symbol).
    pub fn new(chain_id: u64, contract_address: Option<&str>, symbol: Option<&str>) -> Option<Self> {
        let contract_address = contract_address.and_then(normalize_address);
        let symbol = symbol.and_then(normalize_symbol);

        match (&contract_address, &symbol) {
            (None, None) => None,
            _ => Some(Self {
                chain_id,
                contract_address,
                symbol: symbol.unwrap_or_default(),
            }),
        }
    }

    pub fn contract(chain_id: u64, address: &str, symbol: &str) -> Option<Self> {
        Self::new(chain_id, Some(address), Some(symbol))
    }

    pub fn native(chain_id: u64, symbol: &str) -> Option<Self> {
        Self::new(chain_id, None, Some(symbol))
    }

    pub fn key(&self) -> TokenKey {
        match &self.contract_address {
            Some(address) => TokenKey::Contract {
                chain_id: self.chain_id,
                address: address.clone(),
            },
            None => TokenKey::Native {
                chain_id: self.chain_id,
                symbol: self.symbol.clone(),
            },
        }
    }

    /// Native assets are curated externally and never written by the pipeline
    pub fn is_native(&self) -> bool {
        self.contract_address.is_none()
    }
}

/// Trim an address and lowercase it when it is a plain hex address.
///
/// Base58 mints (Solana) and Move coin types (`0x2::sui::SUI`) are
/// case-sensitive and are only trimmed.
pub fn normalize_address(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NATIVE_ADDRESS_MARKER) {
        return None;
    }

    let is_hex = trimmed.len() > 2
        && (trimmed.starts_with("0x") || trimmed.starts_with("0X"))
        && trimmed[2..].chars().all(|c| c.is_ascii_hexdigit());

    if is_hex {
        Some(trimmed.to_ascii_lowercase())
    } else {
        Some(trimmed.to_string())
    }
}

pub fn normalize_symbol(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Trim free-text fields, mapping empty strings to None
pub fn normalize_text(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
