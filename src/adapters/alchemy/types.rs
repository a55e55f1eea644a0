//! Alchemy JSON-RPC Types

use serde::{Deserialize, Serialize};

pub const TOKEN_METADATA_METHOD: &str = "alchemy_getTokenMetadata";

/// JSON-RPC request envelope
#[derive(Debug, Clone, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: [&'a str; 1],
}

impl<'a> RpcRequest<'a> {
    pub fn token_metadata(id: u64, contract_address: &'a str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: TOKEN_METADATA_METHOD,
            params: [contract_address],
        }
    }
}

/// JSON-RPC response envelope
#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse<T> {
    #[serde(default)]
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// Result of `alchemy_getTokenMetadata`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenMetadata {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub logo: Option<String>,
}
