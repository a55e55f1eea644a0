//! Alchemy Adapter
//!
//! Contract-metadata provider (ChainProvider). Looks up decimals, symbol,
//! name and logo for the contract identities discovered by the other
//! providers, via `alchemy_getTokenMetadata`.

mod client;
mod types;

pub use client::{record_from_metadata, AlchemyClient, AlchemyConfig, NetworkChain};
pub use types::{RpcError, RpcRequest, RpcResponse, TokenMetadata};
