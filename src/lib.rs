//! token-snapshot - Multi-chain Token Metadata Aggregator Library
//!
//! Pulls token metadata from a market-data provider (CoinGecko) and a
//! contract-metadata provider (Alchemy), reconciles it against the prior
//! snapshot and writes one deterministic JSON file per token.
//!
//! # Modules
//!
//! - `domain`: Identity rules, records, reconciler, retry policy, run report
//! - `ports`: Trait abstractions (TokenProvider, TokenStore)
//! - `adapters`: External implementations (CoinGecko, Alchemy, filesystem, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Run coordinator

pub mod domain;
pub mod ports;
pub mod adapters;
pub mod config;
pub mod application;
