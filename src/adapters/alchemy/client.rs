//! Alchemy Client
//!
//! Targeted provider: receives the identities discovered in the first
//! phase and looks up contract metadata for the ones on Alchemy-backed
//! networks. The cursor is an offset into the sorted target list.

use std::collections::HashMap;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;

use crate::adapters::http::{RateLimiter, RetryingClient};
use crate::config::{AlchemySection, ChainSection};
use crate::domain::{ProviderSource, RawRecord, RetryPolicy, TokenIdentity};
use crate::ports::{Batch, BatchRequest, ProviderError, TokenProvider};
use super::types::{RpcRequest, RpcResponse, TokenMetadata};

const PROVIDER_NAME: &str = "alchemy";

/// A chain with an Alchemy network slug
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkChain {
    pub chain_id: u64,
    pub network: String,
}

/// Configuration for the Alchemy client
#[derive(Debug, Clone)]
pub struct AlchemyConfig {
    /// URL with `{network}` and `{key}` placeholders
    pub endpoint: String,
    pub api_key: String,
    pub page_size: u32,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_rpm: u32,
    pub min_interval: Duration,
    pub networks: Vec<NetworkChain>,
}

impl AlchemyConfig {
    pub fn from_section(section: &AlchemySection, api_key: String, chains: &[ChainSection]) -> Self {
        let networks = chains
            .iter()
            .filter_map(|chain| {
                chain.alchemy_network.as_ref().map(|network| NetworkChain {
                    chain_id: chain.chain_id,
                    network: network.clone(),
                })
            })
            .collect();

        Self {
            endpoint: section.endpoint.trim().to_string(),
            api_key,
            page_size: section.page_size.max(1),
            timeout: section.request.timeout(),
            retry: section.request.retry_policy(),
            rate_limit_rpm: section.rate_limit_rpm,
            min_interval: Duration::from_millis(section.min_interval_ms),
            networks,
        }
    }
}

/// Alchemy contract-metadata provider
#[derive(Debug, Clone)]
pub struct AlchemyClient {
    config: AlchemyConfig,
    client: RetryingClient,
    networks: HashMap<u64, String>,
}

impl AlchemyClient {
    pub fn with_config(config: AlchemyConfig) -> Result<Self, ProviderError> {
        let client = RetryingClient::new(
            PROVIDER_NAME,
            config.timeout,
            config.retry.clone(),
            RateLimiter::new(config.rate_limit_rpm, config.min_interval),
        )?;
        let networks = config
            .networks
            .iter()
            .map(|n| (n.chain_id, n.network.clone()))
            .collect();

        Ok(Self { config, client, networks })
    }

    fn endpoint(&self, network: &str) -> String {
        self.config
            .endpoint
            .replace("{network}", network)
            .replace("{key}", &self.config.api_key)
    }

    /// Contract targets on supported networks, sorted and deduplicated
    fn supported_targets(&self, targets: &[TokenIdentity]) -> Vec<(u64, String)> {
        let mut supported: Vec<(u64, String)> = targets
            .iter()
            .filter(|t| self.networks.contains_key(&t.chain_id))
            .filter_map(|t| t.contract_address.clone().map(|address| (t.chain_id, address)))
            .collect();
        supported.sort();
        supported.dedup();
        supported
    }

    fn parse_cursor(&self, cursor: Option<&str>) -> Result<usize, ProviderError> {
        match cursor {
            None => Ok(0),
            Some(raw) => raw.parse::<usize>().map_err(|_| ProviderError::Parse {
                provider: PROVIDER_NAME.to_string(),
                message: format!("invalid offset cursor '{}'", raw),
            }),
        }
    }

    /// Look up one contract. JSON-RPC errors (sent with HTTP 200 or 400)
    /// come back as `Rejected`.
    async fn fetch_metadata(
        &self,
        request_id: u64,
        chain_id: u64,
        address: &str,
    ) -> Result<Option<TokenMetadata>, ProviderError> {
        let Some(network) = self.networks.get(&chain_id) else {
            return Ok(None);
        };
        let url = self.endpoint(network);
        let body = RpcRequest::token_metadata(request_id, address);

        let response = self
            .client
            .send_with(
                |http| {
                    http.post(&url)
                        .header(ACCEPT, "application/json")
                        .header(CONTENT_TYPE, "application/json")
                        .json(&body)
                },
                &[StatusCode::BAD_REQUEST],
            )
            .await?;
        let status = response.status();

        let rpc: RpcResponse<TokenMetadata> = response.json().await.map_err(|e| ProviderError::Parse {
            provider: PROVIDER_NAME.to_string(),
            message: format!("{}:{}: {}", chain_id, address, e),
        })?;

        if let Some(error) = rpc.error {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body: format!("JSON-RPC error {}: {}", error.code, error.message),
            });
        }
        if !status.is_success() {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME.to_string(),
                status: status.as_u16(),
                body: "response carried no JSON-RPC error".to_string(),
            });
        }
        Ok(rpc.result)
    }
}

/// Build a chain-provider record, None when the metadata carries nothing usable
pub fn record_from_metadata(chain_id: u64, address: &str, metadata: &TokenMetadata) -> Option<RawRecord> {
    let mut record = RawRecord::new(ProviderSource::ChainProvider, chain_id).with_address(address);
    record.contract_address.as_ref()?;

    if let Some(symbol) = &metadata.symbol {
        record = record.with_symbol(symbol);
    }
    if let Some(name) = &metadata.name {
        record = record.with_name(name);
    }
    if let Some(decimals) = metadata.decimals {
        record = record.with_decimals(decimals);
    }
    if let Some(logo) = &metadata.logo {
        record = record.with_logo_uri(logo);
    }

    let empty = record.symbol.is_none()
        && record.name.is_none()
        && record.decimals.is_none()
        && record.logo_uri.is_none();
    if empty {
        None
    } else {
        Some(record)
    }
}

#[async_trait]
impl TokenProvider for AlchemyClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn source(&self) -> ProviderSource {
        ProviderSource::ChainProvider
    }

    fn needs_targets(&self) -> bool {
        true
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch, ProviderError> {
        let offset = self.parse_cursor(request.cursor.as_deref())?;
        let targets = self.supported_targets(&request.targets);
        let page_size = self.config.page_size as usize;

        if offset >= targets.len() {
            return Ok(Batch::last(Vec::new()));
        }

        let end = (offset + page_size).min(targets.len());
        let mut records = Vec::new();
        let mut skipped = 0;

        for (i, (chain_id, address)) in targets[offset..end].iter().enumerate() {
            let request_id = (offset + i + 1) as u64;
            match self.fetch_metadata(request_id, *chain_id, address).await {
                Ok(Some(metadata)) => {
                    if let Some(record) = record_from_metadata(*chain_id, address, &metadata) {
                        records.push(record);
                    }
                }
                Ok(None) => {}
                // A bad key fails every lookup, give up on the provider
                Err(e) if e.is_auth() => return Err(e),
                Err(e) => {
                    tracing::warn!("Alchemy lookup for {}:{} failed: {}", chain_id, address, e);
                    skipped += 1;
                }
            }
        }

        tracing::info!(
            "Alchemy batch {}..{} of {}: {} records, {} failed lookups",
            offset,
            end,
            targets.len(),
            records.len(),
            skipped
        );

        let next_cursor = (end < targets.len()).then(|| end.to_string());
        Ok(Batch {
            records,
            next_cursor,
            skipped,
        })
    }
}
