//! CoinGecko Client
//!
//! Discovery provider. Walks `/coins/markets` in market-cap order and maps
//! each coin onto every configured chain it is deployed on, using the
//! platform table from `/coins/list?include_platform=true`.

use std::sync::Arc;
use std::time::Duration;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use tokio::sync::Mutex;

use crate::adapters::http::{RateLimiter, RetryingClient};
use crate::config::{ChainSection, CoinGeckoSection};
use crate::domain::{ProviderSource, RawRecord, RetryPolicy};
use crate::ports::{Batch, BatchRequest, LogoSource, ProviderError, TokenProvider};
use super::types::{CoinListEntry, MarketCoin, PlatformIndex};

const PROVIDER_NAME: &str = "coingecko";
const API_KEY_HEADER: &str = "x-cg-demo-api-key";

/// A chain as CoinGecko sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformChain {
    pub chain_id: u64,
    pub platform: String,
}

impl From<&ChainSection> for PlatformChain {
    fn from(chain: &ChainSection) -> Self {
        Self {
            chain_id: chain.chain_id,
            platform: chain.coingecko_platform.clone(),
        }
    }
}

/// Configuration for the CoinGecko client
#[derive(Debug, Clone)]
pub struct CoinGeckoConfig {
    pub api_url: String,
    pub api_key: String,
    pub page_size: u32,
    pub max_pages: Option<u32>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit_rpm: u32,
    pub min_interval: Duration,
    pub chains: Vec<PlatformChain>,
}

impl CoinGeckoConfig {
    pub fn from_section(section: &CoinGeckoSection, api_key: String, chains: &[ChainSection]) -> Self {
        Self {
            api_url: section.api_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: section.page_size,
            max_pages: section.max_pages,
            timeout: section.request.timeout(),
            retry: section.request.retry_policy(),
            rate_limit_rpm: section.rate_limit_rpm,
            min_interval: Duration::from_millis(section.min_interval_ms),
            chains: chains.iter().map(PlatformChain::from).collect(),
        }
    }
}

/// CoinGecko token-metadata provider
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    config: CoinGeckoConfig,
    client: RetryingClient,
    /// Platform table, fetched once per run
    platforms: Arc<Mutex<Option<Arc<PlatformIndex>>>>,
}

impl CoinGeckoClient {
    pub fn with_config(config: CoinGeckoConfig) -> Result<Self, ProviderError> {
        let client = RetryingClient::new(
            PROVIDER_NAME,
            config.timeout,
            config.retry.clone(),
            RateLimiter::new(config.rate_limit_rpm, config.min_interval),
        )?;

        Ok(Self {
            config,
            client,
            platforms: Arc::new(Mutex::new(None)),
        })
    }

    /// Fetch (or reuse) the coin id -> platform address table
    async fn platform_index(&self) -> Result<Arc<PlatformIndex>, ProviderError> {
        let mut cached = self.platforms.lock().await;
        if let Some(index) = cached.as_ref() {
            return Ok(Arc::clone(index));
        }

        tracing::info!("Fetching complete coin list with platform details...");
        let url = format!("{}/coins/list", self.config.api_url);
        let response = self
            .client
            .send(|http| {
                http.get(&url)
                    .header(ACCEPT, "application/json")
                    .header(API_KEY_HEADER, &self.config.api_key)
                    .query(&[("include_platform", "true")])
            })
            .await?;

        let entries: Vec<CoinListEntry> = response.json().await.map_err(|e| self.parse_error(e))?;
        let index = Arc::new(PlatformIndex::from_list(entries));
        tracing::info!("Loaded platform table for {} coins", index.len());

        *cached = Some(Arc::clone(&index));
        Ok(index)
    }

    async fn fetch_market_page(&self, page: u32) -> Result<Vec<MarketCoin>, ProviderError> {
        let url = format!("{}/coins/markets", self.config.api_url);
        let per_page = self.config.page_size.to_string();
        let page_param = page.to_string();

        let response = self
            .client
            .send(|http| {
                http.get(&url)
                    .header(ACCEPT, "application/json")
                    .header(API_KEY_HEADER, &self.config.api_key)
                    .query(&[
                        ("vs_currency", "usd"),
                        ("order", "market_cap_desc"),
                        ("per_page", per_page.as_str()),
                        ("page", page_param.as_str()),
                        ("sparkline", "false"),
                    ])
            })
            .await?;

        response.json().await.map_err(|e| self.parse_error(e))
    }

    fn parse_error(&self, e: reqwest::Error) -> ProviderError {
        ProviderError::Parse {
            provider: PROVIDER_NAME.to_string(),
            message: e.to_string(),
        }
    }

    fn parse_cursor(&self, cursor: Option<&str>) -> Result<u32, ProviderError> {
        match cursor {
            None => Ok(1),
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|page| *page >= 1)
                .ok_or_else(|| ProviderError::Parse {
                    provider: PROVIDER_NAME.to_string(),
                    message: format!("invalid page cursor '{}'", raw),
                }),
        }
    }

    fn next_cursor(&self, page: u32, returned: usize) -> Option<String> {
        if returned < self.config.page_size as usize {
            return None;
        }
        if self.config.max_pages.is_some_and(|max| page >= max) {
            return None;
        }
        Some((page + 1).to_string())
    }
}

/// Map one market coin onto every configured chain it lives on
pub fn records_for_coin(coin: &MarketCoin, index: &PlatformIndex, chains: &[PlatformChain]) -> Vec<RawRecord> {
    chains
        .iter()
        .filter_map(|chain| {
            let base = RawRecord::new(ProviderSource::PriceProvider, chain.chain_id)
                .with_symbol(&coin.symbol)
                .with_name(&coin.name)
                .with_coin_id(&coin.id);

            let record = if let Some(address) = index.address(&coin.id, &chain.platform) {
                base.with_address(address)
            } else if coin.id == chain.platform || coin.id == chain.platform.replace('-', "_") {
                // The chain's own base currency
                base
            } else {
                return None;
            };

            let record = match &coin.image {
                Some(image) => record.with_logo_uri(image),
                None => record,
            };
            Some(match coin.market_cap_rank {
                Some(rank) => record.with_market_cap_rank(rank),
                None => record,
            })
        })
        .collect()
}

#[async_trait]
impl TokenProvider for CoinGeckoClient {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn source(&self) -> ProviderSource {
        ProviderSource::PriceProvider
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch, ProviderError> {
        let page = self.parse_cursor(request.cursor.as_deref())?;
        let index = self.platform_index().await?;

        tracing::debug!("Fetching market data: page {}...", page);
        let coins = self.fetch_market_page(page).await?;

        let records: Vec<RawRecord> = coins
            .iter()
            .flat_map(|coin| records_for_coin(coin, &index, &self.config.chains))
            .collect();

        tracing::info!(
            "CoinGecko page {}: {} coins, {} chain records",
            page,
            coins.len(),
            records.len()
        );

        Ok(Batch {
            records,
            next_cursor: self.next_cursor(page, coins.len()),
            skipped: 0,
        })
    }
}

/// Logo images share the API's rate limiter; the image host takes no key
#[async_trait]
impl LogoSource for CoinGeckoClient {
    async fn fetch_logo(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        let response = self.client.send(|http| http.get(url)).await?;
        let image = response.bytes().await.map_err(|e| self.parse_error(e))?;
        Ok(image.to_vec())
    }
}
