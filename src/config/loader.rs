//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config/default.toml.
//! API keys may be left out of the file and supplied through the environment.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::RetryPolicy;

/// Main configuration structure matching config/default.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputSection,
    pub coingecko: CoinGeckoSection,
    pub alchemy: AlchemySection,
    #[serde(default)]
    pub logging: LoggingSection,
    #[serde(default = "default_chains")]
    pub chains: Vec<ChainSection>,
}

/// Output configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct OutputSection {
    /// Root of the canonical token tree (`~` is expanded)
    #[serde(default = "default_output_dir")]
    pub dir: String,
    /// Tokens kept per chain, in market-cap order
    #[serde(default = "default_max_tokens_per_chain")]
    pub max_tokens_per_chain: usize,
    /// Download logo images for tokens that have none stored yet
    #[serde(default = "default_download_logos")]
    pub download_logos: bool,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            max_tokens_per_chain: default_max_tokens_per_chain(),
            download_logos: default_download_logos(),
        }
    }
}

impl OutputSection {
    pub fn dir_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.dir).to_string())
    }
}

/// Request behaviour shared by both providers
#[derive(Debug, Clone, Deserialize)]
pub struct RequestSection {
    /// Attempts per request (first try included)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// First backoff delay in milliseconds, doubled per attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl RequestSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// CoinGecko (price / general metadata provider) section
#[derive(Debug, Clone, Deserialize)]
pub struct CoinGeckoSection {
    #[serde(default = "default_coingecko_url")]
    pub api_url: String,
    /// API key (falls back to `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_coingecko_key_env")]
    pub api_key_env: String,
    /// Coins per markets page
    #[serde(default = "default_coingecko_page_size")]
    pub page_size: u32,
    /// Stop after this many markets pages (None = walk until exhausted)
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default = "default_coingecko_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default = "default_coingecko_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(flatten)]
    pub request: RequestSection,
}

impl CoinGeckoSection {
    /// Get API key with environment variable fallback
    pub fn get_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Alchemy (chain / contract metadata provider) section
#[derive(Debug, Clone, Deserialize)]
pub struct AlchemySection {
    /// Endpoint template, `{network}` and `{key}` are substituted per request
    #[serde(default = "default_alchemy_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_alchemy_key_env")]
    pub api_key_env: String,
    /// Contracts looked up per batch
    #[serde(default = "default_alchemy_page_size")]
    pub page_size: u32,
    #[serde(default = "default_alchemy_rpm")]
    pub rate_limit_rpm: u32,
    #[serde(default = "default_alchemy_interval_ms")]
    pub min_interval_ms: u64,
    #[serde(flatten)]
    pub request: RequestSection,
}

impl AlchemySection {
    /// Get API key with environment variable fallback
    pub fn get_api_key(&self) -> Option<String> {
        resolve_key(self.api_key.as_deref(), &self.api_key_env)
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self { level: default_log_level() }
    }
}

/// One supported chain
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChainSection {
    /// Directory-friendly chain name
    pub name: String,
    /// Integer chain id used in canonical paths
    pub chain_id: u64,
    /// CoinGecko asset platform id
    pub coingecko_platform: String,
    /// Alchemy network slug (None = no contract metadata for this chain)
    #[serde(default)]
    pub alchemy_network: Option<String>,
}

impl ChainSection {
    fn new(name: &str, chain_id: u64, platform: &str, network: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            chain_id,
            coingecko_platform: platform.to_string(),
            alchemy_network: network.map(str::to_string),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let config = read_config(path)?;
    config.validate()?;
    Ok(config)
}

/// Parse a configuration file without validating it
pub fn read_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output.dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "output.dir cannot be empty".to_string(),
            ));
        }

        if self.output.max_tokens_per_chain == 0 {
            return Err(ConfigError::ValidationError(
                "output.max_tokens_per_chain must be > 0".to_string(),
            ));
        }

        if self.coingecko.get_api_key().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "coingecko api_key missing (set it in the config or {})",
                self.coingecko.api_key_env
            )));
        }

        if self.alchemy.get_api_key().is_none() {
            return Err(ConfigError::ValidationError(format!(
                "alchemy api_key missing (set it in the config or {})",
                self.alchemy.api_key_env
            )));
        }

        if self.coingecko.page_size == 0 || self.coingecko.page_size > 250 {
            return Err(ConfigError::ValidationError(format!(
                "coingecko.page_size must be 1-250, got {}",
                self.coingecko.page_size
            )));
        }

        if !self.alchemy.endpoint.contains("{network}") {
            return Err(ConfigError::ValidationError(
                "alchemy.endpoint must contain {network}".to_string(),
            ));
        }

        if self.alchemy.page_size == 0 {
            return Err(ConfigError::ValidationError(
                "alchemy.page_size must be > 0".to_string(),
            ));
        }

        for (name, request) in [("coingecko", &self.coingecko.request), ("alchemy", &self.alchemy.request)] {
            if request.max_retries == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}.max_retries must be > 0",
                    name
                )));
            }
            if request.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{}.timeout_secs must be > 0",
                    name
                )));
            }
        }

        if self.coingecko.rate_limit_rpm == 0 || self.alchemy.rate_limit_rpm == 0 {
            return Err(ConfigError::ValidationError(
                "rate_limit_rpm must be > 0".to_string(),
            ));
        }

        if self.chains.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one chain must be configured".to_string(),
            ));
        }

        let mut seen_names = std::collections::HashSet::new();
        let mut seen_ids = std::collections::HashSet::new();
        for chain in &self.chains {
            if chain.name.is_empty() || chain.coingecko_platform.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "chain {} needs a name and coingecko_platform",
                    chain.chain_id
                )));
            }
            if !seen_names.insert(chain.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate chain name {}",
                    chain.name
                )));
            }
            if !seen_ids.insert(chain.chain_id) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate chain_id {}",
                    chain.chain_id
                )));
            }
        }

        Ok(())
    }

    pub fn chain(&self, name: &str) -> Option<&ChainSection> {
        self.chains.iter().find(|c| c.name == name)
    }

    /// Restrict the chain table to a single chain
    pub fn only_chain(&mut self, name: &str) -> Result<(), ConfigError> {
        let chain = self.chain(name).cloned().ok_or_else(|| {
            let available: Vec<&str> = self.chains.iter().map(|c| c.name.as_str()).collect();
            ConfigError::ValidationError(format!(
                "chain '{}' not found. Available chains: {}",
                name,
                available.join(", ")
            ))
        })?;
        self.chains = vec![chain];
        Ok(())
    }
}

fn resolve_key(configured: Option<&str>, env_var: &str) -> Option<String> {
    // First check config value
    if let Some(key) = configured {
        if !key.trim().is_empty() {
            return Some(key.trim().to_string());
        }
    }
    // Fall back to environment variable
    std::env::var(env_var).ok().filter(|k| !k.trim().is_empty())
}

fn default_output_dir() -> String {
    "site/public/tokens".to_string()
}

fn default_max_tokens_per_chain() -> usize {
    100
}

fn default_download_logos() -> bool {
    true
}

fn default_max_retries() -> u32 {
    crate::domain::retry::DEFAULT_MAX_ATTEMPTS
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_base_delay_ms() -> u64 {
    crate::domain::retry::DEFAULT_BASE_DELAY_MS
}

fn default_max_delay_ms() -> u64 {
    crate::domain::retry::DEFAULT_MAX_DELAY_MS
}

fn default_coingecko_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_coingecko_key_env() -> String {
    "COINGECKO_API_KEY".to_string()
}

fn default_coingecko_page_size() -> u32 {
    250
}

// Demo plan: 30 calls per minute
fn default_coingecko_rpm() -> u32 {
    30
}

fn default_coingecko_interval_ms() -> u64 {
    2_000
}

fn default_alchemy_endpoint() -> String {
    "https://{network}.g.alchemy.com/v2/{key}".to_string()
}

fn default_alchemy_key_env() -> String {
    "ALCHEMY_API_KEY".to_string()
}

fn default_alchemy_page_size() -> u32 {
    100
}

fn default_alchemy_rpm() -> u32 {
    1_200
}

fn default_alchemy_interval_ms() -> u64 {
    50
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Chains tracked when the config has no `[[chains]]` table
pub fn default_chains() -> Vec<ChainSection> {
    vec![
        ChainSection::new("ethereum", 1, "ethereum", Some("eth-mainnet")),
        ChainSection::new("optimism", 10, "optimistic-ethereum", Some("opt-mainnet")),
        ChainSection::new("binance-smart-chain", 56, "binance-smart-chain", Some("bnb-mainnet")),
        ChainSection::new("solana", 101, "solana", None),
        ChainSection::new("unichain", 130, "unichain", Some("unichain-mainnet")),
        ChainSection::new("polygon", 137, "polygon-pos", Some("polygon-mainnet")),
        ChainSection::new("sui", 784, "sui", None),
        ChainSection::new("base", 8453, "base", Some("base-mainnet")),
        ChainSection::new("arbitrum", 42161, "arbitrum-one", Some("arb-mainnet")),
        ChainSection::new("avalanche", 43114, "avalanche", Some("avax-mainnet")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const UNSET_ENV: &str = "TOKEN_SNAPSHOT_TEST_KEY_THAT_IS_NEVER_SET";

    fn create_valid_config() -> String {
        r#"
[output]
dir = "site/public/tokens"
max_tokens_per_chain = 50

[coingecko]
api_key = "cg-test"
page_size = 100
max_retries = 4

[alchemy]
api_key = "alchemy-test"
timeout_secs = 10

[logging]
level = "debug"

[[chains]]
name = "ethereum"
chain_id = 1
coingecko_platform = "ethereum"
alchemy_network = "eth-mainnet"

[[chains]]
name = "solana"
chain_id = 101
coingecko_platform = "solana"
"#
        .to_string()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.output.max_tokens_per_chain, 50);
        assert_eq!(config.coingecko.page_size, 100);
        assert_eq!(config.coingecko.request.max_retries, 4);
        assert_eq!(config.coingecko.request.timeout_secs, 30);
        assert_eq!(config.alchemy.request.timeout_secs, 10);
        assert_eq!(config.alchemy.page_size, 100);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.chains.len(), 2);
        assert_eq!(config.chains[1].alchemy_network, None);
        assert_eq!(config.coingecko.get_api_key().as_deref(), Some("cg-test"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_invalid_toml() {
        let file = write_config("[coingecko\napi_key = ");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn test_defaults_fill_missing_sections() {
        let file = write_config(
            r#"
[coingecko]
api_key = "cg"

[alchemy]
api_key = "al"
"#,
        );
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.output.dir, "site/public/tokens");
        assert_eq!(config.output.max_tokens_per_chain, 100);
        assert_eq!(config.coingecko.page_size, 250);
        assert_eq!(config.coingecko.request.max_retries, 3);
        assert_eq!(config.chains, default_chains());
        assert_eq!(config.logging.level, "info");
        assert!(config.output.download_logos);
        assert_eq!(config.alchemy.endpoint, "https://{network}.g.alchemy.com/v2/{key}");
    }

    #[test]
    fn test_endpoint_without_network_rejected() {
        let file = write_config(
            r#"
[coingecko]
api_key = "cg"

[alchemy]
api_key = "al"
endpoint = "https://eth-mainnet.g.alchemy.com/v2/{key}"
"#,
        );
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("endpoint")));
    }

    #[test]
    fn test_missing_api_key_fails_validation() {
        let file = write_config(&format!(
            r#"
[coingecko]
api_key_env = "{}"

[alchemy]
api_key = "al"
"#,
            UNSET_ENV
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("coingecko")));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let file = write_config(&format!(
            r#"
[coingecko]
api_key = "cg"

[alchemy]
api_key = "   "
api_key_env = "{}"
"#,
            UNSET_ENV
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("alchemy")));
    }

    #[test]
    fn test_invalid_page_size() {
        let file = write_config(
            r#"
[coingecko]
api_key = "cg"
page_size = 500

[alchemy]
api_key = "al"
"#,
        );
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_duplicate_chain_ids_rejected() {
        let file = write_config(
            r#"
[coingecko]
api_key = "cg"

[alchemy]
api_key = "al"

[[chains]]
name = "ethereum"
chain_id = 1
coingecko_platform = "ethereum"

[[chains]]
name = "mainnet"
chain_id = 1
coingecko_platform = "ethereum"
"#,
        );
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_only_chain() {
        let file = write_config(&create_valid_config());
        let mut config = load_config(file.path()).unwrap();

        config.only_chain("solana").unwrap();
        assert_eq!(config.chains.len(), 1);
        assert_eq!(config.chains[0].chain_id, 101);

        let err = config.only_chain("dogechain").unwrap_err();
        assert!(err.to_string().contains("Available chains: solana"));
    }

    #[test]
    fn test_retry_policy_from_section() {
        let file = write_config(&create_valid_config());
        let config = load_config(file.path()).unwrap();
        let policy = config.coingecko.request.retry_policy();
        assert_eq!(policy.max_attempts, 4);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_shipped_default_config_parses() {
        let content = include_str!("../../config/default.toml");
        let config: Config = toml::from_str(content).unwrap();
        assert_eq!(config.chains.len(), 10);
        assert!(config.chain("arbitrum").is_some());
    }
}
