//! Token Provider Port
//!
//! Paginated source of raw token records. Implemented by the CoinGecko
//! (discovery) and Alchemy (targeted) adapters.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{ProviderSource, RawRecord, TokenIdentity};

#[derive(Debug, Error)]
pub enum ProviderError {
    /// 401/403 - never retried
    #[error("{provider}: authentication rejected (HTTP {status})")]
    Auth { provider: String, status: u16 },

    /// Retries exhausted on 429/5xx/timeouts
    #[error("{provider}: unavailable after {attempts} attempts: {reason}")]
    Unavailable {
        provider: String,
        attempts: u32,
        reason: String,
    },

    /// Other non-retryable HTTP status
    #[error("{provider}: request rejected (HTTP {status}): {body}")]
    Rejected {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{provider}: failed to parse response: {message}")]
    Parse { provider: String, message: String },

    #[error("{provider}: HTTP client error: {message}")]
    Client { provider: String, message: String },

    #[error("{provider}: fetch cancelled")]
    Cancelled { provider: String },
}

impl ProviderError {
    /// Short machine-readable kind for run reports
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Auth { .. } => "auth",
            ProviderError::Unavailable { .. } => "unavailable",
            ProviderError::Rejected { .. } => "rejected",
            ProviderError::Parse { .. } => "parse",
            ProviderError::Client { .. } => "client",
            ProviderError::Cancelled { .. } => "cancelled",
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ProviderError::Auth { .. })
    }
}

/// One page request
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// None for the first page
    pub cursor: Option<String>,
    /// Identities a targeted provider should look up
    pub targets: Arc<Vec<TokenIdentity>>,
}

impl BatchRequest {
    pub fn first(targets: Arc<Vec<TokenIdentity>>) -> Self {
        Self { cursor: None, targets }
    }

    pub fn next(&self, cursor: String) -> Self {
        Self {
            cursor: Some(cursor),
            targets: Arc::clone(&self.targets),
        }
    }
}

/// One page of records
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub records: Vec<RawRecord>,
    /// None when pagination is complete
    pub next_cursor: Option<String>,
    /// Items in this page whose individual lookup failed
    pub skipped: usize,
}

impl Batch {
    pub fn last(records: Vec<RawRecord>) -> Self {
        Self {
            records,
            ..Default::default()
        }
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Name used in logs and reports
    fn name(&self) -> &str;

    fn source(&self) -> ProviderSource;

    /// Targeted providers run after discovery providers and receive the
    /// discovered identities in `BatchRequest::targets`
    fn needs_targets(&self) -> bool {
        false
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch, ProviderError>;
}

/// Downloads token logo images
#[async_trait]
pub trait LogoSource: Send + Sync {
    async fn fetch_logo(&self, url: &str) -> Result<Vec<u8>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let auth = ProviderError::Auth { provider: "coingecko".into(), status: 401 };
        assert_eq!(auth.kind(), "auth");
        assert!(auth.is_auth());
        assert_eq!(auth.to_string(), "coingecko: authentication rejected (HTTP 401)");

        let down = ProviderError::Unavailable {
            provider: "alchemy".into(),
            attempts: 3,
            reason: "HTTP 503".into(),
        };
        assert_eq!(down.kind(), "unavailable");
        assert!(!down.is_auth());
    }

    #[test]
    fn test_next_request_shares_targets() {
        let targets = Arc::new(vec![TokenIdentity::contract(1, "0xabc", "foo").unwrap()]);
        let first = BatchRequest::first(Arc::clone(&targets));
        let next = first.next("2".to_string());
        assert_eq!(next.cursor.as_deref(), Some("2"));
        assert!(Arc::ptr_eq(&first.targets, &next.targets));
    }
}
