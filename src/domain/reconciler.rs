//! Reconciler
//!
//! Merges raw provider records into canonical token records.
//!
//! Field priority:
//! - ChainProvider is authoritative for contract-level facts (decimals, symbol)
//! - PriceProvider is authoritative for market-facing facts (name, logo, rank, coin id)
//! - A field missing from both falls back to the previously stored record

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::identity::{TokenIdentity, TokenKey};
use super::record::{ProviderSource, RawRecord, TokenRecord};

/// Prior on-disk snapshot, loaded once per run
pub type ExistingIndex = BTreeMap<TokenKey, TokenRecord>;

/// How a reconciled token relates to the stored snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    New,
    Modified,
    Unchanged,
}

impl Change {
    pub fn is_changed(&self) -> bool {
        !matches!(self, Change::Unchanged)
    }
}

#[derive(Debug, Clone)]
pub struct ReconciledToken {
    pub record: TokenRecord,
    pub change: Change,
}

/// Reconciler output, sorted by token key
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub tokens: Vec<ReconciledToken>,
    /// Raw records or groups dropped for missing identity fields
    pub malformed: usize,
}

impl Reconciliation {
    pub fn changed(&self) -> impl Iterator<Item = &ReconciledToken> {
        self.tokens.iter().filter(|t| t.change.is_changed())
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Raw records for one identity, split by provider in arrival order
#[derive(Debug, Default)]
struct Group {
    chain: Vec<RawRecord>,
    price: Vec<RawRecord>,
}

impl Group {
    fn push(&mut self, raw: RawRecord) {
        match raw.source {
            ProviderSource::ChainProvider => self.chain.push(raw),
            ProviderSource::PriceProvider => self.price.push(raw),
        }
    }
}

/// First non-null value from the preferred provider, then the other one,
/// then the prior stored value
fn pick<T>(
    preferred: &[RawRecord],
    fallback: &[RawRecord],
    field: impl Fn(&RawRecord) -> Option<T>,
    prior: Option<T>,
) -> Option<T> {
    preferred
        .iter()
        .chain(fallback.iter())
        .find_map(&field)
        .or(prior)
}

/// Deterministic merge of provider output against an existing snapshot
#[derive(Debug, Clone)]
pub struct Reconciler {
    fetched_at: DateTime<Utc>,
}

impl Reconciler {
    /// `fetched_at` is stamped on new and modified records only
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self { fetched_at }
    }

    pub fn reconcile(&self, existing: &ExistingIndex, incoming: Vec<RawRecord>) -> Reconciliation {
        let mut malformed = 0usize;
        let mut groups: BTreeMap<TokenKey, Group> = BTreeMap::new();

        for raw in incoming {
            match raw.identity() {
                Some(identity) => groups.entry(identity.key()).or_default().push(raw),
                None => {
                    tracing::debug!("Dropping malformed {} record: {:?}", raw.source, raw);
                    malformed += 1;
                }
            }
        }

        let mut tokens = Vec::with_capacity(groups.len());
        for (key, group) in groups {
            let prior = existing.get(&key);
            match self.merge(&key, &group, prior) {
                Some(record) => tokens.push(self.classify(record, prior)),
                None => {
                    tracing::debug!("Dropping {}: no symbol from any source", key);
                    malformed += 1;
                }
            }
        }

        Reconciliation { tokens, malformed }
    }

    fn merge(&self, key: &TokenKey, group: &Group, prior: Option<&TokenRecord>) -> Option<TokenRecord> {
        let (chain, price) = (group.chain.as_slice(), group.price.as_slice());

        let symbol = pick(
            chain,
            price,
            |r| r.symbol.clone(),
            prior.map(|p| p.symbol.clone()).filter(|s| !s.is_empty()),
        )?;

        let decimals = pick(chain, price, |r| r.decimals, prior.and_then(|p| p.decimals));
        let name = pick(price, chain, |r| r.name.clone(), prior.map(|p| p.name.clone()))
            .unwrap_or_else(|| symbol.clone());
        let logo_uri = pick(price, chain, |r| r.logo_uri.clone(), prior.and_then(|p| p.logo_uri.clone()));
        let market_cap_rank = pick(price, chain, |r| r.market_cap_rank, prior.and_then(|p| p.market_cap_rank));
        let coin_id = pick(price, chain, |r| r.coin_id.clone(), prior.and_then(|p| p.coin_id.clone()));

        let provider_source = if !chain.is_empty() {
            ProviderSource::ChainProvider
        } else {
            prior
                .map(|p| p.provider_source)
                .unwrap_or(ProviderSource::PriceProvider)
        };

        let contract_address = match key {
            TokenKey::Contract { address, .. } => Some(address.clone()),
            TokenKey::Native { .. } => None,
        };

        Some(TokenRecord {
            identity: TokenIdentity {
                chain_id: key.chain_id(),
                contract_address,
                symbol: symbol.clone(),
            },
            name,
            symbol,
            decimals,
            logo_uri,
            market_cap_rank,
            coin_id,
            provider_source,
            last_fetched_at: self.fetched_at,
        })
    }

    fn classify(&self, record: TokenRecord, prior: Option<&TokenRecord>) -> ReconciledToken {
        match prior {
            None => ReconciledToken { record, change: Change::New },
            Some(stored) if stored.same_content(&record) => ReconciledToken {
                record: stored.clone(),
                change: Change::Unchanged,
            },
            Some(_) => ReconciledToken { record, change: Change::Modified },
        }
    }
}

/// Admit, per chain, new contract tokens only while fewer than `limit`
/// distinct contracts have been seen in input order.
///
/// Input is expected in market-cap order. Tokens already in `tracked` always
/// pass and take a slot, so a stored token that fell out of the top N keeps
/// its provider data. Native and malformed records pass through untouched so
/// they are still skipped/counted downstream.
pub fn limit_per_chain(records: Vec<RawRecord>, limit: usize, tracked: &ExistingIndex) -> Vec<RawRecord> {
    let mut kept: HashMap<u64, HashSet<TokenKey>> = HashMap::new();

    records
        .into_iter()
        .filter(|raw| {
            let key = match raw.identity() {
                Some(identity) => identity.key(),
                None => return true,
            };
            if key.is_native() {
                return true;
            }
            let chain = kept.entry(key.chain_id()).or_default();
            if chain.contains(&key) {
                return true;
            }
            if chain.len() >= limit && !tracked.contains_key(&key) {
                tracing::debug!("Dropping {} below the top {} of its chain", key, limit);
                return false;
            }
            chain.insert(key);
            true
        })
        .collect()
}
