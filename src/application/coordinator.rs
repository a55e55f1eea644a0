//! Run Coordinator
//!
//! Drives one refresh: load the prior snapshot, fetch from every provider,
//! reconcile, write changed records and produce the `RunReport`.
//!
//! Providers run in two phases. Discovery providers run concurrently first;
//! targeted providers then receive the discovered contract identities plus
//! every identity already in the snapshot. With a logo source attached,
//! missing logo images are downloaded after the records are written.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tokio::task::JoinSet;

use crate::domain::{
    limit_per_chain, Change, ExistingIndex, ProviderFailure, RawRecord, ReconciledToken, Reconciler,
    RunReport, RunStage, TokenIdentity, TokenKey, WriteFailure,
};
use crate::ports::{BatchRequest, LogoSource, ProviderError, TokenProvider, TokenStore};

/// Default top-N contract tokens kept per chain
pub const DEFAULT_MAX_TOKENS_PER_CHAIN: usize = 100;

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Discovery records kept per chain, in provider order
    pub max_tokens_per_chain: usize,
    /// Restrict the run to these chain ids
    pub chain_filter: Option<BTreeSet<u64>>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_tokens_per_chain: DEFAULT_MAX_TOKENS_PER_CHAIN,
            chain_filter: None,
        }
    }
}

/// Everything one provider returned across its pages
#[derive(Debug, Default)]
struct Fetched {
    records: Vec<RawRecord>,
    /// Single-item lookups that failed without failing the provider
    skipped: usize,
}

/// Records or failure of one provider, all or nothing
type ProviderResult = (String, Result<Fetched, ProviderError>);

pub struct RunCoordinator {
    providers: Vec<Arc<dyn TokenProvider>>,
    store: Arc<dyn TokenStore>,
    logos: Option<Arc<dyn LogoSource>>,
    config: CoordinatorConfig,
    stop_requested: Arc<RwLock<bool>>,
    fetched_at: Option<DateTime<Utc>>,
}

impl RunCoordinator {
    pub fn new(
        providers: Vec<Arc<dyn TokenProvider>>,
        store: Arc<dyn TokenStore>,
        config: CoordinatorConfig,
    ) -> Self {
        Self {
            providers,
            store,
            logos: None,
            config,
            stop_requested: Arc::new(RwLock::new(false)),
            fetched_at: None,
        }
    }

    /// Pin the run timestamp instead of using the wall clock
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.fetched_at = Some(fetched_at);
        self
    }

    /// Download missing logo images from `logos` after writing records
    pub fn with_logo_source(mut self, logos: Arc<dyn LogoSource>) -> Self {
        self.logos = Some(logos);
        self
    }

    /// Ask running providers to stop after their current batch
    pub async fn stop(&self) {
        *self.stop_requested.write().await = true;
        tracing::info!("Stop requested, providers will halt after their current batch");
    }

    pub async fn is_stop_requested(&self) -> bool {
        *self.stop_requested.read().await
    }

    /// Execute one refresh. Never returns an error: every failure is
    /// reflected in the report's outcome.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::default();
        enter(&mut report, RunStage::Fetching);

        let existing = match self.store.load_index() {
            Ok(index) => index,
            Err(e) => {
                tracing::error!("Cannot load existing snapshot: {}", e);
                report.fail(e.to_string());
                return report;
            }
        };

        let incoming = self.fetch_all(&existing, &mut report).await;

        enter(&mut report, RunStage::Reconciling);
        let fetched_at = self.fetched_at.unwrap_or_else(Utc::now);
        let reconciliation = Reconciler::new(fetched_at).reconcile(&existing, incoming);
        report.malformed = reconciliation.malformed;

        if reconciliation.is_empty() {
            tracing::error!(
                "No tokens reconciled ({} provider failures, {} malformed records)",
                report.provider_failures.len(),
                report.malformed
            );
            report.fail("no tokens could be reconciled from any provider");
            return report;
        }

        enter(&mut report, RunStage::Writing);
        let mut unwritten = HashSet::new();
        for token in &reconciliation.tokens {
            if token.change == Change::Unchanged {
                report.unchanged += 1;
                continue;
            }

            match self.store.write(&token.record) {
                Ok(result) => report.record_write(result),
                Err(e) if e.is_fatal() => {
                    tracing::error!("Output directory became unusable: {}", e);
                    report.fail(e.to_string());
                    return report;
                }
                Err(e) => {
                    let key = token.record.identity.key();
                    tracing::warn!("Failed to write {}: {}", key, e);
                    report.record_write_failure(WriteFailure {
                        token: key.to_string(),
                        message: e.to_string(),
                    });
                    unwritten.insert(key);
                }
            }
        }

        if let Some(logos) = &self.logos {
            let tokens = reconciliation
                .tokens
                .iter()
                .filter(|t| !unwritten.contains(&t.record.identity.key()));
            if let Err(e) = self.download_logos(logos.as_ref(), tokens, &mut report).await {
                tracing::error!("Output directory became unusable: {}", e);
                report.fail(e);
                return report;
            }
        }

        enter(&mut report, RunStage::Reporting);
        report.finish();
        tracing::info!(
            "Run complete: {} created, {} updated, {} unchanged, {} skipped, {} failed, {} malformed, {} failed lookups, {} logos",
            report.created,
            report.updated,
            report.unchanged,
            report.skipped,
            report.failed,
            report.malformed,
            report.lookup_failures,
            report.logos_written
        );

        enter(&mut report, RunStage::Done);
        report
    }

    /// Fetch and store the logo of every written contract token that has a
    /// logo URL but no stored image. Err only when the store is unusable.
    async fn download_logos<'a>(
        &self,
        logos: &dyn LogoSource,
        tokens: impl Iterator<Item = &'a ReconciledToken>,
        report: &mut RunReport,
    ) -> Result<(), String> {
        let missing: Vec<_> = tokens
            .map(|t| &t.record)
            .filter(|r| !r.is_native() && r.logo_uri.is_some() && !self.store.has_logo(r))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        tracing::info!("Downloading {} missing logos", missing.len());

        for record in missing {
            if self.is_stop_requested().await {
                tracing::info!("Stop requested, leaving remaining logos for the next run");
                break;
            }
            let Some(url) = record.logo_uri.as_deref() else {
                continue;
            };

            let image = match logos.fetch_logo(url).await {
                Ok(image) if !image.is_empty() => image,
                Ok(_) => {
                    tracing::warn!("Empty logo for {} from {}", record.identity.key(), url);
                    report.logo_failures += 1;
                    continue;
                }
                Err(e) => {
                    tracing::warn!("Logo download for {} failed: {}", record.identity.key(), e);
                    report.logo_failures += 1;
                    continue;
                }
            };

            match self.store.write_logo(record, &image) {
                Ok(result) => report.record_logo(result),
                Err(e) if e.is_fatal() => return Err(e.to_string()),
                Err(e) => {
                    tracing::warn!("Failed to store logo for {}: {}", record.identity.key(), e);
                    report.logo_failures += 1;
                }
            }
        }
        Ok(())
    }

    /// Both provider phases; failed providers are recorded and contribute nothing
    async fn fetch_all(&self, existing: &ExistingIndex, report: &mut RunReport) -> Vec<RawRecord> {
        let (targeted, discovery): (Vec<_>, Vec<_>) = self
            .providers
            .iter()
            .cloned()
            .partition(|p| p.needs_targets());

        tracing::info!(
            "Fetching from {} discovery and {} targeted providers",
            discovery.len(),
            targeted.len()
        );

        let discovered = self.collect(run_phase(discovery, Arc::new(Vec::new()), &self.stop_requested).await, report);
        let mut incoming = limit_per_chain(
            self.filter_chains(discovered),
            self.config.max_tokens_per_chain,
            existing,
        );

        if !targeted.is_empty() {
            let targets = Arc::new(self.targets(&incoming, existing));
            tracing::info!("Looking up {} contract identities", targets.len());

            let looked_up = self.collect(run_phase(targeted, targets, &self.stop_requested).await, report);
            incoming.extend(self.filter_chains(looked_up));
        }

        incoming
    }

    fn collect(&self, results: Vec<ProviderResult>, report: &mut RunReport) -> Vec<RawRecord> {
        let mut records = Vec::new();
        for (provider, result) in results {
            match result {
                Ok(fetched) => {
                    tracing::info!("{}: {} records", provider, fetched.records.len());
                    if fetched.skipped > 0 {
                        tracing::warn!("{}: {} lookups failed", provider, fetched.skipped);
                        report.lookup_failures += fetched.skipped;
                    }
                    records.extend(fetched.records);
                }
                Err(e) => {
                    if e.is_auth() {
                        tracing::error!("{}", e);
                    } else {
                        tracing::warn!("{}", e);
                    }
                    report.record_provider_failure(ProviderFailure {
                        provider,
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
            }
        }
        records
    }

    fn filter_chains(&self, records: Vec<RawRecord>) -> Vec<RawRecord> {
        match &self.config.chain_filter {
            None => records,
            Some(chains) => records
                .into_iter()
                .filter(|r| r.chain_id.is_some_and(|id| chains.contains(&id)))
                .collect(),
        }
    }

    fn in_scope(&self, chain_id: u64) -> bool {
        self.config
            .chain_filter
            .as_ref()
            .map_or(true, |chains| chains.contains(&chain_id))
    }

    /// Contract identities discovered this run plus those already stored
    fn targets(&self, discovered: &[RawRecord], existing: &ExistingIndex) -> Vec<TokenIdentity> {
        let mut targets: BTreeMap<TokenKey, TokenIdentity> = BTreeMap::new();

        let known = existing.values().map(|record| record.identity.clone());
        let fresh = discovered.iter().filter_map(RawRecord::identity);

        for identity in fresh.chain(known) {
            if identity.is_native() || !self.in_scope(identity.chain_id) {
                continue;
            }
            targets.entry(identity.key()).or_insert(identity);
        }

        targets.into_values().collect()
    }
}

fn enter(report: &mut RunReport, stage: RunStage) {
    debug_assert!(
        report.stage.can_transition_to(stage),
        "illegal stage transition {:?} -> {:?}",
        report.stage,
        stage
    );
    tracing::debug!("Run stage: {:?} -> {:?}", report.stage, stage);
    report.stage = stage;
}

/// Run every provider of one phase concurrently, results in provider order
async fn run_phase(
    providers: Vec<Arc<dyn TokenProvider>>,
    targets: Arc<Vec<TokenIdentity>>,
    stop: &Arc<RwLock<bool>>,
) -> Vec<ProviderResult> {
    let mut set = JoinSet::new();
    let names: Vec<String> = providers.iter().map(|p| p.name().to_string()).collect();

    for (index, provider) in providers.into_iter().enumerate() {
        let targets = Arc::clone(&targets);
        let stop = Arc::clone(stop);
        set.spawn(async move { (index, drain(provider, targets, stop).await) });
    }

    let mut slots: Vec<Option<Result<Fetched, ProviderError>>> = names.iter().map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!("Provider task failed: {}", e),
        }
    }

    names
        .into_iter()
        .zip(slots)
        .map(|(name, slot)| {
            let result = slot.unwrap_or_else(|| {
                Err(ProviderError::Client {
                    provider: name.clone(),
                    message: "provider task aborted".to_string(),
                })
            });
            (name, result)
        })
        .collect()
}

/// Page through one provider until the cursor runs out
async fn drain(
    provider: Arc<dyn TokenProvider>,
    targets: Arc<Vec<TokenIdentity>>,
    stop: Arc<RwLock<bool>>,
) -> Result<Fetched, ProviderError> {
    let mut request = BatchRequest::first(targets);
    let mut fetched = Fetched::default();

    loop {
        if *stop.read().await {
            return Err(ProviderError::Cancelled {
                provider: provider.name().to_string(),
            });
        }

        let batch = provider.fetch_batch(&request).await?;
        fetched.records.extend(batch.records);
        fetched.skipped += batch.skipped;

        match batch.next_cursor {
            Some(cursor) if request.cursor.as_deref() == Some(cursor.as_str()) => {
                tracing::warn!("{}: cursor '{}' repeated, ending pagination", provider.name(), cursor);
                return Ok(fetched);
            }
            Some(cursor) => request = request.next(cursor),
            None => return Ok(fetched),
        }
    }
}
