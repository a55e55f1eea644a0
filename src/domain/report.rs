//! Run Report
//!
//! Summary counts produced at the end of every run. The external commit /
//! redeploy step reads `outcome` and `has_changes()`.

use serde::{Deserialize, Serialize};

/// Result of writing a single canonical record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteResult {
    Created,
    Updated,
    Unchanged,
    /// Native asset, never written
    Skipped,
}

/// Run coordinator stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStage {
    Idle,
    Fetching,
    Reconciling,
    Writing,
    Reporting,
    Done,
    Failed,
}

impl RunStage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStage::Done | RunStage::Failed)
    }

    /// Legal forward transitions; any non-terminal stage may fail
    pub fn can_transition_to(&self, next: RunStage) -> bool {
        use RunStage::*;
        match (self, next) {
            (Idle, Fetching)
            | (Fetching, Reconciling)
            | (Reconciling, Writing)
            | (Writing, Reporting)
            | (Reporting, Done) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Succeeded,
    SucceededWithWarnings,
    Failed,
}

/// Why a provider contributed nothing to the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteFailure {
    pub token: String,
    pub message: String,
}

/// Final run summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    /// Provider failures + per-file write failures
    pub failed: usize,
    pub malformed: usize,
    /// Single-item lookups a provider gave up on without failing as a whole
    #[serde(default)]
    pub lookup_failures: usize,
    /// Logo images created or replaced
    #[serde(default)]
    pub logos_written: usize,
    #[serde(default)]
    pub logo_failures: usize,
    pub provider_failures: Vec<ProviderFailure>,
    pub write_failures: Vec<WriteFailure>,
    pub stage: RunStage,
    pub outcome: RunOutcome,
    /// Set when the run aborted (output directory unusable, nothing reconciled)
    pub error: Option<String>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self {
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failed: 0,
            malformed: 0,
            lookup_failures: 0,
            logos_written: 0,
            logo_failures: 0,
            provider_failures: Vec::new(),
            write_failures: Vec::new(),
            stage: RunStage::Idle,
            outcome: RunOutcome::Succeeded,
            error: None,
        }
    }
}

impl RunReport {
    pub fn record_write(&mut self, result: WriteResult) {
        match result {
            WriteResult::Created => self.created += 1,
            WriteResult::Updated => self.updated += 1,
            WriteResult::Unchanged => self.unchanged += 1,
            WriteResult::Skipped => self.skipped += 1,
        }
    }

    pub fn record_provider_failure(&mut self, failure: ProviderFailure) {
        self.failed += 1;
        self.provider_failures.push(failure);
    }

    pub fn record_write_failure(&mut self, failure: WriteFailure) {
        self.failed += 1;
        self.write_failures.push(failure);
    }

    pub fn record_logo(&mut self, result: WriteResult) {
        if matches!(result, WriteResult::Created | WriteResult::Updated) {
            self.logos_written += 1;
        }
    }

    /// Anything the collaborator would need to commit
    pub fn has_changes(&self) -> bool {
        self.created + self.updated + self.logos_written > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.failed > 0 || self.malformed > 0 || self.lookup_failures > 0 || self.logo_failures > 0
    }

    /// Total tokens that made it through reconciliation
    pub fn reconciled(&self) -> usize {
        self.created + self.updated + self.unchanged + self.skipped + self.write_failures.len()
    }

    /// Outcome for a run that reached the reporting stage
    pub fn finish(&mut self) {
        self.outcome = if self.has_warnings() {
            RunOutcome::SucceededWithWarnings
        } else {
            RunOutcome::Succeeded
        };
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.stage = RunStage::Failed;
        self.outcome = RunOutcome::Failed;
        self.error = Some(error.into());
    }
}
