//! Domain Layer - Core aggregation logic
//!
//! Pure types and logic with no I/O. External interactions happen through
//! the ports layer.
//!
//! - `identity`: token identity and normalization rules
//! - `record`: raw provider records and canonical token records
//! - `reconciler`: provider-priority merge against the stored snapshot
//! - `retry`: backoff state machine shared by provider clients
//! - `report`: run summary and stage machine

pub mod identity;
pub mod record;
pub mod reconciler;
pub mod retry;
pub mod report;

pub use identity::{TokenIdentity, TokenKey, NATIVE_ADDRESS_MARKER};
pub use record::{ProviderSource, RawRecord, TokenRecord};
pub use reconciler::{limit_per_chain, Change, ExistingIndex, ReconciledToken, Reconciler, Reconciliation};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use report::{ProviderFailure, RunOutcome, RunReport, RunStage, WriteFailure, WriteResult};
