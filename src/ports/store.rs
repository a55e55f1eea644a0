//! Snapshot Store Port
//!
//! Loads the prior snapshot and persists canonical records.

use std::path::PathBuf;
use thiserror::Error;

use crate::domain::{ExistingIndex, TokenRecord, WriteResult};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The output directory itself is unusable - fatal for the run
    #[error("Output directory {path} unusable: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A single token file could not be written - fatal for that token only
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize {token}: {message}")]
    Serialize { token: String, message: String },
}

impl StoreError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::OutputDir { .. })
    }
}

pub trait TokenStore: Send + Sync {
    /// Load every machine-owned canonical record (native entries excluded)
    fn load_index(&self) -> Result<ExistingIndex, StoreError>;

    /// Persist one record. Native records return `Skipped` without I/O,
    /// identical content returns `Unchanged` without I/O.
    fn write(&self, record: &TokenRecord) -> Result<WriteResult, StoreError>;

    /// Whether a logo image is already stored for the record
    fn has_logo(&self, record: &TokenRecord) -> bool;

    /// Persist the logo image stored next to the record, same rules as `write`
    fn write_logo(&self, record: &TokenRecord, image: &[u8]) -> Result<WriteResult, StoreError>;
}
