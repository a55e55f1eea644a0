//! Scripted port implementations for tests and dry runs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use async_trait::async_trait;

use crate::domain::{ExistingIndex, ProviderSource, RawRecord, TokenKey, TokenRecord, WriteResult};
use super::provider::{Batch, BatchRequest, LogoSource, ProviderError, TokenProvider};
use super::store::{StoreError, TokenStore};

/// Failure a scripted provider raises instead of returning a page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedFailure {
    Auth,
    Unavailable,
}

/// Provider that serves pre-recorded pages and records every call
#[derive(Debug)]
pub struct ScriptedProvider {
    name: String,
    source: ProviderSource,
    pages: Vec<Vec<RawRecord>>,
    target_records: HashMap<TokenKey, RawRecord>,
    targeted: bool,
    skipped: usize,
    failure: Option<(usize, ScriptedFailure)>,
    calls: Arc<Mutex<Vec<Option<String>>>>,
    seen_targets: Arc<Mutex<Vec<TokenKey>>>,
}

impl ScriptedProvider {
    /// Discovery provider serving `pages` in order
    pub fn new(name: &str, source: ProviderSource) -> Self {
        Self {
            name: name.to_string(),
            source,
            pages: Vec::new(),
            target_records: HashMap::new(),
            targeted: false,
            skipped: 0,
            failure: None,
            calls: Arc::new(Mutex::new(Vec::new())),
            seen_targets: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Targeted provider answering only for requested identities
    pub fn targeted(name: &str, source: ProviderSource) -> Self {
        Self {
            targeted: true,
            ..Self::new(name, source)
        }
    }

    /// Builder method to append a page
    pub fn with_page(mut self, records: Vec<RawRecord>) -> Self {
        self.pages.push(records);
        self
    }

    /// Builder method to register the answer for one target
    pub fn with_target_record(mut self, record: RawRecord) -> Self {
        if let Some(identity) = record.identity() {
            self.target_records.insert(identity.key(), record);
        }
        self
    }

    /// Builder method to report `count` failed lookups with the targeted answer
    pub fn with_skipped_lookups(mut self, count: usize) -> Self {
        self.skipped = count;
        self
    }

    /// Builder method to fail when page `page` (0-based) is requested
    pub fn failing_at(mut self, page: usize, failure: ScriptedFailure) -> Self {
        self.failure = Some((page, failure));
        self
    }

    /// Cursors of all recorded calls
    pub fn get_calls(&self) -> Vec<Option<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Target keys received on the first call
    pub fn get_seen_targets(&self) -> Vec<TokenKey> {
        self.seen_targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl TokenProvider for ScriptedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> ProviderSource {
        self.source
    }

    fn needs_targets(&self) -> bool {
        self.targeted
    }

    async fn fetch_batch(&self, request: &BatchRequest) -> Result<Batch, ProviderError> {
        self.calls.lock().unwrap().push(request.cursor.clone());

        let page: usize = match &request.cursor {
            Some(cursor) => cursor.parse().map_err(|_| ProviderError::Parse {
                provider: self.name.clone(),
                message: format!("bad cursor {}", cursor),
            })?,
            None => 0,
        };

        if let Some((failing_page, failure)) = self.failure {
            if failing_page == page {
                return Err(match failure {
                    ScriptedFailure::Auth => ProviderError::Auth {
                        provider: self.name.clone(),
                        status: 401,
                    },
                    ScriptedFailure::Unavailable => ProviderError::Unavailable {
                        provider: self.name.clone(),
                        attempts: 3,
                        reason: "HTTP 503".to_string(),
                    },
                });
            }
        }

        if self.targeted {
            let keys: Vec<TokenKey> = request.targets.iter().map(|t| t.key()).collect();
            let records = keys
                .iter()
                .filter_map(|key| self.target_records.get(key).cloned())
                .collect();
            *self.seen_targets.lock().unwrap() = keys;
            return Ok(Batch {
                records,
                next_cursor: None,
                skipped: self.skipped,
            });
        }

        let records = self.pages.get(page).cloned().unwrap_or_default();
        let next_cursor = if page + 1 < self.pages.len() {
            Some((page + 1).to_string())
        } else {
            None
        };
        Ok(Batch {
            records,
            next_cursor,
            skipped: 0,
        })
    }
}

/// Logo source serving registered images; unknown URLs fail with 404
#[derive(Debug, Default)]
pub struct ScriptedLogoSource {
    images: HashMap<String, Vec<u8>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLogoSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register the image served for `url`
    pub fn with_image(mut self, url: &str, image: &[u8]) -> Self {
        self.images.insert(url.to_string(), image.to_vec());
        self
    }

    /// URLs of all recorded downloads
    pub fn get_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogoSource for ScriptedLogoSource {
    async fn fetch_logo(&self, url: &str) -> Result<Vec<u8>, ProviderError> {
        self.calls.lock().unwrap().push(url.to_string());
        self.images.get(url).cloned().ok_or_else(|| ProviderError::Rejected {
            provider: "logos".to_string(),
            status: 404,
            body: "not found".to_string(),
        })
    }
}

/// In-memory snapshot store
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<ExistingIndex>>,
    writes: Arc<Mutex<Vec<TokenKey>>>,
    logos: Arc<Mutex<HashMap<TokenKey, Vec<u8>>>>,
    failing: HashSet<TokenKey>,
    broken: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to seed the prior snapshot
    pub fn with_record(self, record: TokenRecord) -> Self {
        self.records
            .lock()
            .unwrap()
            .insert(record.identity.key(), record);
        self
    }

    /// Builder method to make writes of one token fail
    pub fn failing_on(mut self, key: TokenKey) -> Self {
        self.failing.insert(key);
        self
    }

    /// Builder method to make the whole store unusable
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    /// Keys of every record that reached storage, in write order
    pub fn get_writes(&self) -> Vec<TokenKey> {
        self.writes.lock().unwrap().clone()
    }

    /// Builder method to seed a stored logo image
    pub fn with_logo(self, key: TokenKey, image: &[u8]) -> Self {
        self.logos.lock().unwrap().insert(key, image.to_vec());
        self
    }

    pub fn get_logo(&self, key: &TokenKey) -> Option<Vec<u8>> {
        self.logos.lock().unwrap().get(key).cloned()
    }

    pub fn get(&self, key: &TokenKey) -> Option<TokenRecord> {
        self.records.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for MemoryStore {
    fn load_index(&self) -> Result<ExistingIndex, StoreError> {
        if self.broken {
            return Err(StoreError::OutputDir {
                path: PathBuf::from("memory"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "store is broken"),
            });
        }
        Ok(self.records.lock().unwrap().clone())
    }

    fn write(&self, record: &TokenRecord) -> Result<WriteResult, StoreError> {
        if record.is_native() {
            return Ok(WriteResult::Skipped);
        }

        let key = record.identity.key();
        if self.failing.contains(&key) {
            return Err(StoreError::Io {
                path: PathBuf::from(key.to_string()),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            });
        }

        let mut records = self.records.lock().unwrap();
        let result = match records.get(&key) {
            Some(stored) if stored == record => return Ok(WriteResult::Unchanged),
            Some(_) => WriteResult::Updated,
            None => WriteResult::Created,
        };
        records.insert(key.clone(), record.clone());
        self.writes.lock().unwrap().push(key);
        Ok(result)
    }

    fn has_logo(&self, record: &TokenRecord) -> bool {
        self.logos.lock().unwrap().contains_key(&record.identity.key())
    }

    fn write_logo(&self, record: &TokenRecord, image: &[u8]) -> Result<WriteResult, StoreError> {
        if record.is_native() {
            return Ok(WriteResult::Skipped);
        }

        let mut logos = self.logos.lock().unwrap();
        let result = match logos.get(&record.identity.key()) {
            Some(stored) if stored.as_slice() == image => return Ok(WriteResult::Unchanged),
            Some(_) => WriteResult::Updated,
            None => WriteResult::Created,
        };
        logos.insert(record.identity.key(), image.to_vec());
        Ok(result)
    }
}
