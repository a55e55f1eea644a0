//! Filesystem snapshot store with atomic writes

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::domain::{ExistingIndex, TokenRecord, WriteResult};
use crate::ports::{StoreError, TokenStore};

/// Externally owned subtree for native assets
pub const NATIVE_DIR: &str = "native";

const RECORD_EXTENSION: &str = "json";

/// Logo images live in `<chain_id>/pngs/<address>.png`
pub const LOGO_DIR: &str = "pngs";

const LOGO_EXTENSION: &str = "png";

/// Stable 2-space pretty JSON with a trailing newline
pub fn render_record(record: &TokenRecord) -> Result<String, StoreError> {
    let mut content = serde_json::to_string_pretty(record).map_err(|e| StoreError::Serialize {
        token: record.identity.key().to_string(),
        message: e.to_string(),
    })?;
    content.push('\n');
    Ok(content)
}

#[derive(Debug, Clone)]
pub struct FsSnapshotStore {
    root: PathBuf,
}

impl FsSnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Canonical path of a contract record, None for natives
    pub fn record_path(&self, record: &TokenRecord) -> Option<PathBuf> {
        let address = record.identity.contract_address.as_deref()?;
        Some(
            self.root
                .join(record.identity.chain_id.to_string())
                .join(format!("{}.{}", address, RECORD_EXTENSION)),
        )
    }

    /// Logo image path of a contract record, None for natives
    pub fn logo_path(&self, record: &TokenRecord) -> Option<PathBuf> {
        let address = record.identity.contract_address.as_deref()?;
        Some(
            self.root
                .join(record.identity.chain_id.to_string())
                .join(LOGO_DIR)
                .join(format!("{}.{}", address, LOGO_EXTENSION)),
        )
    }

    fn ensure_root(&self) -> Result<(), StoreError> {
        fs::create_dir_all(&self.root).map_err(|source| StoreError::OutputDir {
            path: self.root.clone(),
            source,
        })
    }

    fn load_chain_dir(&self, dir: &Path, chain_id: u64, index: &mut ExistingIndex) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Skipping unreadable chain directory {}: {}", dir.display(), e);
                return;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !is_record_file(&path) {
                continue;
            }

            let record = match fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|content| serde_json::from_str::<TokenRecord>(&content).map_err(|e| e.to_string()))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping unparsable token file {}: {}", path.display(), e);
                    continue;
                }
            };

            let stem = path.file_stem().and_then(|s| s.to_str());
            let placed = record.identity.chain_id == chain_id && record.identity.contract_address.as_deref() == stem;
            if !placed {
                tracing::warn!(
                    "Skipping misplaced token file {} (identity {})",
                    path.display(),
                    record.identity.key()
                );
                continue;
            }

            index.insert(record.identity.key(), record);
        }
    }
}

/// `*.json` and not a leftover temp file
fn is_record_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file()
        && !name.starts_with('.')
        && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
}

fn is_unsafe_component(address: &str) -> bool {
    address.contains('/') || address.contains('\\') || address.starts_with('.')
}

fn check_address(record: &TokenRecord, path: &Path) -> Result<(), StoreError> {
    let address = record.identity.contract_address.as_deref().unwrap_or_default();
    if is_unsafe_component(address) {
        return Err(StoreError::Io {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "contract address is not a valid file name",
            ),
        });
    }
    Ok(())
}

/// Replace `path` with `content` via a temp file in the same directory,
/// leaving identical files untouched
fn write_atomic(path: &Path, content: &[u8]) -> Result<WriteResult, StoreError> {
    let io_error = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    let existed = match fs::read(path) {
        Ok(current) if current == content => return Ok(WriteResult::Unchanged),
        Ok(_) => true,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(source) => return Err(io_error(source)),
    };

    let dir = path.parent().ok_or_else(|| {
        io_error(std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent"))
    })?;

    fs::create_dir_all(dir).map_err(io_error)?;
    let mut temp = NamedTempFile::new_in(dir).map_err(io_error)?;
    temp.write_all(content).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path).map_err(|e| io_error(e.error))?;

    tracing::debug!("Wrote {}", path.display());
    Ok(if existed { WriteResult::Updated } else { WriteResult::Created })
}

impl TokenStore for FsSnapshotStore {
    fn load_index(&self) -> Result<ExistingIndex, StoreError> {
        self.ensure_root()?;

        let entries = fs::read_dir(&self.root).map_err(|source| StoreError::OutputDir {
            path: self.root.clone(),
            source,
        })?;

        let mut index = ExistingIndex::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if name == NATIVE_DIR {
                continue;
            }
            let Ok(chain_id) = name.parse::<u64>() else {
                tracing::debug!("Ignoring non-chain directory {}", path.display());
                continue;
            };
            self.load_chain_dir(&path, chain_id, &mut index);
        }

        tracing::info!("Loaded {} existing token records from {}", index.len(), self.root.display());
        Ok(index)
    }

    fn write(&self, record: &TokenRecord) -> Result<WriteResult, StoreError> {
        let Some(path) = self.record_path(record) else {
            return Ok(WriteResult::Skipped);
        };
        check_address(record, &path)?;

        let content = render_record(record)?;
        write_atomic(&path, content.as_bytes())
    }

    fn has_logo(&self, record: &TokenRecord) -> bool {
        self.logo_path(record).is_some_and(|path| path.is_file())
    }

    fn write_logo(&self, record: &TokenRecord, image: &[u8]) -> Result<WriteResult, StoreError> {
        let Some(path) = self.logo_path(record) else {
            return Ok(WriteResult::Skipped);
        };
        check_address(record, &path)?;
        write_atomic(&path, image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use crate::domain::{ProviderSource, TokenIdentity};

    fn record(chain_id: u64, address: Option<&str>, decimals: Option<u8>) -> TokenRecord {
        TokenRecord {
            identity: TokenIdentity::new(chain_id, address, Some("usdc")).unwrap(),
            name: "USDC".to_string(),
            symbol: "usdc".to_string(),
            decimals,
            logo_uri: Some("https://img/usdc.png".to_string()),
            market_cap_rank: Some(7),
            coin_id: Some("usd-coin".to_string()),
            provider_source: ProviderSource::ChainProvider,
            last_fetched_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_write_creates_then_unchanged_then_updated() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let usdc = record(1, Some("0xa0b8"), Some(6));

        assert_eq!(store.write(&usdc).unwrap(), WriteResult::Created);
        assert!(dir.path().join("1").join("0xa0b8.json").exists());

        assert_eq!(store.write(&usdc).unwrap(), WriteResult::Unchanged);

        let changed = record(1, Some("0xa0b8"), Some(18));
        assert_eq!(store.write(&changed).unwrap(), WriteResult::Updated);
    }

    #[test]
    fn test_native_is_skipped_without_io() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path().join("out"));

        assert_eq!(store.write(&record(1, None, Some(18))).unwrap(), WriteResult::Skipped);
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_rendering_is_pretty_with_trailing_newline() {
        let content = render_record(&record(1, Some("0xa0b8"), Some(6))).unwrap();
        assert!(content.ends_with("}\n"));
        assert!(content.contains("\n  \"name\": \"USDC\""));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.write(&record(1, Some("0xa0b8"), Some(6))).unwrap();
        store.write(&record(1, Some("0xa0b8"), Some(18))).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path().join("1"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0xa0b8.json".to_string()]);
    }

    #[test]
    fn test_load_index_round_trips_written_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let eth_usdc = record(1, Some("0xa0b8"), Some(6));
        let sol_usdc = record(101, Some("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"), Some(6));
        store.write(&eth_usdc).unwrap();
        store.write(&sol_usdc).unwrap();

        let index = store.load_index().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&eth_usdc.identity.key()), Some(&eth_usdc));
        assert_eq!(index.get(&sol_usdc.identity.key()), Some(&sol_usdc));
    }

    #[test]
    fn test_load_index_ignores_foreign_and_broken_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        store.write(&record(1, Some("0xa0b8"), Some(6))).unwrap();

        fs::create_dir_all(dir.path().join(NATIVE_DIR).join("1")).unwrap();
        fs::write(dir.path().join(NATIVE_DIR).join("1").join("eth.json"), "{}").unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::write(dir.path().join("assets").join("x.json"), "{}").unwrap();
        fs::write(dir.path().join("1").join("broken.json"), "{ not json").unwrap();
        fs::write(dir.path().join("1").join(".tmpAbc123"), "partial").unwrap();
        fs::write(dir.path().join("1").join("README.md"), "hello").unwrap();

        let index = store.load_index().unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_load_index_skips_misplaced_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let content = render_record(&record(1, Some("0xa0b8"), Some(6))).unwrap();
        fs::create_dir_all(dir.path().join("10")).unwrap();
        fs::write(dir.path().join("10").join("0xa0b8.json"), content).unwrap();

        assert!(store.load_index().unwrap().is_empty());
    }

    #[test]
    fn test_load_index_skips_file_named_after_another_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let content = render_record(&record(1, Some("0xa0b8"), Some(6))).unwrap();
        fs::create_dir_all(dir.path().join("1")).unwrap();
        fs::write(dir.path().join("1").join("0xother.json"), content).unwrap();

        assert!(store.load_index().unwrap().is_empty());
    }

    #[test]
    fn test_logo_written_next_to_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let usdc = record(1, Some("0xa0b8"), Some(6));
        store.write(&usdc).unwrap();

        assert!(!store.has_logo(&usdc));
        assert_eq!(store.write_logo(&usdc, b"png-bytes").unwrap(), WriteResult::Created);
        assert!(store.has_logo(&usdc));
        assert_eq!(
            fs::read(dir.path().join("1").join(LOGO_DIR).join("0xa0b8.png")).unwrap(),
            b"png-bytes".to_vec()
        );
        assert_eq!(store.write_logo(&usdc, b"png-bytes").unwrap(), WriteResult::Unchanged);
        assert_eq!(store.write_logo(&usdc, b"new-bytes").unwrap(), WriteResult::Updated);

        // The pngs/ subdirectory is not mistaken for records
        assert_eq!(store.load_index().unwrap().len(), 1);
    }

    #[test]
    fn test_native_logo_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let eth = record(1, None, Some(18));
        assert!(!store.has_logo(&eth));
        assert_eq!(store.write_logo(&eth, b"png").unwrap(), WriteResult::Skipped);
        assert!(!dir.path().join("1").exists());
    }

    #[test]
    fn test_load_index_creates_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path().join("site").join("tokens"));
        assert!(store.load_index().unwrap().is_empty());
        assert!(store.root().exists());
    }

    #[test]
    fn test_unusable_root_is_output_dir_error() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, "x").unwrap();

        let store = FsSnapshotStore::new(&file);
        let err = store.load_index().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unsafe_address_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsSnapshotStore::new(dir.path());
        let err = store.write(&record(1, Some("../escape"), Some(6))).unwrap_err();
        assert!(!err.is_fatal());
    }
}
