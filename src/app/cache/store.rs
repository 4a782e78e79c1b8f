//! Persistent record of discovered remote entries
//!
//! All scan roots share one JSON document. Writers replace the whole document
//! through a temporary file in the same directory followed by a rename, so a
//! reader sees either the previous document or the new one, never a partial
//! write.

use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use super::stats::{CacheInfo, RootSummary};
use crate::app::models::RemoteEntry;
use crate::constants::files;
use crate::errors::{CacheError, CacheResult};

/// Entries discovered under one scan root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Scan root the entries were discovered under
    pub root: Url,
    /// When the scan finished
    pub discovered_at: DateTime<Utc>,
    /// Discovered entries in crawl order
    pub entries: Vec<RemoteEntry>,
}

impl CacheRecord {
    pub fn new(root: Url, entries: Vec<RemoteEntry>) -> Self {
        Self {
            root,
            discovered_at: Utc::now(),
            entries: dedupe_entries(entries),
        }
    }

    /// Number of file entries
    pub fn file_count(&self) -> usize {
        self.entries.iter().filter(|entry| entry.is_file()).count()
    }
}

/// On-disk layout of the cache document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    pub version: u32,
    /// Records keyed by the scan root URL
    pub records: BTreeMap<String, CacheRecord>,
}

impl CacheDocument {
    fn empty() -> Self {
        Self {
            version: files::CACHE_FORMAT_VERSION,
            records: BTreeMap::new(),
        }
    }
}

/// Keeps the first occurrence of every URL
pub fn dedupe_entries(entries: Vec<RemoteEntry>) -> Vec<RemoteEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.url.as_str().to_string()))
        .collect()
}

/// JSON-backed cache store
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CacheStore {
    /// Create a store backed by the document at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store using the default document name in the working directory
    pub fn in_working_directory() -> Self {
        Self::new(files::CACHE_FILE_NAME)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record for `root`, if one was stored
    ///
    /// A missing, unreadable or corrupt document counts as "no record" so
    /// the caller falls back to crawling.
    pub async fn load(&self, root: &Url) -> CacheResult<Option<CacheRecord>> {
        let document = match self.read_document().await {
            Ok(Some(document)) => document,
            Ok(None) => return Ok(None),
            Err(e) => {
                warn!("Ignoring unusable cache document {}: {}", self.path.display(), e);
                return Ok(None);
            }
        };

        let Some(mut record) = document.records.get(root.as_str()).cloned() else {
            debug!("No cache record for {}", root);
            return Ok(None);
        };

        record.entries = dedupe_entries(record.entries);
        info!(
            "Loaded {} cached entries for {} (discovered {})",
            record.entries.len(),
            root,
            record.discovered_at
        );
        Ok(Some(record))
    }

    /// Insert or replace the record for its root
    pub async fn store(&self, record: CacheRecord) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document_or_empty().await;
        let root = record.root.clone();
        let count = record.entries.len();
        document.records.insert(root.as_str().to_string(), record);
        self.write_document(document).await?;
        info!("Cached {} entries for {}", count, root);
        Ok(())
    }

    /// Remove the record for `root`; returns whether one existed
    pub async fn remove(&self, root: &Url) -> CacheResult<bool> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_document_or_empty().await;
        let removed = document.records.remove(root.as_str()).is_some();
        if removed {
            self.write_document(document).await?;
        }
        Ok(removed)
    }

    /// Delete the whole document
    pub async fn clear(&self) -> CacheResult<()> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("Removed cache document {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    /// Summary of the stored records
    pub async fn info(&self) -> CacheResult<CacheInfo> {
        let size_bytes = match tokio::fs::metadata(&self.path).await {
            Ok(metadata) => Some(metadata.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let roots = match size_bytes {
            Some(_) => self
                .read_document()
                .await?
                .map(|document| {
                    document
                        .records
                        .values()
                        .map(RootSummary::from_record)
                        .collect()
                })
                .unwrap_or_default(),
            None => Vec::new(),
        };

        Ok(CacheInfo {
            path: self.path.clone(),
            size_bytes,
            roots,
        })
    }

    async fn read_document(&self) -> CacheResult<Option<CacheDocument>> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let document: CacheDocument = serde_json::from_str(&raw)?;
        if document.version != files::CACHE_FORMAT_VERSION {
            return Err(CacheError::UnsupportedVersion {
                found: document.version,
                expected: files::CACHE_FORMAT_VERSION,
            });
        }
        Ok(Some(document))
    }

    async fn read_document_or_empty(&self) -> CacheDocument {
        match self.read_document().await {
            Ok(Some(document)) => document,
            Ok(None) => CacheDocument::empty(),
            Err(e) => {
                warn!(
                    "Replacing unusable cache document {}: {}",
                    self.path.display(),
                    e
                );
                CacheDocument::empty()
            }
        }
    }

    async fn write_document(&self, document: CacheDocument) -> CacheResult<()> {
        let json = serde_json::to_vec_pretty(&document)?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomic(&path, &json))
            .await
            .map_err(|e| CacheError::AtomicWriteFailed {
                path: self.path.clone(),
                reason: e.to_string(),
            })?
    }
}

/// Writes `contents` to a sibling temp file and renames it over `path`
fn write_atomic(path: &Path, contents: &[u8]) -> CacheResult<()> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&directory).map_err(|source| CacheError::Io {
        path: directory.clone(),
        source,
    })?;

    let io_error = |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut temp = tempfile::Builder::new()
        .prefix(".eog_cache")
        .suffix(files::TEMP_FILE_SUFFIX)
        .tempfile_in(&directory)
        .map_err(io_error)?;
    temp.write_all(contents).map_err(io_error)?;
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path)
        .map_err(|e| CacheError::AtomicWriteFailed {
            path: path.to_path_buf(),
            reason: e.error.to_string(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn root() -> Url {
        Url::parse("https://eogdata.mines.edu/nighttime_light/monthly_notile/").unwrap()
    }

    fn file_entry(path: &str) -> RemoteEntry {
        RemoteEntry::file(root().join(path).unwrap(), path, Some(100))
    }

    #[tokio::test]
    async fn test_store_and_load_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache.json"));

        assert!(store.load(&root()).await.unwrap().is_none());

        let record = CacheRecord::new(
            root(),
            vec![
                file_entry("2012/a.avg_rade9h.tif.gz"),
                file_entry("2012/b.cf_cvg.tif.gz"),
            ],
        );
        store.store(record.clone()).await.unwrap();

        let loaded = store.load(&root()).await.unwrap().unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.file_count(), 2);
    }

    #[tokio::test]
    async fn test_records_are_keyed_by_root() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache.json"));
        let other = root().join("2013/").unwrap();

        store
            .store(CacheRecord::new(root(), vec![file_entry("a.cf_cvg.tif.gz")]))
            .await
            .unwrap();
        store
            .store(CacheRecord::new(other.clone(), Vec::new()))
            .await
            .unwrap();

        assert_eq!(store.load(&root()).await.unwrap().unwrap().entries.len(), 1);
        assert!(store.load(&other).await.unwrap().unwrap().entries.is_empty());

        assert!(store.remove(&other).await.unwrap());
        assert!(store.load(&other).await.unwrap().is_none());
        assert!(store.load(&root()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_duplicates_removed_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");

        // Hand-written document with a duplicated URL
        let entry = file_entry("a.cf_cvg.tif.gz");
        let mut document = CacheDocument::empty();
        document.records.insert(
            root().to_string(),
            CacheRecord {
                root: root(),
                discovered_at: Utc::now(),
                entries: vec![entry.clone(), entry.clone()],
            },
        );
        std::fs::write(&path, serde_json::to_vec(&document).unwrap()).unwrap();

        let store = CacheStore::new(&path);
        let loaded = store.load(&root()).await.unwrap().unwrap();
        assert_eq!(loaded.entries, vec![entry]);
    }

    #[tokio::test]
    async fn test_corrupt_document_treated_as_missing() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cache.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = CacheStore::new(&path);
        assert!(store.load(&root()).await.unwrap().is_none());

        // A later store replaces the corrupt document
        store
            .store(CacheRecord::new(root(), vec![file_entry("a.cf_cvg.tif.gz")]))
            .await
            .unwrap();
        assert!(store.load(&root()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache.json"));
        store
            .store(CacheRecord::new(root(), Vec::new()))
            .await
            .unwrap();

        let names: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("cache.json")]);
    }

    #[tokio::test]
    async fn test_clear_and_info() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::new(temp_dir.path().join("cache.json"));

        let info = store.info().await.unwrap();
        assert!(info.size_bytes.is_none());
        assert!(info.roots.is_empty());

        store
            .store(CacheRecord::new(root(), vec![file_entry("a.cf_cvg.tif.gz")]))
            .await
            .unwrap();
        let info = store.info().await.unwrap();
        assert!(info.size_bytes.unwrap() > 0);
        assert_eq!(info.roots.len(), 1);
        assert_eq!(info.roots[0].files, 1);

        store.clear().await.unwrap();
        assert!(!store.path().exists());
        // Clearing twice is fine
        store.clear().await.unwrap();
    }
}
