//! Cache document summaries for the `cache info` command

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use url::Url;

use super::store::CacheRecord;

/// Summary of one cached scan root
#[derive(Debug, Clone)]
pub struct RootSummary {
    pub root: Url,
    pub discovered_at: DateTime<Utc>,
    /// All entries, directories included
    pub entries: usize,
    /// File entries only
    pub files: usize,
    /// Sum of the known file sizes
    pub known_bytes: u64,
}

impl RootSummary {
    pub fn from_record(record: &CacheRecord) -> Self {
        Self {
            root: record.root.clone(),
            discovered_at: record.discovered_at,
            entries: record.entries.len(),
            files: record.file_count(),
            known_bytes: record
                .entries
                .iter()
                .filter_map(|entry| entry.size)
                .sum(),
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheInfo {
    /// Location of the cache document
    pub path: PathBuf,
    /// Document size, `None` when it does not exist
    pub size_bytes: Option<u64>,
    pub roots: Vec<RootSummary>,
}

impl CacheInfo {
    pub fn exists(&self) -> bool {
        self.size_bytes.is_some()
    }

    /// Total cached file entries across all roots
    pub fn total_files(&self) -> usize {
        self.roots.iter().map(|root| root.files).sum()
    }
}
