//! Data models for remote entries, download tasks and round results
//!
//! A [`RemoteEntry`] is what the crawler discovers and what the cache store
//! persists. Each round turns entries into [`DownloadTask`]s, and the download
//! engine hands back a [`RoundResult`] partitioning them into succeeded and
//! failed tasks.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::ErrorKind;

/// Kind of a discovered remote entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// A file or directory discovered under the scan root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Absolute URL of the entry
    pub url: Url,
    /// Directory or file
    pub kind: EntryKind,
    /// Decoded path of the parent directory relative to the scan root ("" at the root)
    pub parent: String,
    /// Decoded path relative to the scan root, '/' separated
    pub relative_path: String,
    /// Size in bytes when the listing or the server reported one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

impl RemoteEntry {
    /// Create a file entry from its URL and root-relative path
    pub fn file(url: Url, relative_path: impl Into<String>, size: Option<u64>) -> Self {
        let relative_path = relative_path.into();
        let parent = parent_of(&relative_path);
        Self {
            url,
            kind: EntryKind::File,
            parent,
            relative_path,
            size,
        }
    }

    /// Create a directory entry from its URL and root-relative path
    pub fn directory(url: Url, relative_path: impl Into<String>) -> Self {
        let relative_path = relative_path.into();
        let parent = parent_of(&relative_path);
        Self {
            url,
            kind: EntryKind::Directory,
            parent,
            relative_path,
            size: None,
        }
    }

    /// Final path segment (file or directory name)
    pub fn name(&self) -> &str {
        self.relative_path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or("")
    }

    /// Whether this entry is a downloadable file
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Local destination under `output_root`, mirroring the remote layout
    ///
    /// Segments that would escape the output root (`..`, absolute prefixes)
    /// are dropped.
    pub fn local_path(&self, output_root: &Path) -> PathBuf {
        let mut path = output_root.to_path_buf();
        for component in Path::new(&self.relative_path).components() {
            if let Component::Normal(segment) = component {
                path.push(segment);
            }
        }
        path
    }
}

fn parent_of(relative_path: &str) -> String {
    match relative_path.trim_end_matches('/').rsplit_once('/') {
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

/// Lifecycle of a download task within one round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Unit of work for downloading one entry in one round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadTask {
    /// The entry being downloaded
    pub entry: RemoteEntry,
    /// Where the file is written
    pub destination: PathBuf,
    /// Content attempts consumed in this round
    pub attempts: u32,
    /// Classification of the most recent failure
    pub last_error: Option<ErrorKind>,
    /// Human-readable message of the most recent failure
    pub last_error_message: Option<String>,
    /// Current status
    pub status: TaskStatus,
    /// Bytes written to disk by this task in this round
    pub bytes_transferred: u64,
}

impl DownloadTask {
    /// Create a pending task for an entry
    pub fn new(entry: RemoteEntry, destination: PathBuf) -> Self {
        Self {
            entry,
            destination,
            attempts: 0,
            last_error: None,
            last_error_message: None,
            status: TaskStatus::Pending,
            bytes_transferred: 0,
        }
    }

    /// Create a pending task whose destination mirrors the remote layout
    pub fn for_output_root(entry: RemoteEntry, output_root: &Path) -> Self {
        let destination = entry.local_path(output_root);
        Self::new(entry, destination)
    }

    /// Mark the task as being worked on
    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Mark the task as complete
    pub fn mark_complete(&mut self) {
        self.status = TaskStatus::Complete;
    }

    /// Record a failure without changing the status
    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.last_error = Some(kind);
        self.last_error_message = Some(message.into());
    }

    /// Mark the task as failed with its final error
    pub fn mark_failed(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.record_error(kind, message);
        self.status = TaskStatus::Failed;
    }

    /// Whether the task reached a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TaskStatus::Complete | TaskStatus::Failed)
    }
}

/// Outcome of one download round
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundResult {
    /// 1-based round index
    pub round: u32,
    /// Tasks that completed (including those already present on disk)
    pub succeeded: Vec<DownloadTask>,
    /// Tasks that ended in failure
    pub failed: Vec<DownloadTask>,
    /// Bytes written to disk during the round
    pub bytes_transferred: u64,
    /// Whether dispatch was stopped by a shutdown request
    pub cancelled: bool,
    /// When the round finished
    pub finished_at: DateTime<Utc>,
}

impl RoundResult {
    /// Entries that need another round
    pub fn failed_entries(&self) -> Vec<RemoteEntry> {
        self.failed.iter().map(|task| task.entry.clone()).collect()
    }

    /// Whether every task in the round succeeded
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total number of tasks in the round
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

/// An entry that was still failing when the sync gave up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedEntry {
    /// The remote entry
    pub entry: RemoteEntry,
    /// Last recorded error kind
    pub error_kind: ErrorKind,
    /// Last recorded error message
    pub message: String,
}

impl From<&DownloadTask> for FailedEntry {
    fn from(task: &DownloadTask) -> Self {
        Self {
            entry: task.entry.clone(),
            error_kind: task.last_error.unwrap_or(ErrorKind::TransientNetwork),
            message: task
                .last_error_message
                .clone()
                .unwrap_or_else(|| "unknown error".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> RemoteEntry {
        let url = Url::parse("https://example.org/monthly_notile/")
            .unwrap()
            .join(path)
            .unwrap();
        RemoteEntry::file(url, path, Some(42))
    }

    #[test]
    fn test_entry_name_and_parent() {
        let e = entry("2012/201204/vcmcfg/SVDNB_npp_20120401.avg_rade9h.tif.gz");
        assert_eq!(e.name(), "SVDNB_npp_20120401.avg_rade9h.tif.gz");
        assert_eq!(e.parent, "2012/201204/vcmcfg");
        assert!(e.is_file());

        let top = entry("readme.txt");
        assert_eq!(top.parent, "");
    }

    #[test]
    fn test_local_path_mirrors_layout() {
        let e = entry("2012/201204/vcmcfg/a.cf_cvg.tif.gz");
        let path = e.local_path(Path::new("/data/eog"));
        assert_eq!(
            path,
            PathBuf::from("/data/eog/2012/201204/vcmcfg/a.cf_cvg.tif.gz")
        );
    }

    #[test]
    fn test_local_path_drops_traversal() {
        let mut e = entry("x.tif.gz");
        e.relative_path = "../../etc/passwd".to_string();
        let path = e.local_path(Path::new("/data/eog"));
        assert_eq!(path, PathBuf::from("/data/eog/etc/passwd"));
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = DownloadTask::for_output_root(entry("2013/a.tif.gz"), Path::new("out"));
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.is_terminal());

        task.mark_in_progress();
        task.record_error(ErrorKind::TransientNetwork, "reset");
        assert_eq!(task.status, TaskStatus::InProgress);

        task.mark_failed(ErrorKind::Integrity, "short file");
        assert!(task.is_terminal());
        let failed = FailedEntry::from(&task);
        assert_eq!(failed.error_kind, ErrorKind::Integrity);
        assert_eq!(failed.message, "short file");
    }

    #[test]
    fn test_entry_serde_skips_unknown_size() {
        let url = Url::parse("https://example.org/a/").unwrap();
        let dir = RemoteEntry::directory(url, "2012/");
        let json = serde_json::to_string(&dir).unwrap();
        assert!(!json.contains("size"));
        let back: RemoteEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(back, dir);
    }
}
