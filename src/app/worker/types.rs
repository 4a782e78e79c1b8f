//! Worker progress reporting types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current status of a download worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum WorkerStatus {
    /// Worker started a task
    Started,
    /// Worker wrote body bytes to disk
    Downloading,
    /// Attempt failed; the worker is backing off before the next one
    Retrying { attempt: u32 },
    /// Task finished successfully
    Completed,
    /// Task ran out of attempts or hit a non-retryable error
    Failed,
    /// Worker left the round
    Shutdown,
}

impl WorkerStatus {
    /// Whether this status ends a task
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerStatus::Completed | WorkerStatus::Failed)
    }
}

/// Progress information from a download worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerProgress {
    /// ID of the worker reporting progress
    pub worker_id: u32,
    /// Root-relative path of the task being processed
    pub relative_path: Option<String>,
    /// Current worker status
    pub status: WorkerStatus,
    /// Bytes written since the previous report
    pub bytes_delta: u64,
    /// Size of the local file after this report
    pub bytes_on_disk: u64,
    /// Full size of the remote file, if known
    pub total_bytes: Option<u64>,
    /// Last error message, if any
    pub error_message: Option<String>,
    /// Timestamp of this progress report
    pub timestamp: DateTime<Utc>,
}

impl WorkerProgress {
    /// Create a new progress report with minimal required information
    pub fn new(worker_id: u32, status: WorkerStatus) -> Self {
        Self {
            worker_id,
            relative_path: None,
            status,
            bytes_delta: 0,
            bytes_on_disk: 0,
            total_bytes: None,
            error_message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }

    /// Calculate download progress percentage if total bytes is known
    pub fn progress_percentage(&self) -> Option<f64> {
        self.total_bytes.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.bytes_on_disk as f64 / total as f64) * 100.0
            }
        })
    }
}
