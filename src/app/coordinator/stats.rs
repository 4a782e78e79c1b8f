//! Final report of a synchronization run

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::models::FailedEntry;

/// Outcome of [`Coordinator::sync_all`](super::Coordinator::sync_all)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    /// Every file is present locally
    pub all_succeeded: bool,
    /// Entries still failing after the last round
    pub permanently_failed: Vec<FailedEntry>,
    /// Download rounds that actually ran
    pub rounds_executed: u32,
    /// Distinct files the run was asked to synchronize
    pub files_total: usize,
    /// Files present locally at the end
    pub files_succeeded: usize,
    /// Bytes written across all rounds
    pub bytes_transferred: u64,
    /// Wall time of the run
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// The run was stopped by a shutdown request
    pub cancelled: bool,
}

impl SyncReport {
    /// Report for a run with nothing to do
    pub fn empty() -> Self {
        Self {
            all_succeeded: true,
            permanently_failed: Vec::new(),
            rounds_executed: 0,
            files_total: 0,
            files_succeeded: 0,
            bytes_transferred: 0,
            duration: Duration::ZERO,
            cancelled: false,
        }
    }

    /// Process exit code: 0 on full success, 2 on partial failure
    pub fn exit_code(&self) -> i32 {
        if self.all_succeeded {
            0
        } else {
            2
        }
    }

    /// Average transfer rate over the run
    pub fn download_rate_bps(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.bytes_transferred as f64 / secs
        } else {
            0.0
        }
    }

    /// Whether any failure points at a file that changed since the scan
    pub fn suggests_rescan(&self) -> bool {
        self.permanently_failed.iter().any(|failed| {
            matches!(
                failed.error_kind,
                crate::errors::ErrorKind::Integrity | crate::errors::ErrorKind::HttpStatus(404)
            )
        })
    }
}

/// Format a transfer rate for display
pub fn format_download_rate(bytes_per_second: f64) -> String {
    if bytes_per_second < 1024.0 {
        format!("{:.0} B/s", bytes_per_second)
    } else if bytes_per_second < 1024.0 * 1024.0 {
        format!("{:.1} KB/s", bytes_per_second / 1024.0)
    } else if bytes_per_second < 1024.0 * 1024.0 * 1024.0 {
        format!("{:.1} MB/s", bytes_per_second / (1024.0 * 1024.0))
    } else {
        format!("{:.1} GB/s", bytes_per_second / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a byte count for display
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
