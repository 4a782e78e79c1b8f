//! Round-based retry controller
//!
//! The coordinator turns a list of remote entries into local files. It runs
//! the worker pool over every pending task, then keeps re-running it over
//! exactly the entries that failed, until a round comes back clean or the
//! round limit is hit:
//!
//! ```text
//! Scanning -> RoundRunning -> RoundEvaluating -> RoundRunning | Done
//! ```
//!
//! Each round starts every task with a fresh attempt budget. Only an
//! authentication failure ends the run with an error; everything else ends in
//! a [`SyncReport`].
//!
//! - [`config`] - round limit, round delay and output root
//! - [`signals`] - Ctrl+C / SIGTERM handling
//! - [`stats`] - the final report

pub mod config;
pub mod signals;
pub mod stats;

use std::collections::HashSet;
use std::time::Instant;

use tracing::{error, info, warn};
use url::Url;

use crate::app::crawler::Crawler;
use crate::app::models::{DownloadTask, FailedEntry, RemoteEntry, RoundResult};
use crate::app::worker::WorkerPool;
use crate::errors::{AppError, Result};

pub use config::CoordinatorConfig;
pub use signals::{wait_for_shutdown_signal, SignalHandler};
pub use stats::{format_bytes, format_download_rate, SyncReport};

/// States of a synchronization run
#[derive(Debug)]
enum SyncState {
    Scanning { root: Url, rescan: bool },
    RoundRunning { round: u32, pending: Vec<DownloadTask> },
    RoundEvaluating { result: RoundResult },
    Done { failed: Vec<FailedEntry>, cancelled: bool },
}

/// Running totals across rounds
#[derive(Debug, Default)]
struct Tally {
    files_total: usize,
    files_succeeded: usize,
    bytes_transferred: u64,
    rounds_executed: u32,
}

/// Drives download rounds until every file is present or the limit is hit
pub struct Coordinator {
    config: CoordinatorConfig,
    pool: WorkerPool,
    crawler: Option<Crawler>,
}

impl Coordinator {
    /// Create a coordinator for already discovered entries
    pub fn new(config: CoordinatorConfig, pool: WorkerPool) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            pool,
            crawler: None,
        })
    }

    /// Attach the crawler used by [`run`](Self::run)
    pub fn with_crawler(mut self, crawler: Crawler) -> Self {
        self.crawler = Some(crawler);
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Scans `root` (from cache unless `rescan`) and synchronizes it
    ///
    /// # Errors
    ///
    /// Fails if the crawl is incomplete or authentication fails; download
    /// failures end up in the report instead.
    pub async fn run(&self, root: &Url, rescan: bool) -> Result<SyncReport> {
        self.drive(SyncState::Scanning {
            root: root.clone(),
            rescan,
        })
        .await
    }

    /// Synchronizes `entries` into the output root
    ///
    /// Directory entries are ignored and entries mapping to the same local
    /// path are downloaded once.
    pub async fn sync_all(&self, entries: Vec<RemoteEntry>) -> Result<SyncReport> {
        let pending = self.tasks_for(entries);
        self.drive(SyncState::RoundRunning { round: 1, pending })
            .await
    }

    fn tasks_for(&self, entries: Vec<RemoteEntry>) -> Vec<DownloadTask> {
        let mut seen = HashSet::new();
        entries
            .into_iter()
            .filter(RemoteEntry::is_file)
            .map(|entry| DownloadTask::for_output_root(entry, &self.config.output_root))
            .filter(|task| seen.insert(task.destination.clone()))
            .collect()
    }

    async fn drive(&self, mut state: SyncState) -> Result<SyncReport> {
        let started = Instant::now();
        let mut tally = Tally::default();

        loop {
            state = match state {
                SyncState::Scanning { root, rescan } => {
                    let Some(crawler) = &self.crawler else {
                        return Err(AppError::generic("No crawler configured for scanning"));
                    };
                    let entries = if rescan {
                        crawler.rescan(&root).await?
                    } else {
                        crawler.scan(&root).await?
                    };
                    SyncState::RoundRunning {
                        round: 1,
                        pending: self.tasks_for(entries),
                    }
                }

                SyncState::RoundRunning { round, pending } => {
                    if round == 1 {
                        tally.files_total = pending.len();
                    }
                    if pending.is_empty() {
                        info!("Nothing to download");
                        SyncState::Done {
                            failed: Vec::new(),
                            cancelled: false,
                        }
                    } else {
                        let result = self
                            .pool
                            .run(round, pending, self.config.worker_count)
                            .await
                            .map_err(|e| {
                                error!("Synchronization aborted in round {}: {}", round, e);
                                AppError::from(e)
                            })?;
                        tally.rounds_executed = round;
                        tally.files_succeeded += result.succeeded.len();
                        tally.bytes_transferred += result.bytes_transferred;
                        SyncState::RoundEvaluating { result }
                    }
                }

                SyncState::RoundEvaluating { result } => self.evaluate(result).await,

                SyncState::Done { failed, cancelled } => {
                    let report = SyncReport {
                        all_succeeded: failed.is_empty(),
                        permanently_failed: failed,
                        rounds_executed: tally.rounds_executed,
                        files_total: tally.files_total,
                        files_succeeded: tally.files_succeeded,
                        bytes_transferred: tally.bytes_transferred,
                        duration: started.elapsed(),
                        cancelled,
                    };
                    log_report(&report);
                    return Ok(report);
                }
            };
        }
    }

    async fn evaluate(&self, result: RoundResult) -> SyncState {
        let failed: Vec<FailedEntry> = result.failed.iter().map(FailedEntry::from).collect();

        if result.is_clean() {
            return SyncState::Done {
                failed,
                cancelled: false,
            };
        }

        if result.cancelled || self.pool.shutdown_requested() {
            warn!(
                "Stopping after round {} with {} files outstanding",
                result.round,
                failed.len()
            );
            return SyncState::Done {
                failed,
                cancelled: true,
            };
        }

        if result.round >= self.config.max_rounds {
            warn!(
                "Giving up after {} rounds with {} files still failing",
                result.round,
                failed.len()
            );
            return SyncState::Done {
                failed,
                cancelled: false,
            };
        }

        info!(
            "Round {} left {} failures, retrying in {:?}",
            result.round,
            failed.len(),
            self.config.round_delay
        );
        if !self.config.round_delay.is_zero() {
            tokio::time::sleep(self.config.round_delay).await;
        }

        let pending = result
            .failed
            .into_iter()
            .map(|task| DownloadTask::new(task.entry, task.destination))
            .collect();
        SyncState::RoundRunning {
            round: result.round + 1,
            pending,
        }
    }
}

fn log_report(report: &SyncReport) {
    if report.all_succeeded {
        info!(
            "Synchronized {} files in {} round(s), {} transferred",
            report.files_total,
            report.rounds_executed,
            format_bytes(report.bytes_transferred)
        );
        return;
    }

    warn!(
        "{} of {} files could not be synchronized after {} round(s)",
        report.permanently_failed.len(),
        report.files_total,
        report.rounds_executed
    );
    for failed in &report.permanently_failed {
        warn!(
            "  {} [{}] {}",
            failed.entry.relative_path, failed.error_kind, failed.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    use crate::app::client::{ClientConfig, Credentials, SessionConfig, SessionManager};
    use crate::app::worker::WorkerConfig;

    fn offline_pool() -> WorkerPool {
        let session = SessionManager::new(
            SessionConfig::eog().unwrap(),
            Credentials::new("user@example.org", "secret"),
            ClientConfig::default(),
        )
        .unwrap();
        WorkerPool::new(WorkerConfig::default(), Arc::new(session)).unwrap()
    }

    fn entry(path: &str, size: Option<u64>) -> RemoteEntry {
        let url = Url::parse("https://example.org/root/")
            .unwrap()
            .join(path)
            .unwrap();
        RemoteEntry::file(url, path, size)
    }

    #[tokio::test]
    async fn test_empty_input_runs_no_rounds() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator =
            Coordinator::new(CoordinatorConfig::new(temp_dir.path()), offline_pool()).unwrap();

        let report = coordinator.sync_all(Vec::new()).await.unwrap();
        assert!(report.all_succeeded);
        assert_eq!(report.rounds_executed, 0);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn test_present_files_complete_without_network() {
        let temp_dir = TempDir::new().unwrap();
        let config = CoordinatorConfig::new(temp_dir.path()).with_round_delay(Duration::ZERO);
        let coordinator = Coordinator::new(config, offline_pool()).unwrap();

        let entries = vec![
            entry("2012/a.avg_rade9h.tif.gz", Some(4)),
            entry("2012/b.cf_cvg.tif.gz", Some(3)),
            entry("2012/a.avg_rade9h.tif.gz", Some(4)),
            RemoteEntry::directory(
                Url::parse("https://example.org/root/2012/").unwrap(),
                "2012",
            ),
        ];
        for e in &entries[..2] {
            let path = e.local_path(temp_dir.path());
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, vec![0u8; e.size.unwrap() as usize]).unwrap();
        }

        let report = coordinator.sync_all(entries).await.unwrap();
        assert!(report.all_succeeded);
        assert_eq!(report.files_total, 2);
        assert_eq!(report.files_succeeded, 2);
        assert_eq!(report.rounds_executed, 1);
        assert_eq!(report.bytes_transferred, 0);
    }

    #[tokio::test]
    async fn test_run_without_crawler_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let coordinator =
            Coordinator::new(CoordinatorConfig::new(temp_dir.path()), offline_pool()).unwrap();
        let root = Url::parse("https://example.org/root/").unwrap();
        assert!(coordinator.run(&root, false).await.is_err());
    }
}
