//! Worker pool management and coordination
//!
//! A [`WorkerPool`] runs one round: it spawns a fixed number of workers that
//! pull tasks from a shared pending queue until it is empty, then partitions
//! the finished tasks into a [`RoundResult`]. A shutdown request stops
//! dispatch; tasks already in flight are finished and the rest come back as
//! cancelled failures.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::WorkerConfig;
use super::core::DownloadWorker;
use super::types::{WorkerProgress, WorkerStatus};
use crate::app::client::SessionManager;
use crate::app::models::{DownloadTask, RoundResult, TaskStatus};
use crate::errors::{DownloadError, DownloadResult, ErrorKind};

type SharedQueue = Arc<Mutex<VecDeque<DownloadTask>>>;

/// Snapshot of every task a worker took from the queue
type Dispatched = Arc<Mutex<Vec<DownloadTask>>>;

/// What one worker hands back when it leaves the round
struct WorkerOutcome {
    finished: Vec<DownloadTask>,
    fatal: Option<DownloadError>,
}

/// Pool for running download rounds
#[derive(Debug, Clone)]
pub struct WorkerPool {
    config: WorkerConfig,
    session: Arc<SessionManager>,
    progress_tx: Option<mpsc::Sender<WorkerProgress>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl WorkerPool {
    /// Create a new worker pool
    pub fn new(config: WorkerConfig, session: Arc<SessionManager>) -> DownloadResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            session,
            progress_tx: None,
            shutdown_rx: None,
        })
    }

    /// Report worker progress on `progress_tx`
    pub fn with_progress(mut self, progress_tx: mpsc::Sender<WorkerProgress>) -> Self {
        self.progress_tx = Some(progress_tx);
        self
    }

    /// Stop dispatching new tasks once `shutdown_rx` turns true
    pub fn with_shutdown(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Get pool configuration
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Whether a shutdown has been requested
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(false)
    }

    /// Runs one round with the configured worker count
    pub async fn run_round(
        &self,
        round: u32,
        tasks: Vec<DownloadTask>,
    ) -> DownloadResult<RoundResult> {
        self.run(round, tasks, self.config.worker_count).await
    }

    /// Downloads `tasks` with `concurrency` workers
    ///
    /// # Errors
    ///
    /// Returns `DownloadError::Auth` if re-authentication failed; every other
    /// failure is recorded on its task.
    pub async fn run(
        &self,
        round: u32,
        tasks: Vec<DownloadTask>,
        concurrency: usize,
    ) -> DownloadResult<RoundResult> {
        let total = tasks.len();
        let worker_count = concurrency.max(1).min(total.max(1));
        info!(
            "Round {}: downloading {} files with {} workers",
            round, total, worker_count
        );

        let queue: SharedQueue = Arc::new(Mutex::new(tasks.into_iter().collect()));
        let dispatched: Dispatched = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let (abort_tx, abort_rx) = watch::channel(false);
        let abort_tx = Arc::new(abort_tx);

        let handles: Vec<JoinHandle<WorkerOutcome>> = (0..worker_count)
            .map(|worker_id| {
                let worker = DownloadWorker::new(
                    worker_id as u32,
                    self.config.clone(),
                    Arc::clone(&self.session),
                    self.progress_tx.clone(),
                );
                let queue = Arc::clone(&queue);
                let dispatched = Arc::clone(&dispatched);
                let shutdown_rx = self.shutdown_rx.clone();
                let abort_rx = abort_rx.clone();
                let abort_tx = Arc::clone(&abort_tx);
                tokio::spawn(run_worker(
                    worker,
                    queue,
                    dispatched,
                    shutdown_rx,
                    abort_rx,
                    abort_tx,
                ))
            })
            .collect();

        let mut finished = Vec::with_capacity(total);
        let mut fatal = None;
        let mut worker_lost = false;
        for handle in handles {
            match handle.await {
                Ok(outcome) => {
                    finished.extend(outcome.finished);
                    if fatal.is_none() {
                        fatal = outcome.fatal;
                    }
                }
                Err(e) => {
                    error!("Download worker panicked: {}", e);
                    worker_lost = true;
                }
            }
        }

        if worker_lost {
            let dispatched = std::mem::take(&mut *dispatched.lock().await);
            let lost = unreported_tasks(dispatched, &finished);
            finished.extend(lost);
        }

        if let Some(e) = fatal {
            error!("Round {} aborted: {}", round, e);
            return Err(e);
        }

        let leftovers: Vec<DownloadTask> = queue.lock().await.drain(..).collect();
        let cancelled = !leftovers.is_empty();
        for mut task in leftovers {
            task.mark_failed(ErrorKind::Cancelled, DownloadError::Cancelled.to_string());
            finished.push(task);
        }

        let bytes_transferred = finished.iter().map(|task| task.bytes_transferred).sum();
        let (succeeded, failed): (Vec<_>, Vec<_>) = finished
            .into_iter()
            .partition(|task| task.status == TaskStatus::Complete);

        info!(
            "Round {} finished: {} succeeded, {} failed{}",
            round,
            succeeded.len(),
            failed.len(),
            if cancelled { " (cancelled)" } else { "" }
        );

        Ok(RoundResult {
            round,
            succeeded,
            failed,
            bytes_transferred,
            cancelled,
            finished_at: Utc::now(),
        })
    }
}

/// Dispatched tasks missing from `finished`, marked as aborted
fn unreported_tasks(dispatched: Vec<DownloadTask>, finished: &[DownloadTask]) -> Vec<DownloadTask> {
    let reported: HashSet<&PathBuf> = finished.iter().map(|task| &task.destination).collect();
    dispatched
        .into_iter()
        .filter(|task| !reported.contains(&task.destination))
        .map(|mut task| {
            warn!(
                "{} was lost with its worker, recording it as failed",
                task.entry.relative_path
            );
            task.mark_failed(ErrorKind::Aborted, "download worker ended unexpectedly");
            task
        })
        .collect()
}

/// Worker loop: take tasks until the queue is empty or dispatch stops
async fn run_worker(
    mut worker: DownloadWorker,
    queue: SharedQueue,
    dispatched: Dispatched,
    shutdown_rx: Option<watch::Receiver<bool>>,
    abort_rx: watch::Receiver<bool>,
    abort_tx: Arc<watch::Sender<bool>>,
) -> WorkerOutcome {
    let mut finished = Vec::new();

    loop {
        if *abort_rx.borrow() {
            break;
        }
        if shutdown_rx.as_ref().is_some_and(|rx| *rx.borrow()) {
            debug!("Worker {} stopping: shutdown requested", worker.id());
            break;
        }

        let Some(task) = queue.lock().await.pop_front() else {
            break;
        };
        dispatched.lock().await.push(task.clone());

        match worker.process(task).await {
            Ok(task) => finished.push(task),
            Err(e) => {
                warn!("Worker {} hit a fatal error: {}", worker.id(), e);
                let _ = abort_tx.send(true);
                return WorkerOutcome {
                    finished,
                    fatal: Some(e),
                };
            }
        }
    }

    debug!(
        "Worker {} leaving round after {} tasks ({:?})",
        worker.id(),
        finished.len(),
        WorkerStatus::Shutdown
    );
    WorkerOutcome {
        finished,
        fatal: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::client::{ClientConfig, Credentials, SessionConfig};
    use crate::app::models::RemoteEntry;
    use tempfile::TempDir;
    use url::Url;

    fn offline_pool() -> WorkerPool {
        let session = SessionManager::new(
            SessionConfig::eog().unwrap(),
            Credentials::new("user@example.org", "pw"),
            ClientConfig::default(),
        )
        .unwrap();
        WorkerPool::new(WorkerConfig::default(), Arc::new(session)).unwrap()
    }

    fn tasks(output_root: &std::path::Path, count: usize) -> Vec<DownloadTask> {
        (0..count)
            .map(|n| {
                let name = format!("{}.avg_rade9h.tif.gz", n);
                let url = Url::parse("https://eogdata.mines.edu/nighttime_light/monthly_notile/")
                    .unwrap()
                    .join(&name)
                    .unwrap();
                DownloadTask::for_output_root(RemoteEntry::file(url, name, Some(1)), output_root)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_round_is_clean() {
        let result = offline_pool().run(1, Vec::new(), 4).await.unwrap();
        assert_eq!(result.total(), 0);
        assert!(result.is_clean());
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_undispatched_tasks() {
        let temp_dir = TempDir::new().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(true);
        let pool = offline_pool().with_shutdown(shutdown_rx);
        assert!(pool.shutdown_requested());

        let result = pool.run(2, tasks(temp_dir.path(), 3), 2).await.unwrap();

        assert!(result.cancelled);
        assert_eq!(result.round, 2);
        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 3);
        assert!(result
            .failed
            .iter()
            .all(|task| task.last_error == Some(ErrorKind::Cancelled)));
        drop(shutdown_tx);
    }

    #[test]
    fn test_unreported_tasks_recorded_as_failed() {
        let temp_dir = TempDir::new().unwrap();
        let dispatched = tasks(temp_dir.path(), 3);
        let mut reported = dispatched[1].clone();
        reported.mark_complete();

        let lost = unreported_tasks(dispatched, &[reported]);

        assert_eq!(lost.len(), 2);
        assert!(lost.iter().all(|task| task.status == TaskStatus::Failed));
        assert!(lost
            .iter()
            .all(|task| task.last_error == Some(ErrorKind::Aborted)));
        assert_eq!(lost[0].entry.relative_path, "0.avg_rade9h.tif.gz");
        assert_eq!(lost[1].entry.relative_path, "2.avg_rade9h.tif.gz");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let session = SessionManager::new(
            SessionConfig::eog().unwrap(),
            Credentials::new("user@example.org", "pw"),
            ClientConfig::default(),
        )
        .unwrap();
        let config = WorkerConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(WorkerPool::new(config, Arc::new(session)).is_err());
    }
}
