//! Core download worker implementation
//!
//! A [`DownloadWorker`] drives one [`DownloadTask`] at a time to a terminal
//! status. Partial files are kept on disk between attempts and resumed with a
//! `Range` request; servers that ignore the range get the file truncated and
//! rewritten from the start.

use std::path::Path;
use std::sync::Arc;

use reqwest::StatusCode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use super::config::WorkerConfig;
use super::types::{WorkerProgress, WorkerStatus};
use crate::app::client::{reported_size, SessionManager};
use crate::app::models::DownloadTask;
use crate::errors::{DownloadError, DownloadResult};

/// Individual download worker
#[derive(Debug)]
pub struct DownloadWorker {
    /// Unique worker identifier
    id: u32,
    config: WorkerConfig,
    session: Arc<SessionManager>,
    progress_tx: Option<mpsc::Sender<WorkerProgress>>,
    rng: fastrand::Rng,
}

impl DownloadWorker {
    /// Create a new download worker
    pub fn new(
        id: u32,
        config: WorkerConfig,
        session: Arc<SessionManager>,
        progress_tx: Option<mpsc::Sender<WorkerProgress>>,
    ) -> Self {
        Self {
            id,
            config,
            session,
            progress_tx,
            rng: fastrand::Rng::new(),
        }
    }

    /// Replace the jitter source, e.g. with a seeded one
    pub fn with_rng(mut self, rng: fastrand::Rng) -> Self {
        self.rng = rng;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Runs `task` until it completes or fails
    ///
    /// Per-task failures are recorded on the returned task. Only an
    /// authentication failure, which no other task could survive either, is
    /// returned as an error.
    pub async fn process(&mut self, mut task: DownloadTask) -> DownloadResult<DownloadTask> {
        task.mark_in_progress();
        task.attempts = 0;
        self.report(&task, WorkerStatus::Started, None);

        loop {
            let error = match self.attempt(&mut task).await {
                Ok(()) => {
                    task.mark_complete();
                    debug!(
                        "Worker {} completed {}",
                        self.id, task.entry.relative_path
                    );
                    self.report(&task, WorkerStatus::Completed, None);
                    return Ok(task);
                }
                Err(DownloadError::Auth(e)) => return Err(DownloadError::Auth(e)),
                Err(e) => e,
            };

            task.attempts += 1;
            let kind = error.kind();
            let message = error.to_string();

            let retry_in_round = error.is_retryable()
                || matches!(error, DownloadError::RangeNotSatisfiable { .. });
            if !retry_in_round || task.attempts >= self.config.max_attempts {
                warn!(
                    "Worker {} failed {} after {} attempt(s): {}",
                    self.id, task.entry.relative_path, task.attempts, message
                );
                task.mark_failed(kind, message.clone());
                self.report(&task, WorkerStatus::Failed, Some(message));
                return Ok(task);
            }

            task.record_error(kind, message.clone());
            self.report(
                &task,
                WorkerStatus::Retrying {
                    attempt: task.attempts,
                },
                Some(message.clone()),
            );

            if error.is_retryable() {
                let delay = self.config.backoff.delay(task.attempts, &mut self.rng);
                warn!(
                    "Worker {}: {} (attempt {}/{}). Retrying in {:?}",
                    self.id, message, task.attempts, self.config.max_attempts, delay
                );
                tokio::time::sleep(delay).await;
            }
        }
    }

    /// One request-and-stream cycle; `Ok` means the file is complete on disk
    async fn attempt(&mut self, task: &mut DownloadTask) -> DownloadResult<()> {
        let destination = task.destination.clone();
        let known_size = task.entry.size;
        let mut existing = local_size(&destination).await?;

        if let Some(expected) = known_size {
            if existing == expected {
                debug!("{} already complete, skipping", task.entry.relative_path);
                return Ok(());
            }
            if existing > expected {
                warn!(
                    "{} is larger than the remote file ({} > {} bytes), discarding",
                    destination.display(),
                    existing,
                    expected
                );
                fs::remove_file(&destination).await?;
                existing = 0;
            }
        }

        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).await?;
        }

        let url = task.entry.url.clone();
        let mut response = match self.session.get(&url, Some(existing)).await {
            Ok(response) => response,
            Err(DownloadError::RangeNotSatisfiable { total, .. }) => {
                return self
                    .handle_unsatisfiable_range(&url, &destination, existing, known_size, total)
                    .await;
            }
            Err(e) => return Err(e),
        };

        let resuming = existing > 0 && response.status() == StatusCode::PARTIAL_CONTENT;
        if existing > 0 && !resuming {
            warn!(
                "Server ignored range request for {}, restarting from zero",
                task.entry.relative_path
            );
        }
        let offset = if resuming { existing } else { 0 };
        let expected = known_size.or_else(|| reported_size(&response, offset));

        let mut file = if resuming {
            info!(
                "Resuming {} from byte {}",
                task.entry.relative_path, existing
            );
            OpenOptions::new().append(true).open(&destination).await?
        } else {
            fs::File::create(&destination).await?
        };

        let read_timeout = self.session.read_timeout();
        let mut on_disk = offset;
        loop {
            let chunk = match tokio::time::timeout(read_timeout, response.chunk()).await {
                Err(_) => {
                    file.flush().await?;
                    return Err(DownloadError::Transient {
                        url: url.to_string(),
                        reason: format!("no data received for {:?}", read_timeout),
                    });
                }
                Ok(Err(e)) => {
                    file.flush().await?;
                    return Err(DownloadError::transient(url.as_str(), e));
                }
                Ok(Ok(None)) => break,
                Ok(Ok(Some(chunk))) => chunk,
            };

            file.write_all(&chunk).await?;
            let written = chunk.len() as u64;
            on_disk += written;
            task.bytes_transferred += written;
            self.report_bytes(task, written, on_disk, expected);
        }

        file.flush().await?;
        drop(file);

        verify_size(&destination, expected).await
    }

    /// Decides what a 416 answer means for the local file
    ///
    /// Without a total in `Content-Range` the remote size is taken from the
    /// `Content-Length` of a plain GET before any local bytes are discarded.
    async fn handle_unsatisfiable_range(
        &self,
        url: &Url,
        destination: &Path,
        existing: u64,
        known_size: Option<u64>,
        total: Option<u64>,
    ) -> DownloadResult<()> {
        let remote_size = match total {
            Some(total) => Some(total),
            None if existing > 0 => {
                let response = self.session.get(url, None).await?;
                reported_size(&response, 0)
            }
            None => None,
        };

        if let (Some(expected), Some(remote)) = (known_size, remote_size) {
            if expected != remote {
                return Err(DownloadError::SizeMismatch {
                    path: destination.to_path_buf(),
                    expected,
                    actual: remote,
                });
            }
        }

        if existing > 0 && remote_size == Some(existing) {
            debug!(
                "{} already holds all {} bytes",
                destination.display(),
                existing
            );
            return Ok(());
        }

        warn!(
            "Range not satisfiable for {} (local {} bytes, remote {:?}), restarting",
            url, existing, remote_size
        );
        if existing > 0 {
            fs::remove_file(destination).await?;
        }
        Err(DownloadError::RangeNotSatisfiable {
            url: url.to_string(),
            total: remote_size,
        })
    }

    fn report_bytes(&self, task: &DownloadTask, delta: u64, on_disk: u64, total: Option<u64>) {
        let mut progress = WorkerProgress::new(self.id, WorkerStatus::Downloading)
            .for_path(task.entry.relative_path.clone());
        progress.bytes_delta = delta;
        progress.bytes_on_disk = on_disk;
        progress.total_bytes = total;
        self.send(progress);
    }

    fn report(&self, task: &DownloadTask, status: WorkerStatus, error_message: Option<String>) {
        let mut progress =
            WorkerProgress::new(self.id, status).for_path(task.entry.relative_path.clone());
        progress.total_bytes = task.entry.size;
        progress.error_message = error_message;
        self.send(progress);
    }

    /// Send progress update (non-blocking)
    fn send(&self, progress: WorkerProgress) {
        let Some(tx) = &self.progress_tx else {
            return;
        };
        if let Err(e) = tx.try_send(progress) {
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    debug!("Worker {} progress channel full, skipping update", self.id);
                }
                mpsc::error::TrySendError::Closed(_) => {
                    debug!("Worker {} progress channel closed", self.id);
                }
            }
        }
    }
}

/// Size of the local file, 0 when it does not exist
async fn local_size(path: &Path) -> DownloadResult<u64> {
    match fs::metadata(path).await {
        Ok(metadata) => Ok(metadata.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(DownloadError::Io(e)),
    }
}

/// Compares the finished file with the expected size
async fn verify_size(path: &Path, expected: Option<u64>) -> DownloadResult<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let actual = local_size(path).await?;
    if actual != expected {
        return Err(DownloadError::SizeMismatch {
            path: path.to_path_buf(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_size_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let size = local_size(&temp_dir.path().join("missing.tif.gz")).await.unwrap();
        assert_eq!(size, 0);
    }

    #[tokio::test]
    async fn test_verify_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("a.tif.gz");
        std::fs::write(&path, b"0123456789").unwrap();

        assert!(verify_size(&path, Some(10)).await.is_ok());
        assert!(verify_size(&path, None).await.is_ok());
        match verify_size(&path, Some(12)).await {
            Err(DownloadError::SizeMismatch {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 12);
                assert_eq!(actual, 10);
            }
            other => panic!("expected size mismatch, got {:?}", other),
        }
    }
}
