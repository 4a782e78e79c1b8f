//! Progress display for synchronization runs
//!
//! Consumes the [`WorkerProgress`] stream of the download engine. On a
//! terminal it draws an overall bar plus one spinner per worker with
//! indicatif; otherwise it logs a summary line at a fixed interval.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::app::coordinator::{format_bytes, format_download_rate};
use crate::app::worker::{WorkerProgress, WorkerStatus};

/// Configuration for progress display
#[derive(Debug, Clone)]
pub struct ProgressConfig {
    /// Enable visual progress bars
    pub enable_progress_bars: bool,
    /// Show one line per worker
    pub show_worker_details: bool,
    /// Interval between summary lines in text mode
    pub report_interval: Duration,
    /// Maximum width for file names in display
    pub max_filename_width: usize,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            enable_progress_bars: true,
            show_worker_details: true,
            report_interval: Duration::from_secs(10),
            max_filename_width: 48,
        }
    }
}

/// Counters accumulated from worker reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    pub files_completed: usize,
    pub files_failed: usize,
    pub retries: usize,
    pub bytes_downloaded: u64,
}

impl ProgressState {
    /// Fold one report into the counters
    pub fn apply(&mut self, progress: &WorkerProgress) {
        match progress.status {
            WorkerStatus::Downloading => self.bytes_downloaded += progress.bytes_delta,
            WorkerStatus::Completed => self.files_completed += 1,
            WorkerStatus::Failed => self.files_failed += 1,
            WorkerStatus::Retrying { .. } => self.retries += 1,
            WorkerStatus::Started | WorkerStatus::Shutdown => {}
        }
    }
}

/// Progress display manager
pub struct ProgressDisplay {
    config: ProgressConfig,
    is_terminal: bool,
}

impl ProgressDisplay {
    /// Create a new progress display with the given configuration
    pub fn new(config: ProgressConfig) -> Self {
        Self {
            config,
            is_terminal: atty::is(atty::Stream::Stderr),
        }
    }

    /// Consume `progress_rx` in the background until every sender is dropped
    ///
    /// The returned handle yields the final counters.
    pub fn spawn(
        self,
        total_files: usize,
        worker_count: usize,
        progress_rx: mpsc::Receiver<WorkerProgress>,
    ) -> JoinHandle<ProgressState> {
        if self.config.enable_progress_bars && self.is_terminal {
            tokio::spawn(self.run_bars(total_files, worker_count, progress_rx))
        } else {
            tokio::spawn(self.run_text(total_files, progress_rx))
        }
    }

    async fn run_bars(
        self,
        total_files: usize,
        worker_count: usize,
        mut progress_rx: mpsc::Receiver<WorkerProgress>,
    ) -> ProgressState {
        let multi = MultiProgress::new();
        let main_pb = multi.add(ProgressBar::new(total_files as u64));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}")
        {
            main_pb.set_style(style.progress_chars("##-"));
        }
        main_pb.enable_steady_tick(Duration::from_millis(120));

        let mut worker_bars = HashMap::new();
        if self.config.show_worker_details {
            for worker_id in 0..worker_count as u32 {
                let bar = multi.add(ProgressBar::new_spinner());
                if let Ok(style) =
                    ProgressStyle::default_spinner().template("  Worker {prefix}: {spinner:.blue} {msg}")
                {
                    bar.set_style(style);
                }
                bar.set_prefix((worker_id + 1).to_string());
                bar.set_message("idle");
                worker_bars.insert(worker_id, bar);
            }
        }

        let started = Instant::now();
        let mut state = ProgressState::default();
        while let Some(progress) = progress_rx.recv().await {
            state.apply(&progress);

            if matches!(progress.status, WorkerStatus::Completed) {
                main_pb.set_position(state.files_completed as u64);
            }
            main_pb.set_message(summary(&state, started.elapsed()));

            if let Some(bar) = worker_bars.get(&progress.worker_id) {
                bar.set_message(self.worker_line(&progress));
                bar.tick();
            }
        }

        for bar in worker_bars.values() {
            bar.finish_and_clear();
        }
        main_pb.finish_with_message(summary(&state, started.elapsed()));
        debug!("Progress display finished");
        state
    }

    async fn run_text(
        self,
        total_files: usize,
        mut progress_rx: mpsc::Receiver<WorkerProgress>,
    ) -> ProgressState {
        let started = Instant::now();
        let mut last_report = Instant::now();
        let mut state = ProgressState::default();

        while let Some(progress) = progress_rx.recv().await {
            state.apply(&progress);
            if last_report.elapsed() >= self.config.report_interval {
                info!(
                    "Progress: {}/{} files, {}",
                    state.files_completed,
                    total_files,
                    summary(&state, started.elapsed())
                );
                last_report = Instant::now();
            }
        }
        state
    }

    fn worker_line(&self, progress: &WorkerProgress) -> String {
        let name = progress
            .relative_path
            .as_deref()
            .map(|path| truncate_name(path, self.config.max_filename_width))
            .unwrap_or_default();

        match &progress.status {
            WorkerStatus::Started => format!("starting {}", name),
            WorkerStatus::Downloading => match progress.progress_percentage() {
                Some(pct) => format!("{} {:.0}%", name, pct),
                None => format!("{} {}", name, format_bytes(progress.bytes_on_disk)),
            },
            WorkerStatus::Retrying { attempt } => format!("{} retry #{}", name, attempt),
            WorkerStatus::Completed => format!("done {}", name),
            WorkerStatus::Failed => format!("failed {}", name),
            WorkerStatus::Shutdown => "idle".to_string(),
        }
    }
}

fn summary(state: &ProgressState, elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        state.bytes_downloaded as f64 / secs
    } else {
        0.0
    };
    let mut line = format!(
        "{} ({})",
        format_bytes(state.bytes_downloaded),
        format_download_rate(rate)
    );
    if state.files_failed > 0 {
        line.push_str(&format!(", {} failed", state.files_failed));
    }
    line
}

/// Keep the end of long names, which carries the product and date
fn truncate_name(name: &str, max_width: usize) -> String {
    let count = name.chars().count();
    if count <= max_width || max_width < 4 {
        return name.to_string();
    }
    let tail: String = name.chars().skip(count - (max_width - 3)).collect();
    format!("...{}", tail)
}
