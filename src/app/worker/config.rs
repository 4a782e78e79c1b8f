//! Worker configuration management
//!
//! Configuration structures and validation for the download engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::app::backoff::BackoffPolicy;
use crate::constants::workers;
use crate::errors::{DownloadError, DownloadResult};

/// Configuration for download workers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent workers to spawn
    pub worker_count: usize,
    /// Content attempts per task within one round
    pub max_attempts: u32,
    /// Delay between attempts of the same task
    pub backoff: BackoffPolicy,
    /// Channel buffer size for progress reporting
    pub progress_buffer_size: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: workers::DEFAULT_WORKER_COUNT,
            max_attempts: workers::MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
            progress_buffer_size: workers::CHANNEL_BUFFER_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Validate configuration values and return errors for invalid settings
    pub fn validate(&self) -> DownloadResult<()> {
        if self.worker_count == 0 {
            return Err(DownloadError::ConfigurationError(
                "Worker count cannot be zero".to_string(),
            ));
        }

        if self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(DownloadError::ConfigurationError(format!(
                "Worker count ({}) exceeds maximum ({})",
                self.worker_count,
                workers::MAX_WORKER_COUNT
            )));
        }

        if self.max_attempts == 0 {
            return Err(DownloadError::ConfigurationError(
                "Max attempts must be at least 1".to_string(),
            ));
        }

        if self.backoff.base > self.backoff.cap {
            return Err(DownloadError::ConfigurationError(
                "Backoff base must not exceed backoff cap".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.backoff.jitter) {
            return Err(DownloadError::ConfigurationError(
                "Backoff jitter must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for WorkerConfig
#[derive(Debug, Default)]
pub struct WorkerConfigBuilder {
    config: WorkerConfig,
}

impl WorkerConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: WorkerConfig::default(),
        }
    }

    /// Set the number of workers
    pub fn worker_count(mut self, count: usize) -> Self {
        self.config.worker_count = count;
        self
    }

    /// Set the per-round attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set base and cap of the retry backoff
    pub fn backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.config.backoff.base = base;
        self.config.backoff.cap = cap;
        self
    }

    /// Set backoff jitter fraction
    pub fn backoff_jitter(mut self, jitter: f64) -> Self {
        self.config.backoff.jitter = jitter;
        self
    }

    /// Set progress buffer size
    pub fn progress_buffer_size(mut self, size: usize) -> Self {
        self.config.progress_buffer_size = size;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> DownloadResult<WorkerConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
