//! Configuration for the retry controller

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{files, sync, workers};
use crate::errors::{DownloadError, DownloadResult};

/// Settings for a multi-round synchronization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Local directory mirroring the remote tree
    pub output_root: PathBuf,
    /// Upper bound on download rounds, the first one included
    pub max_rounds: u32,
    /// Pause between a failed round and the next one
    #[serde(with = "humantime_serde")]
    pub round_delay: Duration,
    /// Concurrent workers per round
    pub worker_count: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            output_root: PathBuf::from(files::DEFAULT_OUTPUT_DIR),
            max_rounds: sync::MAX_ROUNDS,
            round_delay: sync::ROUND_DELAY,
            worker_count: workers::DEFAULT_WORKER_COUNT,
        }
    }
}

impl CoordinatorConfig {
    /// Create a configuration writing under `output_root`
    pub fn new(output_root: impl Into<PathBuf>) -> Self {
        Self {
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    /// Set the round limit
    pub fn with_max_rounds(mut self, max_rounds: u32) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    /// Set the delay between rounds
    pub fn with_round_delay(mut self, delay: Duration) -> Self {
        self.round_delay = delay;
        self
    }

    /// Set the number of workers per round
    pub fn with_worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> DownloadResult<()> {
        if self.max_rounds == 0 {
            return Err(DownloadError::ConfigurationError(
                "Max rounds must be at least 1".to_string(),
            ));
        }

        if self.worker_count == 0 || self.worker_count > workers::MAX_WORKER_COUNT {
            return Err(DownloadError::ConfigurationError(format!(
                "Worker count must be between 1 and {}",
                workers::MAX_WORKER_COUNT
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_rounds, 10);
        assert_eq!(config.round_delay, Duration::from_secs(5));
        assert_eq!(config.output_root, PathBuf::from("./eog_downloads"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(CoordinatorConfig::default()
            .with_max_rounds(0)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_worker_count(0)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::new("/tmp/out")
            .with_worker_count(8)
            .with_round_delay(Duration::ZERO)
            .validate()
            .is_ok());
    }
}
