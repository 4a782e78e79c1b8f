//! Concurrent download engine
//!
//! Workers share one [`SessionManager`](crate::app::client::SessionManager)
//! and pull [`DownloadTask`](crate::app::models::DownloadTask)s from a common
//! pending queue. Every task ends the round either complete or failed with a
//! classified error; only an authentication failure aborts the round.
//!
//! - [`config`] - worker count, attempt budget and backoff
//! - [`types`] - progress reports sent to the UI
//! - [`core`] - resumable single-file download
//! - [`pool`] - one round across N workers

pub mod config;
pub mod core;
pub mod pool;
pub mod types;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use core::DownloadWorker;
pub use pool::WorkerPool;
pub use types::{WorkerProgress, WorkerStatus};
