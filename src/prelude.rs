//! Prelude module for EOG Fetcher Library
//!
//! Re-exports the items needed for a typical synchronization with a single
//! `use eog_fetcher::prelude::*;` statement.
//!
//! ```rust,no_run
//! use eog_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let session = Arc::new(SessionManager::new(
//!         SessionConfig::eog()?,
//!         Credentials::from_env()?,
//!         ClientConfig::default(),
//!     )?);
//!     let pool = WorkerPool::new(WorkerConfig::default(), session)?;
//!     let coordinator = Coordinator::new(CoordinatorConfig::default(), pool)?;
//!     let report = coordinator.sync_all(Vec::new()).await?;
//!     assert!(report.all_succeeded);
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, ErrorKind, Result};

pub use crate::app::{
    BackoffPolicy, CacheStore, ClientConfig, Coordinator, CoordinatorConfig, CrawlConfig,
    Crawler, Credentials, DirectoryLister, DownloadTask, EntryFilter, FailedEntry,
    HtmlDirectoryLister, RemoteEntry, RoundResult, SessionConfig, SessionManager, SyncReport,
    WorkerConfig, WorkerPool,
};

// Authentication functions
pub use crate::auth::{check_credentials, get_auth_status, verify_credentials, AuthStatus};

// Commonly used constants
pub use crate::constants::{DEFAULT_WORKER_COUNT, EOG_BASE_URL, ENV_PASSWORD, ENV_USERNAME};

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
