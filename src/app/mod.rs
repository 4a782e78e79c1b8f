//! Core application logic for EOG Fetcher
//!
//! This module contains the authenticated session, the archive crawler and its
//! cache, the download engine and the round-based retry controller.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eog_fetcher::app::{
//!     CacheStore, ClientConfig, Coordinator, CoordinatorConfig, CrawlConfig, Crawler,
//!     Credentials, EntryFilter, HtmlDirectoryLister, SessionConfig, SessionManager,
//!     WorkerConfig, WorkerPool,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(
//!     SessionManager::connect(
//!         SessionConfig::eog()?,
//!         Credentials::from_env()?,
//!         ClientConfig::default(),
//!     )
//!     .await?,
//! );
//!
//! let crawler = Crawler::new(
//!     Arc::new(HtmlDirectoryLister::new(Arc::clone(&session))),
//!     Arc::new(CacheStore::in_working_directory()),
//!     EntryFilter::default(),
//!     CrawlConfig::default(),
//! );
//! let pool = WorkerPool::new(WorkerConfig::default(), session)?;
//! let coordinator = Coordinator::new(CoordinatorConfig::default(), pool)?.with_crawler(crawler);
//!
//! let root = url::Url::parse(eog_fetcher::constants::EOG_BASE_URL)?;
//! let report = coordinator.run(&root, false).await?;
//! println!("{} files synchronized", report.files_succeeded);
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod cache;
pub mod client;
pub mod coordinator;
pub mod crawler;
pub mod models;
pub mod worker;

// Re-export main public API
pub use backoff::BackoffPolicy;
pub use cache::{CacheInfo, CacheRecord, CacheStore};
pub use client::{ClientConfig, Credentials, Session, SessionConfig, SessionManager};
pub use coordinator::{Coordinator, CoordinatorConfig, SignalHandler, SyncReport};
pub use crawler::{
    CrawlConfig, Crawler, DirectoryLister, EntryFilter, HtmlDirectoryLister, ListingEntry,
};
pub use models::{DownloadTask, EntryKind, FailedEntry, RemoteEntry, RoundResult, TaskStatus};
pub use worker::{WorkerConfig, WorkerPool, WorkerProgress, WorkerStatus};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        let config = ClientConfig::default();
        assert!(config.tcp_nodelay);
        assert_eq!(WorkerConfig::default().worker_count, 4);
    }
}
