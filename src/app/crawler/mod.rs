//! Recursive discovery of downloadable entries
//!
//! The crawler walks the archive depth-first from a scan root. For every
//! directory it lists, kept files are emitted in listing order before any
//! kept subdirectory is descended into, so the output order is stable for a
//! given remote tree. Excluded directories are never listed.
//!
//! [`Crawler::scan`] consults the [`CacheStore`] first and only crawls when no
//! record exists for the root; a completed crawl is stored for the next run.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::{Stream, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::app::backoff::BackoffPolicy;
use crate::app::cache::{CacheRecord, CacheStore};
use crate::app::models::RemoteEntry;
use crate::constants::crawl;
use crate::errors::{CrawlError, CrawlResult, DownloadError};

pub mod filter;
pub mod listing;

pub use filter::{EntryFilter, FilterDecision};
pub use listing::{DirectoryLister, HtmlDirectoryLister, ListingEntry};

/// Crawl retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// Retries of a failed listing fetch before the scan is abandoned
    pub max_retries: u32,
    /// Delay between listing retries
    pub backoff: BackoffPolicy,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_retries: crawl::MAX_RETRIES,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Ensures a scan root ends with `/` so children resolve beneath it
pub fn normalize_root(mut root: Url) -> Url {
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root.set_query(None);
    root.set_fragment(None);
    root
}

struct WalkState {
    /// Directories still to list; the next one is at the end
    stack: Vec<RemoteEntry>,
    /// Files of the most recent listing not yet yielded
    pending: VecDeque<RemoteEntry>,
    visited: HashSet<String>,
    rng: fastrand::Rng,
}

/// Archive crawler
pub struct Crawler {
    lister: Arc<dyn DirectoryLister>,
    cache: Arc<CacheStore>,
    filter: EntryFilter,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(
        lister: Arc<dyn DirectoryLister>,
        cache: Arc<CacheStore>,
        filter: EntryFilter,
        config: CrawlConfig,
    ) -> Self {
        Self {
            lister,
            cache,
            filter,
            config,
        }
    }

    /// Kept entries under `root`, from the cache when available
    pub async fn scan(&self, root: &Url) -> CrawlResult<Vec<RemoteEntry>> {
        let root = normalize_root(root.clone());
        if let Some(record) = self.cache.load(&root).await? {
            info!(
                "Using {} cached entries for {} (use --rescan to refresh)",
                record.entries.len(),
                root
            );
            return Ok(record.entries);
        }
        self.crawl_and_store(root).await
    }

    /// Crawls `root` ignoring any cached record, then replaces it
    pub async fn rescan(&self, root: &Url) -> CrawlResult<Vec<RemoteEntry>> {
        self.crawl_and_store(normalize_root(root.clone())).await
    }

    async fn crawl_and_store(&self, root: Url) -> CrawlResult<Vec<RemoteEntry>> {
        info!("Crawling {}", root);
        let entries: Vec<RemoteEntry> = self.walk(root.clone()).try_collect().await?;
        let record = CacheRecord::new(root, entries);
        let entries = record.entries.clone();
        self.cache.store(record).await?;
        info!("Crawl finished with {} files", entries.len());
        Ok(entries)
    }

    /// Lazily yields kept files under `root`, depth-first
    ///
    /// The stream ends after the first error.
    pub fn walk(&self, root: Url) -> impl Stream<Item = CrawlResult<RemoteEntry>> + '_ {
        let root = normalize_root(root);
        let mut visited = HashSet::new();
        visited.insert(root.as_str().to_string());

        let state = WalkState {
            stack: vec![RemoteEntry::directory(root, "")],
            pending: VecDeque::new(),
            visited,
            rng: fastrand::Rng::new(),
        };

        futures::stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(entry) = state.pending.pop_front() {
                    return Ok::<_, CrawlError>(Some((entry, state)));
                }
                let Some(directory) = state.stack.pop() else {
                    return Ok(None);
                };
                self.expand(&directory, &mut state).await?;
            }
        })
    }

    /// Lists one directory and queues its kept children
    async fn expand(&self, directory: &RemoteEntry, state: &mut WalkState) -> CrawlResult<()> {
        info!("Scanning directory: {}", directory.url);
        let children = self.list_with_retry(&directory.url, &mut state.rng).await?;

        let mut subdirectories = Vec::new();
        for child in children {
            let relative_path = if directory.relative_path.is_empty() {
                child.name.clone()
            } else {
                format!("{}/{}", directory.relative_path, child.name)
            };

            if child.is_directory {
                if !self.filter.directory(&child.name).is_keep() {
                    debug!("Skipping excluded directory: {}", child.name);
                    continue;
                }
                if state.visited.insert(child.url.as_str().to_string()) {
                    subdirectories.push(RemoteEntry::directory(child.url, relative_path));
                }
            } else if self.filter.file(&child.name).is_keep() {
                state
                    .pending
                    .push_back(RemoteEntry::file(child.url, relative_path, None));
            }
        }

        state.stack.extend(subdirectories.into_iter().rev());
        Ok(())
    }

    async fn list_with_retry(
        &self,
        url: &Url,
        rng: &mut fastrand::Rng,
    ) -> CrawlResult<Vec<ListingEntry>> {
        let mut retries = 0u32;
        loop {
            match self.lister.list_children(url).await {
                Ok(children) => return Ok(children),
                Err(DownloadError::Auth(e)) => return Err(CrawlError::Auth(e)),
                Err(e) if !e.is_retryable() || retries >= self.config.max_retries => {
                    warn!("Giving up on listing {}: {}", url, e);
                    return Err(CrawlError::Incomplete {
                        url: url.to_string(),
                        attempts: retries + 1,
                        source: Box::new(e),
                    });
                }
                Err(e) => {
                    retries += 1;
                    let delay = self.config.backoff.delay(retries, rng);
                    warn!(
                        "Listing {} failed: {}. Retrying in {:?} ({}/{})",
                        url, e, delay, retries, self.config.max_retries
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::errors::DownloadResult;

    /// In-memory lister over a fixed tree, counting calls per URL
    #[derive(Default)]
    struct FakeLister {
        tree: HashMap<String, Vec<(&'static str, bool)>>,
        failures: Mutex<HashMap<String, u32>>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeLister {
        fn with_dir(mut self, url: &str, children: Vec<(&'static str, bool)>) -> Self {
            self.tree.insert(url.to_string(), children);
            self
        }

        fn failing(self, url: &str, times: u32) -> Self {
            self.failures.lock().unwrap().insert(url.to_string(), times);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl DirectoryLister for FakeLister {
        async fn list_children(&self, url: &Url) -> DownloadResult<Vec<ListingEntry>> {
            self.calls.lock().unwrap().push(url.to_string());
            {
                let mut failures = self.failures.lock().unwrap();
                if let Some(remaining) = failures.get_mut(url.as_str()) {
                    if *remaining > 0 {
                        *remaining -= 1;
                        return Err(DownloadError::transient(url.as_str(), "connection reset"));
                    }
                }
            }
            let children = self.tree.get(url.as_str()).cloned().unwrap_or_default();
            Ok(children
                .into_iter()
                .map(|(href, is_directory)| {
                    let url = url.join(href).unwrap();
                    ListingEntry {
                        name: href.trim_end_matches('/').to_string(),
                        url,
                        is_directory,
                    }
                })
                .collect())
        }
    }

    const ROOT: &str = "https://archive.example/monthly/";

    fn sample_lister() -> FakeLister {
        FakeLister::default()
            .with_dir(
                ROOT,
                vec![("2012/", true), ("readme.txt", false), ("2013/", true)],
            )
            .with_dir(
                "https://archive.example/monthly/2012/",
                vec![
                    ("vcmslcfg/", true),
                    ("vcmcfg/", true),
                    ("top.cf_cvg.tif.gz", false),
                ],
            )
            .with_dir(
                "https://archive.example/monthly/2012/vcmcfg/",
                vec![
                    ("a.avg_rade9h.tif.gz", false),
                    ("a.avg_rade9h.masked.tif.gz", false),
                    ("a.cvg.tif.gz", false),
                    ("a.cf_cvg.tif.gz", false),
                ],
            )
            .with_dir(
                "https://archive.example/monthly/2013/",
                vec![("b.avg_rade9h.tif.gz", false)],
            )
    }

    fn crawler(lister: Arc<FakeLister>, cache: Arc<CacheStore>) -> Crawler {
        let config = CrawlConfig {
            max_retries: 2,
            backoff: BackoffPolicy::new(Duration::from_millis(1), Duration::from_millis(5), 0.0),
        };
        Crawler::new(lister, cache, EntryFilter::default(), config)
    }

    fn root() -> Url {
        Url::parse(ROOT).unwrap()
    }

    #[tokio::test]
    async fn test_walk_order_and_filters() {
        let temp_dir = TempDir::new().unwrap();
        let lister = Arc::new(sample_lister());
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache.json")));
        let crawler = crawler(lister.clone(), cache);

        let entries: Vec<_> = crawler.walk(root()).try_collect().await.unwrap();
        let paths: Vec<_> = entries.iter().map(|e| e.relative_path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "2012/top.cf_cvg.tif.gz",
                "2012/vcmcfg/a.avg_rade9h.tif.gz",
                "2012/vcmcfg/a.cf_cvg.tif.gz",
                "2013/b.avg_rade9h.tif.gz",
            ]
        );

        // The masked configuration folder is never listed
        assert!(!lister.calls().iter().any(|url| url.contains("vcmslcfg")));
        assert_eq!(lister.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_scan_uses_cache_on_second_run() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache.json")));

        let first = Arc::new(sample_lister());
        let entries = crawler(first.clone(), cache.clone())
            .scan(&root())
            .await
            .unwrap();
        assert_eq!(entries.len(), 4);

        let second = Arc::new(sample_lister());
        let cached = crawler(second.clone(), cache.clone())
            .scan(&root())
            .await
            .unwrap();
        assert_eq!(cached, entries);
        assert!(second.calls().is_empty());

        // Rescan bypasses the record
        crawler(second.clone(), cache).rescan(&root()).await.unwrap();
        assert_eq!(second.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_listing_failures_are_retried() {
        let temp_dir = TempDir::new().unwrap();
        let cache = Arc::new(CacheStore::new(temp_dir.path().join("cache.json")));
        let lister = Arc::new(sample_lister().failing("https://archive.example/monthly/2013/", 2));

        let entries = crawler(lister.clone(), cache).scan(&root()).await.unwrap();
        assert_eq!(entries.len(), 4);
    }

    #[tokio::test]
    async fn test_persistent_listing_failure_is_incomplete() {
        let temp_dir = TempDir::new().unwrap();
        let cache_path = temp_dir.path().join("cache.json");
        let cache = Arc::new(CacheStore::new(&cache_path));
        let lister = Arc::new(sample_lister().failing("https://archive.example/monthly/2013/", 10));

        let result = crawler(lister, cache).scan(&root()).await;
        match result {
            Err(CrawlError::Incomplete { url, attempts, .. }) => {
                assert_eq!(url, "https://archive.example/monthly/2013/");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected incomplete crawl, got {:?}", other),
        }
        // Nothing is cached from a partial crawl
        assert!(!cache_path.exists());
    }

    #[test]
    fn test_normalize_root() {
        let root = normalize_root(Url::parse("https://x.example/a/b?C=N").unwrap());
        assert_eq!(root.as_str(), "https://x.example/a/b/");
    }
}
