//! Scan cache
//!
//! Remembers which remote entries a crawl discovered so later runs can skip
//! the crawl entirely. Records are keyed by scan root and live together in a
//! single JSON document (`eog_files_cache.json` by default) that is always
//! replaced atomically.
//!
//! - [`store`] - the JSON-backed [`CacheStore`]
//! - [`stats`] - summaries reported by `cache info`

pub mod stats;
pub mod store;

pub use stats::{CacheInfo, RootSummary};
pub use store::{dedupe_entries, CacheDocument, CacheRecord, CacheStore};
