//! Directory listing retrieval and parsing
//!
//! The crawler only needs "the children of this URL". [`DirectoryLister`] is
//! that capability; [`HtmlDirectoryLister`] implements it over Apache-style
//! HTML index pages fetched through the session manager.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use scraper::{Html, Selector};
use url::Url;

use crate::app::client::SessionManager;
use crate::errors::DownloadResult;

/// One child link of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    /// Percent-decoded name without trailing slash
    pub name: String,
    /// Absolute URL of the child
    pub url: Url,
    pub is_directory: bool,
}

/// Yields the children of a remote directory
#[async_trait]
pub trait DirectoryLister: Send + Sync {
    /// List the direct children of `url`, in listing order
    async fn list_children(&self, url: &Url) -> DownloadResult<Vec<ListingEntry>>;
}

/// Lists directories by scraping HTML index pages
#[derive(Debug, Clone)]
pub struct HtmlDirectoryLister {
    session: Arc<SessionManager>,
}

impl HtmlDirectoryLister {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl DirectoryLister for HtmlDirectoryLister {
    async fn list_children(&self, url: &Url) -> DownloadResult<Vec<ListingEntry>> {
        let html = self.session.get_page(url).await?;
        let entries = parse_listing(url, &html);
        tracing::debug!("Listing {} has {} entries", url, entries.len());
        Ok(entries)
    }
}

/// Extracts child links from an index page
///
/// Parent and self links, column-sort queries, host-absolute links and
/// anything resolving outside `base` are ignored. Duplicate links keep their
/// first position.
pub fn parse_listing(base: &Url, html: &str) -> Vec<ListingEntry> {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut entries = Vec::new();

    for link in document.select(&selector) {
        let Some(href) = link.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href == "../"
            || href == "./"
            || href.starts_with('?')
            || href.starts_with('#')
            || href.starts_with('/')
        {
            continue;
        }

        let Ok(mut url) = base.join(href) else {
            continue;
        };
        url.set_fragment(None);
        if url.query().is_some() || !is_child_of(base, &url) {
            continue;
        }

        if !seen.insert(url.as_str().to_string()) {
            continue;
        }

        let is_directory = url.path().ends_with('/');
        let name = decoded_name(&url);
        if name.is_empty() {
            continue;
        }

        entries.push(ListingEntry {
            name,
            url,
            is_directory,
        });
    }

    entries
}

fn is_child_of(base: &Url, url: &Url) -> bool {
    let base = base.as_str();
    let url = url.as_str();
    let prefix = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    url.len() > prefix.len() && url.starts_with(&prefix)
}

/// Percent-decoded last path segment of a URL
pub fn decoded_name(url: &Url) -> String {
    let raw = url
        .path()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    urlencoding::decode(raw)
        .map(|name| name.into_owned())
        .unwrap_or_else(|_| raw.to_string())
}
