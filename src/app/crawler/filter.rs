//! Directory and file selection rules
//!
//! Both rules are pure functions of the decoded entry name. A directory is
//! skipped only when its name matches an excluded configuration folder
//! exactly; a file is kept only when one of the product tokens immediately
//! precedes the wanted extension, so `x.avg_rade9h.tif.gz` passes while
//! `x.avg_rade9h.masked.tif.gz` and `x.cvg.tif.gz` do not.

use serde::{Deserialize, Serialize};

use crate::constants::eog;

/// Outcome of applying a filter rule to an entry name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    Keep,
    Skip,
}

impl FilterDecision {
    pub fn is_keep(self) -> bool {
        self == FilterDecision::Keep
    }
}

/// Selection rules applied while crawling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryFilter {
    /// Directory names that are never descended into
    pub excluded_directories: Vec<String>,
    /// Required file extension, including the leading dot
    pub file_extension: String,
    /// Product tokens that must directly precede the extension
    pub product_tokens: Vec<String>,
}

impl Default for EntryFilter {
    fn default() -> Self {
        Self {
            excluded_directories: vec![eog::MASKED_CONFIGURATION_DIR.to_string()],
            file_extension: eog::FILE_EXTENSION.to_string(),
            product_tokens: vec![
                eog::AVERAGE_RADIANCE_TOKEN.to_string(),
                eog::CLOUD_FREE_COVERAGE_TOKEN.to_string(),
            ],
        }
    }
}

impl EntryFilter {
    /// Decide whether to descend into a directory
    pub fn directory(&self, name: &str) -> FilterDecision {
        let name = name.trim_end_matches('/');
        if self
            .excluded_directories
            .iter()
            .any(|excluded| excluded == name)
        {
            FilterDecision::Skip
        } else {
            FilterDecision::Keep
        }
    }

    /// Decide whether a file is a wanted product
    pub fn file(&self, name: &str) -> FilterDecision {
        let Some(stem) = name.strip_suffix(self.file_extension.as_str()) else {
            return FilterDecision::Skip;
        };

        let wanted = self.product_tokens.iter().any(|token| {
            stem.strip_suffix(token.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
        });

        if wanted {
            FilterDecision::Keep
        } else {
            FilterDecision::Skip
        }
    }
}
