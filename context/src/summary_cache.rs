//! Single-entry cache of the last page summary.
//!
//! The cache holds at most one entry, for the current page. Storing a
//! summary for a different page evicts the previous entry. Freshness is
//! decided by page identity first, then by content fingerprint.

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::fingerprint::ContentFingerprint;
use crate::page::{DEFAULT_PAGE_CONTENT_CHARS, PageKey, PageSnapshot};

#[derive(Debug, Clone)]
pub struct SummaryCacheEntry {
    page_key: PageKey,
    fingerprint: ContentFingerprint,
    content: String,
    summary: String,
    created_at: DateTime<Utc>,
}

impl SummaryCacheEntry {
    #[must_use]
    pub fn page_key(&self) -> &PageKey {
        &self.page_key
    }

    #[must_use]
    pub fn fingerprint(&self) -> &ContentFingerprint {
        &self.fingerprint
    }

    #[must_use]
    pub fn summary(&self) -> &str {
        &self.summary
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[derive(Debug)]
pub struct SummaryCache {
    entry: Option<SummaryCacheEntry>,
    content_chars: usize,
}

impl Default for SummaryCache {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_CONTENT_CHARS)
    }
}

impl SummaryCache {
    /// Create an empty cache that fingerprints page text capped at `content_chars`.
    #[must_use]
    pub fn new(content_chars: usize) -> Self {
        Self {
            entry: None,
            content_chars,
        }
    }

    /// Whether a cached summary cannot be reused for `page`.
    #[must_use]
    pub fn needs_refresh(&self, page: &PageSnapshot) -> bool {
        let Some(entry) = &self.entry else {
            return true;
        };

        let key = page.key();
        if entry.page_key != key {
            debug!(cached = %entry.page_key, current = %key, "Summary cache miss: page changed");
            return true;
        }

        let current = ContentFingerprint::compute(&page.prepared_text(self.content_chars));
        let changed = entry.fingerprint.differs_significantly(&current);
        if changed {
            debug!(
                cached_len = entry.fingerprint.length(),
                current_len = current.length(),
                "Summary cache miss: content changed"
            );
        }
        changed
    }

    /// The cached summary, if it is still valid for `page` and non-empty.
    #[must_use]
    pub fn get_if_fresh(&self, page: &PageSnapshot) -> Option<&str> {
        if self.needs_refresh(page) {
            return None;
        }
        self.entry
            .as_ref()
            .map(|entry| entry.summary.as_str())
            .filter(|summary| !summary.is_empty())
    }

    /// Record `summary` as the summary of `page`, replacing any previous entry.
    pub fn update(&mut self, page: &PageSnapshot, summary: impl Into<String>) {
        let content = page.prepared_text(self.content_chars);
        let entry = SummaryCacheEntry {
            page_key: page.key(),
            fingerprint: ContentFingerprint::compute(&content),
            content,
            summary: summary.into(),
            created_at: Utc::now(),
        };
        debug!(page = %entry.page_key, chars = entry.fingerprint.length(), "Summary cached");
        self.entry = Some(entry);
    }

    /// Drop the cached entry, e.g. on navigation.
    pub fn clear(&mut self) {
        self.entry = None;
    }

    /// The page text the cached summary was derived from.
    #[must_use]
    pub fn cached_text(&self) -> Option<&str> {
        self.entry
            .as_ref()
            .map(|entry| entry.content.as_str())
            .filter(|content| !content.is_empty())
    }

    #[must_use]
    pub fn entry(&self) -> Option<&SummaryCacheEntry> {
        self.entry.as_ref()
    }
}
