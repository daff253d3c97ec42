//! Page identity and derived-content reuse.
//!
//! This crate provides:
//! - URL redaction and page identity keys
//! - Head/tail truncation of page text
//! - A cheap, lossy content fingerprint
//! - A single-entry summary cache keyed by page identity
//!
//! # Architecture
//!
//! ```text
//! SummaryCache
//! └── entry: Option<SummaryCacheEntry>
//!     ├── page_key: PageKey (redacted URL)
//!     ├── fingerprint: ContentFingerprint (length + sampled chars)
//!     └── summary / derived text
//! ```
//!
//! Nothing here performs I/O; the page text is supplied by the caller.

mod fingerprint;
mod page;
mod summary_cache;

pub use fingerprint::{CHANGE_THRESHOLD, ContentFingerprint, SAMPLE_COUNT};
pub use page::{
    DEFAULT_PAGE_CONTENT_CHARS, PageKey, PageSnapshot, REDACTED, SENSITIVE_PARAMS,
    TRUNCATION_MARKER, redact_url, smart_truncate,
};
pub use summary_cache::{SummaryCache, SummaryCacheEntry};
