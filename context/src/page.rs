//! Page identity and page text preparation.

use std::fmt;
use std::sync::OnceLock;

use lumen_types::{collapse_whitespace, truncate_chars};
use regex::Regex;
use url::Url;

/// Replacement value for redacted parameters.
pub const REDACTED: &str = "[REDACTED]";

/// Joins the head and tail of truncated page text.
pub const TRUNCATION_MARKER: &str = "\n\n... [content truncated] ...\n\n";

/// Default cap for page text sent as chat context.
pub const DEFAULT_PAGE_CONTENT_CHARS: usize = 15_000;

/// Query and fragment parameters whose values never leave the process.
pub const SENSITIVE_PARAMS: &[&str] = &[
    "token",
    "access_token",
    "refresh_token",
    "id_token",
    "api_key",
    "apikey",
    "key",
    "secret",
    "password",
    "passwd",
    "auth",
    "code",
    "session",
    "sid",
    "signature",
    "sig",
];

static FRAGMENT_PARAM: OnceLock<Regex> = OnceLock::new();

fn fragment_param() -> &'static Regex {
    FRAGMENT_PARAM.get_or_init(|| {
        Regex::new(r"([^&#?/=]+)=([^&]*)").expect("valid fragment parameter regex")
    })
}

fn is_sensitive_param(name: &str) -> bool {
    SENSITIVE_PARAMS
        .iter()
        .any(|param| name.eq_ignore_ascii_case(param))
}

/// Replace the values of sensitive query and fragment parameters with [`REDACTED`].
///
/// URLs that do not parse are cut at the first `?` or `#` instead.
#[must_use]
pub fn redact_url(raw: &str) -> String {
    let Ok(mut parsed) = Url::parse(raw) else {
        let end = raw.find(['?', '#']).unwrap_or(raw.len());
        return raw[..end].to_string();
    };

    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    if pairs.iter().any(|(name, _)| is_sensitive_param(name)) {
        parsed.query_pairs_mut().clear().extend_pairs(pairs.iter().map(|(name, value)| {
            if is_sensitive_param(name) {
                (name.as_str(), REDACTED)
            } else {
                (name.as_str(), value.as_str())
            }
        }));
    }

    if let Some(fragment) = parsed.fragment().map(str::to_owned) {
        let redacted = fragment_param().replace_all(&fragment, |caps: &regex::Captures<'_>| {
            if is_sensitive_param(&caps[1]) {
                format!("{}={REDACTED}", &caps[1])
            } else {
                caps[0].to_string()
            }
        });
        if redacted != fragment {
            parsed.set_fragment(Some(&redacted));
        }
    }

    parsed.into()
}

/// Collapse whitespace and keep the head and tail of text longer than `max` chars.
///
/// The head keeps 60% of the budget and the tail 35%; the remainder is spent
/// on [`TRUNCATION_MARKER`].
#[must_use]
pub fn smart_truncate(text: &str, max: usize) -> String {
    let collapsed = collapse_whitespace(text);
    let total = collapsed.chars().count();
    if total <= max {
        return collapsed;
    }

    let head_len = max * 60 / 100;
    let tail_len = max * 35 / 100;
    let head = truncate_chars(&collapsed, head_len);
    let tail_start = collapsed
        .char_indices()
        .nth(total - tail_len)
        .map_or(collapsed.len(), |(idx, _)| idx);
    format!("{head}{TRUNCATION_MARKER}{}", &collapsed[tail_start..])
}

/// Identity of a page: its URL with sensitive parameters redacted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey(String);

impl PageKey {
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        Self(redact_url(url))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Text of one page as extracted by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    url: String,
    text: String,
}

impl PageSnapshot {
    #[must_use]
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn key(&self) -> PageKey {
        PageKey::from_url(&self.url)
    }

    #[must_use]
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }

    /// Page text prepared for a prompt, capped at `max` chars.
    #[must_use]
    pub fn prepared_text(&self, max: usize) -> String {
        smart_truncate(&self.text, max)
    }
}
