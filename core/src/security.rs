//! Credential, endpoint and page-sensitivity checks, plus terminal-safe text.
//!
//! Everything that decides what may leave the process (which host receives a
//! key, what goes in a `Referer`) or what may reach the terminal lives here.

use std::borrow::Cow;
use std::sync::OnceLock;

use lumen_context::redact_url;
use lumen_types::ProviderKind;
use regex::Regex;
use thiserror::Error;
use url::{Host, Url};

const MIN_API_KEY_LEN: usize = 10;
const MAX_API_KEY_LEN: usize = 200;

/// Hosts accepted for the standard provider kinds.
pub const ALLOWED_API_HOSTS: &[&str] = &["openrouter.ai", "api.openai.com"];

/// Host prefixes refused for custom providers (loopback, private, link-local).
const BLOCKED_HOST_PREFIXES: &[&str] = &[
    "localhost",
    "127.",
    "10.",
    "192.168.",
    "172.16.",
    "172.17.",
    "172.18.",
    "172.19.",
    "172.20.",
    "172.21.",
    "172.22.",
    "172.23.",
    "172.24.",
    "172.25.",
    "172.26.",
    "172.27.",
    "172.28.",
    "172.29.",
    "172.30.",
    "172.31.",
    "169.254.",
    "0.0.0.0",
];

/// Longest prefix of `host + path` inspected by [`is_sensitive_page`].
const SENSITIVE_SCAN_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProviderValidationError {
    #[error("Provider not configured")]
    NoProvider,
    #[error("API Key not set")]
    NoApiKey,
    #[error("Invalid API Key format")]
    InvalidApiKey,
    #[error("Invalid API URL")]
    InvalidUrl,
}

#[must_use]
pub fn validate_api_key(key: &str) -> bool {
    (MIN_API_KEY_LEN..=MAX_API_KEY_LEN).contains(&key.len())
        && key
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'-'))
}

/// Whether `url` may receive a credential for a provider of `kind`.
///
/// Only https is accepted. Standard kinds must target an allow-listed host;
/// `Custom` accepts any host that is not loopback, private or link-local.
#[must_use]
pub fn is_valid_api_url(url: &str, kind: ProviderKind) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.scheme() != "https" {
        return false;
    }
    let hostname = match parsed.host() {
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return false,
    };

    match kind {
        ProviderKind::Custom => {
            let blocked = BLOCKED_HOST_PREFIXES
                .iter()
                .any(|prefix| hostname == *prefix || hostname.starts_with(prefix));
            !blocked && hostname != "::1" && !hostname.starts_with("fe80:")
        }
        ProviderKind::OpenRouter | ProviderKind::OpenAi => {
            ALLOWED_API_HOSTS.contains(&hostname.as_str())
        }
    }
}

pub fn validate_provider(
    api_key: Option<&str>,
    api_url: &str,
    kind: ProviderKind,
) -> Result<(), ProviderValidationError> {
    let key = api_key
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(ProviderValidationError::NoApiKey)?;
    if !validate_api_key(key) {
        return Err(ProviderValidationError::InvalidApiKey);
    }
    if !is_valid_api_url(api_url, kind) {
        return Err(ProviderValidationError::InvalidUrl);
    }
    Ok(())
}

fn sensitive_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // finance
            r"bank",
            r"paypal",
            r"stripe",
            r"alipay",
            r"wechat\w{0,20}pay",
            // mail
            r"mail\.",
            r"outlook",
            r"gmail",
            // auth
            r"login",
            r"signin",
            r"\bauth\b",
            r"password",
            r"credential",
            // health
            r"health",
            r"medical",
            r"patient",
            // government
            r"\.gov(?:$|[./:])",
            r"gov\.cn",
        ]
        .iter()
        .map(|pattern| Regex::new(pattern).expect("valid sensitive-page regex"))
        .collect()
    })
}

/// Banking, mail, auth, health and government pages.
#[must_use]
pub fn is_sensitive_page(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default().to_ascii_lowercase();
    let path = parsed.path().to_ascii_lowercase();
    let scanned: String = format!("{host}{path}")
        .chars()
        .take(SENSITIVE_SCAN_LIMIT)
        .collect();
    sensitive_patterns()
        .iter()
        .any(|pattern| pattern.is_match(&scanned))
}

/// `Referer` value for a request made while `url` is the current page.
///
/// Sensitive pages disclose only their origin; others send the redacted URL.
#[must_use]
pub fn safe_referer(url: &str) -> String {
    if is_sensitive_page(url)
        && let Ok(parsed) = Url::parse(url)
    {
        return parsed.origin().ascii_serialization();
    }
    redact_url(url)
}

const ESC: char = '\x1b';

/// Strip terminal escape sequences and control characters from untrusted text.
///
/// Newlines, carriage returns and tabs survive. CSI, OSC and two-byte ESC
/// sequences are removed whole so a model cannot rewrite the terminal.
#[must_use]
pub fn sanitize_terminal_text(input: &str) -> Cow<'_, str> {
    let needs_work = input
        .chars()
        .any(|c| c.is_control() && !matches!(c, '\n' | '\r' | '\t'));
    if !needs_work {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ESC {
            match chars.next() {
                // CSI: parameters then one final byte in @..~
                Some('[') => {
                    for next in chars.by_ref() {
                        if ('@'..='~').contains(&next) {
                            break;
                        }
                    }
                }
                // OSC: terminated by BEL or ST (ESC \)
                Some(']') => {
                    while let Some(next) = chars.next() {
                        if next == '\x07' {
                            break;
                        }
                        if next == ESC && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            }
        } else if matches!(c, '\n' | '\r' | '\t') || !c.is_control() {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

fn api_key_patterns() -> &'static [(Regex, &'static str)] {
    static PATTERNS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            (
                Regex::new(r"\bBearer\s+[A-Za-z0-9._~+/=-]{8,}")
                    .expect("valid bearer token regex"),
                "Bearer [REDACTED]",
            ),
            (
                Regex::new(r"\bsk-or-[A-Za-z0-9_-]{8,}").expect("valid openrouter key regex"),
                "sk-or-***",
            ),
            (
                Regex::new(r"\bsk-[A-Za-z0-9_-]{8,}").expect("valid openai key regex"),
                "sk-***",
            ),
        ]
    })
}

/// Mask provider API keys and bearer tokens in `raw`.
#[must_use]
pub fn redact_api_keys(raw: &str) -> String {
    let mut out = raw.to_string();
    for (pattern, replacement) in api_key_patterns() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

/// Terminal-safe, key-free rendering of untrusted text (errors, model output).
///
/// Control sequences are stripped before redaction so a key split by escape
/// bytes cannot reassemble after sanitizing.
#[must_use]
pub fn sanitize_display_text(input: &str) -> String {
    redact_api_keys(&sanitize_terminal_text(input))
}
