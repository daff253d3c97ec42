//! Error formatting for generation failures.
//!
//! Maps [`GenerationError`] values and raw error text onto user-facing
//! categories, and renders detailed terminal messages.

use std::fmt::Write;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use lumen_types::{GenerationError, ProviderKind, TransportFailure, truncate_with_ellipsis};

use crate::security::sanitize_display_text;

const STREAM_ERROR_BADGE: &str = "[Stream error]";

/// User-facing classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Network,
    Timeout,
    Cancelled,
    Auth,
    Forbidden,
    NotFound,
    RateLimited,
    Server,
    NoResponse,
    Generic,
}

fn category_patterns() -> &'static [(Regex, ErrorCategory)] {
    static PATTERNS: OnceLock<Vec<(Regex, ErrorCategory)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (r"(?i)network|fetch|connection", ErrorCategory::Network),
            (r"(?i)timeout", ErrorCategory::Timeout),
            (r"(?i)abort", ErrorCategory::Cancelled),
            (r"(?i)401|unauthorized", ErrorCategory::Auth),
            (r"(?i)403|forbidden", ErrorCategory::Forbidden),
            (r"404", ErrorCategory::NotFound),
            (r"(?i)429|rate.?limit", ErrorCategory::RateLimited),
            (r"(?i)5\d{2}|server", ErrorCategory::Server),
            (r"(?i)no response", ErrorCategory::NoResponse),
        ]
        .into_iter()
        .map(|(pattern, category)| {
            (
                Regex::new(pattern).expect("valid error category regex"),
                category,
            )
        })
        .collect()
    })
}

impl ErrorCategory {
    /// Classify free-form error text. The first matching pattern wins.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        category_patterns()
            .iter()
            .find(|(pattern, _)| pattern.is_match(message))
            .map_or(Self::Generic, |(_, category)| *category)
    }

    /// Classify a typed error, falling back to its message for unmapped statuses.
    #[must_use]
    pub fn of(error: &GenerationError) -> Self {
        match error {
            GenerationError::NoResponse => Self::NoResponse,
            GenerationError::Timeout => Self::Timeout,
            GenerationError::Transport(TransportFailure::Status { status, body }) => {
                match status {
                    401 => Self::Auth,
                    403 => Self::Forbidden,
                    404 => Self::NotFound,
                    429 => Self::RateLimited,
                    500..=599 => Self::Server,
                    _ => Self::classify(body),
                }
            }
            GenerationError::Transport(
                TransportFailure::Connection(_) | TransportFailure::Closed,
            ) => Self::Network,
        }
    }

    #[must_use]
    pub const fn user_message(self) -> &'static str {
        match self {
            Self::Network => "Network connection error",
            Self::Timeout => "Request timeout",
            Self::Cancelled => "Request cancelled",
            Self::Auth => "Invalid or expired API Key",
            Self::Forbidden => "Access denied",
            Self::NotFound => "API endpoint not found",
            Self::RateLimited => "Rate limited, please try again later",
            Self::Server => "Server error, please try again later",
            Self::NoResponse => "No response received",
            Self::Generic => "Request failed",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.user_message())
    }
}

#[must_use]
pub fn split_api_error(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("API error ")?;
    let (status, body) = rest.split_once(": ")?;
    Some((status.trim().to_string(), body.trim().to_string()))
}

/// Pull the human-readable message out of a JSON error body.
pub fn extract_error_message(raw: &str) -> Option<String> {
    let body = split_api_error(raw).map_or_else(|| raw.trim().to_string(), |(_, body)| body);
    let payload: Value = serde_json::from_str(&body).ok()?;
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message").and_then(Value::as_str))
        .or_else(|| payload.as_str())
        .map(ToString::to_string)
}

/// Render a failed generation for the terminal.
///
/// Auth failures get a fix-it hint naming the key's environment variable and
/// the config file. Everything is sanitized: provider bodies are untrusted.
#[must_use]
pub fn format_generation_error(error: &GenerationError, kind: ProviderKind, model: &str) -> String {
    let category = ErrorCategory::of(error);
    let raw = error.to_string();
    let (status, body) = split_api_error(&raw).unwrap_or_else(|| (String::new(), raw.clone()));
    let extracted = extract_error_message(&body).unwrap_or(body);

    let mut content = String::new();
    content.push_str(STREAM_ERROR_BADGE);
    content.push_str("\n\n");

    if category == ErrorCategory::Auth {
        let _ = write!(
            content,
            "{} authentication failed for model {}.",
            kind.display_name(),
            model
        );
        let config_hint = lumen_config::config_path().map_or_else(
            || "~/.lumen/config.toml".to_string(),
            |p| p.display().to_string(),
        );
        let _ = write!(
            content,
            "\n\nFix:\n- Set {} (env) or add api_key to {config_hint} under [provider].\n- Then retry your message.",
            kind.env_var()
        );
    } else {
        content.push_str(category.user_message());
        if !status.is_empty() {
            let _ = write!(content, " ({status})");
        }
        content.push('.');
    }

    let detail = truncate_with_ellipsis(&extracted, 200);
    if !detail.is_empty() && detail != category.user_message() {
        content.push_str("\n\nDetails: ");
        content.push_str(&detail);
    }

    sanitize_display_text(&content)
}
