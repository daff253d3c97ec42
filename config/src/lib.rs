//! Configuration for Lumen.
//!
//! [`LumenConfig`] mirrors `~/.lumen/config.toml` verbatim (every field
//! optional); [`Settings`] is the resolved view with defaults, environment
//! fallbacks and overrides applied.
//!
//! ```toml
//! [provider]
//! kind = "openrouter"            # openrouter | openai | custom
//! api_key = "${OPENROUTER_API_KEY}"
//!
//! [chat]
//! model = "deepseek/deepseek-r1"
//! thinking_level = "medium"      # none | low | medium | high
//!
//! [summary]
//! enabled = true
//!
//! [stream]
//! idle_timeout_secs = 90
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use lumen_providers::{
    DEFAULT_STREAM_IDLE_TIMEOUT_SECS, OPENROUTER_CHAT_COMPLETIONS_URL, STREAM_IDLE_TIMEOUT_ENV,
};
use lumen_types::{
    Credential, DEFAULT_CHAT_TEMPERATURE, ProviderKind, ReasoningEffort, Temperature,
};
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CHAT_MODEL: &str = "deepseek/deepseek-r1";
pub const DEFAULT_SUMMARY_MODEL: &str = "google/gemini-2.0-flash-exp:free";
pub const DEFAULT_SUMMARY_TEMPERATURE: f64 = 0.3;
pub const DEFAULT_MAX_HISTORY: usize = 50;
pub const DEFAULT_SUMMARY_CONTENT_CHARS: usize = 20_000;
pub const OPENAI_CHAT_COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

pub const DEFAULT_CHAT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Answer concisely.";

pub const DEFAULT_SUMMARY_SYSTEM_PROMPT: &str = "\
You condense web pages into context for an AI assistant. Summarize the page text you are given.

Rules:
1. Keep only meaningful prose: skip navigation, footers, ads, menus and metadata.
2. Do not reproduce code listings or file lists; describe what they are instead.
3. Stay within 500-1000 words.

Output format:
## Page Type
One line (e.g. documentation, news article, product page, code repository)

## Core Content
Two to five sentences.

## Key Points
- Three to five one-line points";

#[derive(Debug, Default, Deserialize)]
pub struct LumenConfig {
    pub provider: Option<ProviderConfig>,
    pub chat: Option<ChatConfig>,
    pub summary: Option<SummaryConfig>,
    pub stream: Option<StreamConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

#[derive(Default, Deserialize)]
pub struct ProviderConfig {
    pub name: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    #[serde(default)]
    pub kind: ProviderKind,
}

// Manual Debug impl to prevent leaking API keys in logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_url", &self.api_url)
            .field(
                "api_key",
                &if self.api_key.is_some() { "[REDACTED]" } else { "None" },
            )
            .field("kind", &self.kind)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatConfig {
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub thinking_level: Option<ReasoningEffort>,
    /// Transcript cap in messages.
    pub max_history: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SummaryConfig {
    #[serde(default)]
    pub enabled: bool,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub system_prompt: Option<String>,
    pub max_content_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamConfig {
    pub idle_timeout_secs: Option<u64>,
}

pub fn expand_env_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        out.push_str(&rest[..start]);
        let var = &after[..end];
        if !var.is_empty() {
            out.push_str(&env::var(var).unwrap_or_default());
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}

impl LumenConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    /// Load from an explicit path. A missing file is `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lumen").join("config.toml"))
}

// ============================================================================
// Resolved settings
// ============================================================================

#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub name: String,
    pub api_url: String,
    pub api_key: Option<Credential>,
    pub kind: ProviderKind,
}

#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: Temperature,
    pub system_prompt: String,
    pub reasoning_effort: ReasoningEffort,
    pub max_history: usize,
}

#[derive(Debug, Clone)]
pub struct SummarySettings {
    pub enabled: bool,
    pub model: String,
    pub temperature: Temperature,
    pub system_prompt: String,
    pub max_content_chars: usize,
}

/// Effective configuration after defaults and environment are applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub chat: ChatSettings,
    pub summary: SummarySettings,
    pub idle_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::resolve_with(None, |_| None)
    }
}

impl Settings {
    /// Resolve against the process environment.
    #[must_use]
    pub fn resolve(config: Option<&LumenConfig>) -> Self {
        Self::resolve_with(config, |name| env::var(name).ok())
    }

    /// Resolve with an explicit environment lookup.
    ///
    /// - `api_key` values have `${VAR}` references expanded; an absent or
    ///   empty key falls back to the provider kind's environment variable.
    /// - `LUMEN_STREAM_IDLE_TIMEOUT_SECS` (positive) wins over `[stream]`.
    #[must_use]
    pub fn resolve_with(
        config: Option<&LumenConfig>,
        env_lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let provider = config.and_then(|c| c.provider.as_ref());
        let chat = config.and_then(|c| c.chat.as_ref());
        let summary = config.and_then(|c| c.summary.as_ref());
        let stream = config.and_then(|c| c.stream.as_ref());

        let kind = provider.map(|p| p.kind).unwrap_or_default();
        let api_key = provider
            .and_then(|p| p.api_key.as_deref())
            .map(expand_env_vars)
            .filter(|key| !key.trim().is_empty())
            .or_else(|| env_lookup(kind.env_var()).filter(|key| !key.trim().is_empty()))
            .map(|key| Credential::new(key.trim()));
        let api_url = provider
            .and_then(|p| p.api_url.clone())
            .unwrap_or_else(|| default_api_url(kind).to_string());
        let name = provider
            .and_then(|p| p.name.clone())
            .unwrap_or_else(|| kind.display_name().to_string());

        let idle_secs = env_lookup(STREAM_IDLE_TIMEOUT_ENV)
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .or_else(|| stream.and_then(|s| s.idle_timeout_secs).filter(|secs| *secs > 0))
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);

        Self {
            provider: ProviderSettings {
                name,
                api_url,
                api_key,
                kind,
            },
            chat: ChatSettings {
                model: chat
                    .and_then(|c| c.model.clone())
                    .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
                temperature: Temperature::clamped(
                    chat.and_then(|c| c.temperature)
                        .unwrap_or(DEFAULT_CHAT_TEMPERATURE),
                ),
                system_prompt: chat
                    .and_then(|c| c.system_prompt.clone())
                    .unwrap_or_else(|| DEFAULT_CHAT_SYSTEM_PROMPT.to_string()),
                reasoning_effort: chat.and_then(|c| c.thinking_level).unwrap_or_default(),
                max_history: chat
                    .and_then(|c| c.max_history)
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_MAX_HISTORY),
            },
            summary: SummarySettings {
                enabled: summary.is_some_and(|s| s.enabled),
                model: summary
                    .and_then(|s| s.model.clone())
                    .unwrap_or_else(|| DEFAULT_SUMMARY_MODEL.to_string()),
                temperature: Temperature::clamped(
                    summary
                        .and_then(|s| s.temperature)
                        .unwrap_or(DEFAULT_SUMMARY_TEMPERATURE),
                ),
                system_prompt: summary
                    .and_then(|s| s.system_prompt.clone())
                    .unwrap_or_else(|| DEFAULT_SUMMARY_SYSTEM_PROMPT.to_string()),
                max_content_chars: summary
                    .and_then(|s| s.max_content_chars)
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_SUMMARY_CONTENT_CHARS),
            },
            idle_timeout: Duration::from_secs(idle_secs),
        }
    }
}

#[must_use]
pub const fn default_api_url(kind: ProviderKind) -> &'static str {
    match kind {
        ProviderKind::OpenAi => OPENAI_CHAT_COMPLETIONS_URL,
        ProviderKind::OpenRouter | ProviderKind::Custom => OPENROUTER_CHAT_COMPLETIONS_URL,
    }
}
