use lumen_config::ProviderSettings;
use lumen_core::{ProviderValidationError, safe_referer, validate_provider};
use lumen_types::{ChatMessage, GenerationRequest, ReasoningEffort, Temperature};
use thiserror::Error;

use crate::transcript::TranscriptError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestBuildError {
    #[error(transparent)]
    Provider(#[from] ProviderValidationError),
    #[error("nothing to send: no question and no selection")]
    EmptyPrompt,
    #[error(transparent)]
    Transcript(#[from] TranscriptError),
}

/// Per-request knobs that vary between chat and summary generations.
#[derive(Debug, Clone)]
pub struct RequestOptions<'a> {
    pub model: &'a str,
    pub temperature: Temperature,
    pub reasoning_effort: ReasoningEffort,
    /// Current page URL, if any; becomes the `HTTP-Referer`.
    pub page_url: Option<&'a str>,
}

/// Validate the provider and build a request for `messages`.
pub fn build_request(
    provider: &ProviderSettings,
    options: &RequestOptions<'_>,
    messages: Vec<ChatMessage>,
) -> Result<GenerationRequest, RequestBuildError> {
    let credential = provider
        .api_key
        .as_ref()
        .filter(|key| !key.is_empty())
        .ok_or(ProviderValidationError::NoApiKey)?;
    validate_provider(
        Some(credential.expose_secret()),
        &provider.api_url,
        provider.kind,
    )?;

    let mut request = GenerationRequest::new(
        provider.api_url.as_str(),
        credential.clone(),
        options.model,
        messages,
    )
    .with_temperature(options.temperature)
    .with_reasoning_effort(options.reasoning_effort);
    if let Some(url) = options.page_url {
        request = request.with_referer(safe_referer(url));
    }
    Ok(request)
}
