//! Streaming chat-completion client.
//!
//! # Architecture
//!
//! - [`decoder`] - pure incremental parser from raw response text to
//!   reasoning/answer deltas
//! - [`transport`] - the injected transport capability ([`Transport`])
//! - [`http`] - reqwest implementation of [`Transport`]
//! - [`session`] - one generation attempt: transport + decoder + idle timer
//!
//! # Error Handling
//!
//! Failures during streaming are delivered through [`DeltaSink::on_error`]
//! rather than `Result::Err` returns, allowing partial output to be kept.
//! Malformed individual records never surface; the decoder logs and skips
//! them.

pub mod decoder;
pub mod http;
pub mod session;
pub mod sse_types;
pub mod transport;

use std::sync::OnceLock;
use std::time::Duration;

use lumen_types::GenerationRequest;
use serde_json::{Map, Value, json};

pub use decoder::{StreamDecoder, StreamState, StructuredEvent};
pub use http::{HttpTransport, read_capped_error_body};
pub use lumen_types;
pub use session::{DeltaSink, GenerationOutcome, GenerationSession, NoopSink, SessionHandle};
pub use transport::{ResponseCursor, Transport, TransportEvent, TransportHandle, TransportRequest};

/// Default OpenAI-compatible chat-completion endpoint.
pub const OPENROUTER_CHAT_COMPLETIONS_URL: &str = "https://openrouter.ai/api/v1/chat/completions";

/// Sent as `X-Title` so the endpoint can attribute traffic.
pub const APP_TITLE: &str = "Lumen";

/// Environment override for the idle timeout, in whole seconds.
pub const STREAM_IDLE_TIMEOUT_ENV: &str = "LUMEN_STREAM_IDLE_TIMEOUT_SECS";

pub const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;

const CONNECT_TIMEOUT_SECS: u64 = 30;

// Only the idle time is configurable; interval/retries use platform defaults.
const TCP_KEEPALIVE_SECS: u64 = 60;

const POOL_MAX_IDLE_PER_HOST: usize = 16;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

pub(crate) const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder().build().unwrap_or_else(|e| {
            tracing::error!(
                "Failed to build hardened HTTP client: {e}. Attempting minimal hardened fallback."
            );
            reqwest::Client::builder()
                .https_only(true)
                .redirect(reqwest::redirect::Policy::none())
                .build()
                .expect("Minimal hardened HTTP client must build; cannot proceed without TLS")
        })
    })
}

fn base_client_builder() -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(true)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

/// JSON body of a streamed chat-completion request.
///
/// `reasoning` is only present when an effort level is requested.
#[must_use]
pub fn build_request_body(request: &GenerationRequest) -> Value {
    let mut body = Map::new();
    body.insert("model".into(), json!(request.model()));
    body.insert("messages".into(), json!(request.messages()));
    body.insert("stream".into(), json!(true));
    body.insert("temperature".into(), json!(request.temperature().value()));

    let effort = request.reasoning_effort();
    if effort.is_enabled() {
        body.insert("reasoning".into(), json!({ "effort": effort.as_str() }));
    }

    Value::Object(body)
}

#[must_use]
pub fn request_headers(request: &GenerationRequest) -> Vec<(String, String)> {
    let mut headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (
            "Authorization".to_string(),
            format!("Bearer {}", request.credential().expose_secret()),
        ),
    ];
    if let Some(referer) = request.referer() {
        headers.push(("HTTP-Referer".to_string(), referer.to_string()));
    }
    headers.push(("X-Title".to_string(), APP_TITLE.to_string()));
    headers
}
