//! Shared fixtures: wiremock-backed completion endpoints and recording sinks.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_types::{ChatMessage, Credential, GenerationError, GenerationRequest};
use lumen_providers::{DeltaSink, HttpTransport};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const COMPLETIONS_PATH: &str = "/api/v1/chat/completions";
pub const TEST_KEY: &str = "sk-or-v1-integration0";

/// `data:` record carrying an answer delta.
pub fn content_record(text: &str) -> String {
    let chunk = serde_json::json!({ "choices": [{ "delta": { "content": text } }] });
    format!("data: {chunk}\n\n")
}

/// `data:` record carrying a DeepSeek-style reasoning delta.
pub fn reasoning_record(text: &str) -> String {
    let chunk =
        serde_json::json!({ "choices": [{ "delta": { "reasoning_content": text } }] });
    format!("data: {chunk}\n\n")
}

/// Event-stream body of `records` terminated by `[DONE]`.
pub fn sse_body(records: &[String]) -> String {
    let mut body: String = records.concat();
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn sse_response(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .set_body_string(body.into())
        .insert_header("content-type", "text/event-stream")
}

/// Mount a streaming completion response on the completions path.
pub async fn mount_stream(server: &MockServer, body: impl Into<String>) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(body))
        .mount(server)
        .await;
}

pub async fn mount_delayed_stream(server: &MockServer, body: impl Into<String>, delay: Duration) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(sse_response(body).set_delay(delay))
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("POST"))
        .and(path(COMPLETIONS_PATH))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

/// Request against the mock server's completions endpoint.
pub fn request_to(server: &MockServer, question: &str) -> GenerationRequest {
    GenerationRequest::new(
        format!("{}{COMPLETIONS_PATH}", server.uri()),
        Credential::new(TEST_KEY),
        "deepseek/deepseek-r1",
        vec![
            ChatMessage::system("You are a helpful AI assistant. Answer concisely."),
            ChatMessage::user(question),
        ],
    )
}

/// Plain-http transport; the shared client refuses non-https endpoints.
pub fn plain_transport() -> HttpTransport {
    HttpTransport::with_client(reqwest::Client::new())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    FirstContent,
    Reasoning { text: String, complete: bool },
    Answer { delta: String, full: String },
    Complete(String),
    Error(GenerationError),
}

/// Sink that records every callback into a shared log.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn answer_deltas(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Answer { delta, .. } => Some(delta),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<GenerationError> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                SinkEvent::Error(error) => Some(error),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl DeltaSink for RecordingSink {
    fn on_first_content(&mut self) {
        self.record(SinkEvent::FirstContent);
    }

    fn on_reasoning(&mut self, text: &str, complete: bool) {
        self.record(SinkEvent::Reasoning {
            text: text.to_string(),
            complete,
        });
    }

    fn on_answer(&mut self, delta: &str, full: &str) {
        self.record(SinkEvent::Answer {
            delta: delta.to_string(),
            full: full.to_string(),
        });
    }

    fn on_complete(&mut self, answer: &str) {
        self.record(SinkEvent::Complete(answer.to_string()));
    }

    fn on_error(&mut self, error: &GenerationError) {
        self.record(SinkEvent::Error(error.clone()));
    }
}
