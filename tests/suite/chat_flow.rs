//! End-to-end chat flow: config file, page summary, follow-ups and regeneration.

use std::collections::VecDeque;
use std::fs;
use std::sync::{Arc, Mutex};

use lumen_config::{LumenConfig, Settings};
use lumen_context::PageSnapshot;
use lumen_core::ProviderValidationError;
use lumen_engine::{ChatSession, RequestBuildError};
use lumen_providers::{Transport, TransportEvent, TransportHandle, TransportRequest};
use lumen_types::Role;
use tokio::sync::mpsc;

use crate::common::{RecordingSink, content_record, sse_body};

const CONFIG: &str = r#"
[provider]
api_key = "sk-or-v1-abcdef012345"

[chat]
model = "deepseek/deepseek-r1"
thinking_level = "low"

[summary]
enabled = true
model = "google/gemini-2.0-flash-exp:free"
"#;

/// Replies to each request with the next scripted answer.
#[derive(Default)]
struct ScriptedTransport {
    answers: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ScriptedTransport {
    fn new(answers: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            answers: Mutex::new(answers.iter().map(|a| (*a).to_string()).collect()),
            requests: Mutex::default(),
        })
    }

    fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|request| serde_json::from_str(&request.body).unwrap())
            .collect()
    }

    fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        self.requests.lock().unwrap().push(request);
        let answer = self.answers.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(4);
        tx.try_send(TransportEvent::Chunk(sse_body(&[content_record(&answer)])))
            .unwrap();
        tx.try_send(TransportEvent::Done {
            status: 200,
            body: None,
        })
        .unwrap();
        TransportHandle::from_receiver(rx)
    }
}

fn settings_from_file() -> Settings {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, CONFIG).unwrap();
    let config = LumenConfig::load_from(&path).unwrap();
    assert!(config.is_some());
    Settings::resolve_with(config.as_ref(), |_| None)
}

#[tokio::test]
async fn page_question_uses_summary_then_reuses_it() {
    let transport = ScriptedTransport::new(&[
        "A tutorial about ownership.",
        "Ownership moves values.",
        "Borrowing lends them.",
        "Values have one owner.",
    ]);
    let mut chat = ChatSession::new(settings_from_file(), transport.clone());
    let page = PageSnapshot::new(
        "https://example.com/rust?token=s3cr3t",
        "Ownership is Rust's most unique feature. ".repeat(20),
    );

    let outcome = chat
        .send(
            "What is this about?",
            &["each value has an owner"],
            Some(&page),
            RecordingSink::default(),
        )
        .await
        .unwrap();
    assert_eq!(outcome.answer(), Some("Ownership moves values."));

    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 2);
    assert_eq!(bodies[0]["model"], "google/gemini-2.0-flash-exp:free");
    assert!(bodies[0].get("reasoning").is_none());
    assert_eq!(bodies[1]["model"], "deepseek/deepseek-r1");
    assert_eq!(bodies[1]["reasoning"]["effort"], "low");

    let system = bodies[1]["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("[Page Summary]"));
    assert!(system.contains("A tutorial about ownership."));
    assert!(!system.contains("s3cr3t"));
    let user = bodies[1]["messages"][1]["content"].as_str().unwrap();
    assert!(user.contains("each value has an owner"));
    assert!(user.ends_with("User Question: What is this about?"));

    for request in transport.requests() {
        let referer = request.header("HTTP-Referer").unwrap_or_default();
        assert!(!referer.contains("s3cr3t"));
    }

    let sink = RecordingSink::default();
    let outcome = chat
        .send("And borrowing?", &[] as &[&str], Some(&page), sink.clone())
        .await
        .unwrap();
    assert_eq!(outcome.answer(), Some("Borrowing lends them."));
    assert_eq!(sink.answer_deltas().concat(), "Borrowing lends them.");
    // Cached summary: only the chat request went out.
    let bodies = transport.bodies();
    assert_eq!(bodies.len(), 3);
    let follow_up = &bodies[2]["messages"];
    assert_eq!(follow_up.as_array().unwrap().len(), 4);
    assert_eq!(follow_up[2]["content"], "Ownership moves values.");

    let outcome = chat
        .regenerate_last(Some("openai/gpt-4o"), RecordingSink::default())
        .await
        .unwrap();
    assert_eq!(outcome.answer(), Some("Values have one owner."));
    let bodies = transport.bodies();
    assert_eq!(bodies[3]["model"], "openai/gpt-4o");
    assert_eq!(bodies[3]["messages"].as_array().unwrap().len(), 4);

    let messages = chat.transcript().messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[3].role(), Role::Assistant);
    assert_eq!(messages[3].content(), "Values have one owner.");
}

#[tokio::test]
async fn cleared_context_is_not_sent() {
    let transport = ScriptedTransport::new(&["first", "second"]);
    let mut chat = ChatSession::new(settings_from_file(), transport.clone());

    chat.send("one", &[] as &[&str], None, RecordingSink::default())
        .await
        .unwrap();
    chat.clear_context();
    chat.send("two", &[] as &[&str], None, RecordingSink::default())
        .await
        .unwrap();

    let bodies = transport.bodies();
    let messages = bodies[1]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], "User Question: two");
    assert_eq!(chat.transcript().messages().len(), 4);
}

#[tokio::test]
async fn missing_credential_fails_before_any_request() {
    let transport = ScriptedTransport::new(&["unused"]);
    let mut chat = ChatSession::new(Settings::resolve_with(None, |_| None), transport.clone());

    let result = chat
        .send("hello", &[] as &[&str], None, RecordingSink::default())
        .await;

    assert_eq!(
        result,
        Err(RequestBuildError::Provider(ProviderValidationError::NoApiKey))
    );
    assert!(transport.requests().is_empty());
    assert!(chat.transcript().is_empty());
}
