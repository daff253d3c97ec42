//! `GenerationSession` over `HttpTransport` against a mock completion endpoint.

use std::net::TcpListener;
use std::time::Duration;

use lumen_core::{ErrorCategory, format_generation_error};
use lumen_providers::{GenerationOutcome, GenerationSession};
use lumen_types::{
    ChatMessage, Credential, GenerationError, GenerationRequest, ProviderKind, ReasoningEffort,
    SessionId, Temperature, TransportFailure,
};
use wiremock::MockServer;

use crate::common::{
    COMPLETIONS_PATH, RecordingSink, SinkEvent, TEST_KEY, content_record, mount_delayed_stream,
    mount_status, mount_stream, plain_transport, reasoning_record, request_to, sse_body,
};

const IDLE: Duration = Duration::from_secs(5);

async fn run(request: GenerationRequest, idle: Duration) -> (GenerationOutcome, RecordingSink) {
    let session = GenerationSession::new(SessionId::new(1), request, idle);
    let transport = plain_transport();
    let mut sink = RecordingSink::default();
    let outcome = session.run(&transport, &mut sink).await;
    (outcome, sink)
}

#[tokio::test]
async fn streams_reasoning_then_answer() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        sse_body(&[
            reasoning_record("weigh the options"),
            content_record("Hel"),
            content_record("lo"),
        ]),
    )
    .await;

    let (outcome, sink) = run(request_to(&server, "hi"), IDLE).await;

    assert_eq!(
        outcome,
        GenerationOutcome::Completed {
            answer: "Hello".to_string(),
            reasoning: "weigh the options".to_string(),
        }
    );
    assert_eq!(sink.answer_deltas().concat(), "Hello");
    let events = sink.events();
    assert_eq!(events.first(), Some(&SinkEvent::FirstContent));
    assert_eq!(events.last(), Some(&SinkEvent::Complete("Hello".to_string())));
    assert!(events.contains(&SinkEvent::Reasoning {
        text: "weigh the options".to_string(),
        complete: true,
    }));
    assert!(sink.errors().is_empty());
}

#[tokio::test]
async fn inline_think_tags_are_split_from_the_answer() {
    let server = MockServer::start().await;
    mount_stream(
        &server,
        sse_body(&[content_record("<think>plan it"), content_record("</think>Answer")]),
    )
    .await;

    let (outcome, _sink) = run(request_to(&server, "hi"), IDLE).await;

    assert_eq!(
        outcome,
        GenerationOutcome::Completed {
            answer: "Answer".to_string(),
            reasoning: "plan it".to_string(),
        }
    );
}

#[tokio::test]
async fn sends_streaming_chat_completion_request() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&[content_record("ok")])).await;

    let request = request_to(&server, "What is this page?")
        .with_temperature(Temperature::clamped(0.4))
        .with_reasoning_effort(ReasoningEffort::High)
        .with_referer("https://example.com");
    let (outcome, _sink) = run(request, IDLE).await;
    assert_eq!(outcome.answer(), Some("ok"));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let http = &received[0];

    let auth = http.headers.get("authorization").unwrap().to_str().unwrap();
    assert_eq!(auth, format!("Bearer {TEST_KEY}"));
    let title = http.headers.get("x-title").unwrap().to_str().unwrap();
    assert_eq!(title, "Lumen");
    let referer = http.headers.get("http-referer").unwrap().to_str().unwrap();
    assert_eq!(referer, "https://example.com");

    let body: serde_json::Value = serde_json::from_slice(&http.body).unwrap();
    assert_eq!(body["model"], "deepseek/deepseek-r1");
    assert_eq!(body["stream"], true);
    assert_eq!(body["temperature"], 0.4);
    assert_eq!(body["reasoning"]["effort"], "high");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][1]["content"], "What is this page?");
}

#[tokio::test]
async fn reasoning_field_is_omitted_without_effort() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&[content_record("ok")])).await;

    run(request_to(&server, "hi"), IDLE).await;

    let received = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&received[0].body).unwrap();
    assert!(body.get("reasoning").is_none());
    assert!(received[0].headers.get("http-referer").is_none());
}

#[tokio::test]
async fn unauthorized_response_fails_with_status() {
    let server = MockServer::start().await;
    mount_status(&server, 401, r#"{"error":{"message":"No auth credentials found"}}"#).await;

    let (outcome, sink) = run(request_to(&server, "hi"), IDLE).await;

    let GenerationOutcome::Failed(error) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(
        error,
        GenerationError::Transport(TransportFailure::Status {
            status: 401,
            body: r#"{"error":{"message":"No auth credentials found"}}"#.to_string(),
        })
    );
    assert_eq!(sink.errors(), vec![error.clone()]);
    assert_eq!(ErrorCategory::of(&error), ErrorCategory::Auth);

    let message = format_generation_error(&error, ProviderKind::OpenRouter, "deepseek/deepseek-r1");
    assert!(message.starts_with("[Stream error]"));
    assert!(message.contains("OPENROUTER_API_KEY"));
}

#[tokio::test]
async fn server_error_is_classified() {
    let server = MockServer::start().await;
    mount_status(&server, 503, "upstream unavailable").await;

    let (outcome, _sink) = run(request_to(&server, "hi"), IDLE).await;

    let GenerationOutcome::Failed(error) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert_eq!(ErrorCategory::of(&error), ErrorCategory::Server);
}

#[tokio::test]
async fn empty_stream_completes_then_reports_no_response() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&[])).await;

    let (outcome, sink) = run(request_to(&server, "hi"), IDLE).await;

    assert_eq!(outcome.answer(), Some(""));
    assert_eq!(
        sink.events(),
        vec![
            SinkEvent::Complete(String::new()),
            SinkEvent::Error(GenerationError::NoResponse),
        ]
    );
}

#[tokio::test]
async fn silent_endpoint_times_out() {
    let server = MockServer::start().await;
    mount_delayed_stream(
        &server,
        sse_body(&[content_record("too late")]),
        Duration::from_secs(3),
    )
    .await;

    let (outcome, sink) = run(request_to(&server, "hi"), Duration::from_millis(200)).await;

    assert_eq!(outcome, GenerationOutcome::Failed(GenerationError::Timeout));
    assert_eq!(sink.events(), vec![SinkEvent::Error(GenerationError::Timeout)]);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    let request = GenerationRequest::new(
        format!("http://127.0.0.1:{port}{COMPLETIONS_PATH}"),
        Credential::new(TEST_KEY),
        "deepseek/deepseek-r1",
        vec![ChatMessage::user("hi")],
    );

    let (outcome, sink) = run(request, IDLE).await;

    let GenerationOutcome::Failed(error) = outcome else {
        panic!("expected failure, got {outcome:?}");
    };
    assert!(matches!(
        error,
        GenerationError::Transport(TransportFailure::Connection(_))
    ));
    assert_eq!(ErrorCategory::of(&error), ErrorCategory::Network);
    assert_eq!(sink.errors().len(), 1);
}
