//! `GenerationController` serialization over a real HTTP transport.

use std::sync::Arc;
use std::time::Duration;

use lumen_engine::GenerationController;
use lumen_providers::GenerationOutcome;
use wiremock::MockServer;

use crate::common::{
    RecordingSink, content_record, mount_delayed_stream, mount_stream, plain_transport,
    request_to, sse_body,
};

fn controller() -> GenerationController {
    GenerationController::new(Arc::new(plain_transport()), Duration::from_secs(5))
}

#[tokio::test]
async fn newer_start_supersedes_the_running_generation() {
    let server = MockServer::start().await;
    mount_delayed_stream(
        &server,
        sse_body(&[content_record("answer")]),
        Duration::from_millis(300),
    )
    .await;
    let controller = controller();

    let first_sink = RecordingSink::default();
    let second_sink = RecordingSink::default();
    let first = controller.start(request_to(&server, "one"), first_sink.clone());
    let second = controller.start(request_to(&server, "two"), second_sink.clone());
    assert!(first.id() < second.id());

    assert_eq!(first.outcome().await, GenerationOutcome::Aborted);
    assert_eq!(second.outcome().await.answer(), Some("answer"));
    assert!(first_sink.events().is_empty());
    assert_eq!(second_sink.answer_deltas().concat(), "answer");
    assert!(!controller.is_generating());
}

#[tokio::test]
async fn abort_stops_an_in_flight_request_silently() {
    let server = MockServer::start().await;
    mount_delayed_stream(
        &server,
        sse_body(&[content_record("never seen")]),
        Duration::from_secs(2),
    )
    .await;
    let controller = controller();
    let sink = RecordingSink::default();

    let task = controller.start(request_to(&server, "slow"), sink.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(controller.is_generating());
    assert!(controller.abort());
    assert!(!controller.abort());

    assert_eq!(task.outcome().await, GenerationOutcome::Aborted);
    assert!(sink.events().is_empty());
    assert!(!controller.is_generating());
}

#[tokio::test]
async fn sequential_generations_each_complete() {
    let server = MockServer::start().await;
    mount_stream(&server, sse_body(&[content_record("same")])).await;
    let controller = controller();

    for question in ["first", "second"] {
        let outcome = controller
            .start(request_to(&server, question), RecordingSink::default())
            .outcome()
            .await;
        assert_eq!(outcome.answer(), Some("same"));
    }

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 2);
    assert!(controller.current_id().is_none());
}
