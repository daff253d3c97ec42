//! One streamed generation attempt.
//!
//! A [`GenerationSession`] opens a transport request, feeds every fragment
//! through a [`StreamDecoder`], and forwards the decoded deltas to a
//! [`DeltaSink`]. It runs an idle timer that restarts whenever a fragment
//! arrives after content has been seen, so long generations are allowed as
//! long as data keeps flowing.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──┬── transport done ──────────► Completed
//!          ├── transport error/timeout ─► Failed
//!          └── SessionHandle::abort ────► Aborted
//! ```
//!
//! The transition happens exactly once. Sink callbacks are dispatched under
//! the lifecycle lock and only while the session is `Active` (terminal
//! callbacks run under the same lock right after the transition), so once
//! [`SessionHandle::abort`] returns no further callback can fire.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lumen_types::{GenerationError, GenerationRequest, GenerationState, SessionId, TransportFailure};
use tokio::sync::Notify;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::decoder::{StreamDecoder, StructuredEvent};
use crate::transport::{ResponseCursor, Transport, TransportEvent, TransportRequest};
use crate::{build_request_body, request_headers};

/// Receiver of decoded output.
///
/// Callbacks run on the session's task while the session lock is held:
/// a sink must not call [`SessionHandle::abort`] on its own session from
/// inside a callback.
pub trait DeltaSink: Send {
    /// First non-empty delta of any channel. Fires at most once.
    fn on_first_content(&mut self) {}

    /// Cumulative reasoning text; `complete` when a thinking segment closed
    /// or the stream finished.
    fn on_reasoning(&mut self, _text: &str, _complete: bool) {}

    /// Answer delta plus the cumulative answer text.
    fn on_answer(&mut self, _delta: &str, _full: &str) {}

    /// Final answer text. Fires on every natural completion, even an empty one.
    fn on_complete(&mut self, _answer: &str) {}

    fn on_error(&mut self, _error: &GenerationError) {}
}

impl<S: DeltaSink + ?Sized> DeltaSink for Box<S> {
    fn on_first_content(&mut self) {
        (**self).on_first_content();
    }

    fn on_reasoning(&mut self, text: &str, complete: bool) {
        (**self).on_reasoning(text, complete);
    }

    fn on_answer(&mut self, delta: &str, full: &str) {
        (**self).on_answer(delta, full);
    }

    fn on_complete(&mut self, answer: &str) {
        (**self).on_complete(answer);
    }

    fn on_error(&mut self, error: &GenerationError) {
        (**self).on_error(error);
    }
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl DeltaSink for NoopSink {}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// Transport finished. `answer` may be empty (no-response case).
    Completed { answer: String, reasoning: String },
    /// Cancelled by the caller. No error callback was fired.
    Aborted,
    Failed(GenerationError),
}

impl GenerationOutcome {
    #[must_use]
    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Completed { answer, .. } => Some(answer),
            Self::Aborted | Self::Failed(_) => None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> GenerationState {
        match self {
            Self::Completed { .. } => GenerationState::Completed,
            Self::Aborted => GenerationState::Aborted,
            Self::Failed(_) => GenerationState::Failed,
        }
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    state: Mutex<GenerationState>,
    cancel: Notify,
}

impl Lifecycle {
    fn lock(&self) -> MutexGuard<'_, GenerationState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable control handle for one session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    lifecycle: Arc<Lifecycle>,
}

impl SessionHandle {
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn state(&self) -> GenerationState {
        *self.lifecycle.lock()
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.state().is_terminal()
    }

    /// Cancel the session.
    ///
    /// Returns `false` (and does nothing) if the session already reached a
    /// terminal state. Safe to call from any thread, any number of times.
    pub fn abort(&self) -> bool {
        {
            let mut state = self.lifecycle.lock();
            if state.is_terminal() {
                return false;
            }
            *state = GenerationState::Aborted;
        }
        self.lifecycle.cancel.notify_one();
        debug!(session_id = %self.id, "Generation aborted");
        true
    }
}

#[derive(Debug)]
pub struct GenerationSession {
    handle: SessionHandle,
    request: GenerationRequest,
    idle_timeout: Duration,
}

impl GenerationSession {
    #[must_use]
    pub fn new(id: SessionId, request: GenerationRequest, idle_timeout: Duration) -> Self {
        Self {
            handle: SessionHandle {
                id,
                lifecycle: Arc::default(),
            },
            request,
            idle_timeout,
        }
    }

    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.handle.id
    }

    /// Drive the session to a terminal state.
    pub async fn run<S>(self, transport: &dyn Transport, sink: &mut S) -> GenerationOutcome
    where
        S: DeltaSink + ?Sized,
    {
        let mut run = Run {
            handle: &self.handle,
            sink,
            decoder: StreamDecoder::new(),
            announced_content: false,
        };
        if !self.handle.is_active() {
            return GenerationOutcome::Aborted;
        }

        debug!(
            session_id = %self.handle.id,
            model = self.request.model(),
            messages = self.request.messages().len(),
            effort = self.request.reasoning_effort().as_str(),
            "Generation started"
        );

        let mut transport_handle = transport.open(TransportRequest {
            method: reqwest::Method::POST,
            url: self.request.endpoint().to_owned(),
            headers: request_headers(&self.request),
            body: build_request_body(&self.request).to_string(),
        });
        let mut cursor = ResponseCursor::default();
        let idle = sleep(self.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                biased;

                () = self.handle.lifecycle.cancel.notified() => {
                    transport_handle.cancel();
                    return GenerationOutcome::Aborted;
                }

                event = transport_handle.recv() => match event {
                    Some(TransportEvent::Chunk(text)) => {
                        cursor.advance(&text);
                        let events = run.decoder.feed(&text);
                        if !run.dispatch(events) {
                            transport_handle.cancel();
                            return GenerationOutcome::Aborted;
                        }
                        if run.decoder.state().has_received_any_content() {
                            idle.as_mut().reset(Instant::now() + self.idle_timeout);
                        }
                    }
                    Some(TransportEvent::Done { status, body }) => {
                        if !(200..300).contains(&status) {
                            let failure = TransportFailure::Status {
                                status,
                                body: body.unwrap_or_default(),
                            };
                            return run.fail(GenerationError::Transport(failure));
                        }
                        if let Some(body) = body {
                            let events = run.decoder.feed(cursor.unseen(&body));
                            if !run.dispatch(events) {
                                return GenerationOutcome::Aborted;
                            }
                        }
                        let events = run.decoder.finalize();
                        if !run.dispatch(events) {
                            return GenerationOutcome::Aborted;
                        }
                        return run.complete();
                    }
                    Some(TransportEvent::Error(failure)) => {
                        return run.fail(GenerationError::Transport(failure));
                    }
                    None => {
                        return run.fail(GenerationError::Transport(TransportFailure::Closed));
                    }
                },

                () = &mut idle => {
                    transport_handle.cancel();
                    return run.fail(GenerationError::Timeout);
                }
            }
        }
    }
}

/// Mutable state of one `run` call.
struct Run<'a, S: ?Sized> {
    handle: &'a SessionHandle,
    sink: &'a mut S,
    decoder: StreamDecoder,
    announced_content: bool,
}

impl<S: DeltaSink + ?Sized> Run<'_, S> {
    /// Forward decoded events. Returns `false` if the session is no longer active.
    fn dispatch(&mut self, events: Vec<StructuredEvent>) -> bool {
        let state = self.handle.lifecycle.lock();
        if state.is_terminal() {
            return false;
        }

        let stream = self.decoder.state();
        if !self.announced_content && stream.has_received_any_content() {
            self.announced_content = true;
            self.sink.on_first_content();
        }
        for event in events {
            match event {
                StructuredEvent::Reasoning { complete, end, .. } => {
                    self.sink.on_reasoning(stream.reasoning_until(end), complete);
                }
                StructuredEvent::Answer { delta, end } => {
                    self.sink.on_answer(&delta, stream.answer_until(end));
                }
                StructuredEvent::Ignored => {}
            }
        }
        drop(state);
        true
    }

    fn complete(self) -> GenerationOutcome {
        let mut state = self.handle.lifecycle.lock();
        if state.is_terminal() {
            return GenerationOutcome::Aborted;
        }
        *state = GenerationState::Completed;

        let stream = self.decoder.state();
        if !stream.reasoning().is_empty() {
            self.sink.on_reasoning(stream.reasoning(), true);
        }
        self.sink.on_complete(stream.answer());
        if !stream.has_received_any_content() {
            self.sink.on_error(&GenerationError::NoResponse);
        }
        drop(state);

        debug!(
            session_id = %self.handle.id,
            answer_bytes = stream.answer().len(),
            reasoning_bytes = stream.reasoning().len(),
            skipped_records = self.decoder.parse_errors(),
            "Generation completed"
        );
        if !stream.has_received_any_content() {
            warn!(session_id = %self.handle.id, "Stream completed without content");
        }
        GenerationOutcome::Completed {
            answer: stream.answer().to_owned(),
            reasoning: stream.reasoning().to_owned(),
        }
    }

    fn fail(self, error: GenerationError) -> GenerationOutcome {
        let mut state = self.handle.lifecycle.lock();
        if state.is_terminal() {
            return GenerationOutcome::Aborted;
        }
        *state = GenerationState::Failed;
        self.sink.on_error(&error);
        drop(state);

        warn!(session_id = %self.handle.id, %error, "Generation failed");
        GenerationOutcome::Failed(error)
    }
}
