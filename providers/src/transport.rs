//! Injected transport capability.
//!
//! A [`Transport`] opens one streamed request and reports progress as
//! [`TransportEvent`]s on a channel. The session never talks HTTP directly,
//! which keeps it testable against scripted transports.

use lumen_types::TransportFailure;
use tokio::sync::mpsc;

/// Capacity of the per-request event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: reqwest::Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl TransportRequest {
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// New response text, in arrival order.
    Chunk(String),
    /// Response finished.
    ///
    /// Transports that only deliver the whole response at the end put it in
    /// `body`; only the part not already seen as chunks is decoded.
    Done { status: u16, body: Option<String> },
    /// Connection-level failure. Terminal.
    Error(TransportFailure),
}

/// Live request. Dropping the handle cancels the request.
pub struct TransportHandle {
    events: mpsc::Receiver<TransportEvent>,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl TransportHandle {
    pub fn new(
        events: mpsc::Receiver<TransportEvent>,
        cancel: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Handle whose request stops once the receiver is dropped.
    #[must_use]
    pub fn from_receiver(events: mpsc::Receiver<TransportEvent>) -> Self {
        Self {
            events,
            cancel: None,
        }
    }

    /// Next event; `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<TransportEvent> {
        self.events.recv().await
    }

    /// Stop the request. Idempotent.
    pub fn cancel(&mut self) {
        self.events.close();
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for TransportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportHandle")
            .field("cancelled", &self.cancel.is_none())
            .finish_non_exhaustive()
    }
}

pub trait Transport: Send + Sync {
    /// Start `request`. Must be called from within a Tokio runtime.
    fn open(&self, request: TransportRequest) -> TransportHandle;
}

/// Tracks how much response text has been observed.
///
/// Lets the session treat "new fragment" as "suffix since the last observed
/// length", whichever way the transport reports text.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResponseCursor {
    observed: usize,
}

impl ResponseCursor {
    pub fn advance(&mut self, chunk: &str) {
        self.observed += chunk.len();
    }

    /// The part of the full response text not yet observed.
    pub fn unseen<'a>(&mut self, full: &'a str) -> &'a str {
        let suffix = full.get(self.observed..).unwrap_or("");
        self.observed = self.observed.max(full.len());
        suffix
    }

    #[must_use]
    pub const fn observed(&self) -> usize {
        self.observed
    }
}
