//! reqwest-backed [`Transport`].

use futures_util::StreamExt;
use futures_util::future::{AbortHandle, Abortable};
use lumen_types::TransportFailure;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::transport::{
    EVENT_CHANNEL_CAPACITY, Transport, TransportEvent, TransportHandle, TransportRequest,
};
use crate::{MAX_ERROR_BODY_BYTES, http_client};

/// Streams responses through a shared [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Transport over the hardened process-wide client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: http_client().clone(),
        }
    }

    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (abort_handle, registration) = AbortHandle::new_pair();
        let client = self.client.clone();
        tokio::spawn(Abortable::new(
            stream_response(client, request, tx),
            registration,
        ));
        TransportHandle::new(rx, move || abort_handle.abort())
    }
}

async fn stream_response(
    client: reqwest::Client,
    request: TransportRequest,
    tx: mpsc::Sender<TransportEvent>,
) {
    let mut builder = client.request(request.method, &request.url);
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }

    let response = match builder.body(request.body).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(%e, "Request failed before response");
            let failure = TransportFailure::Connection(e.to_string());
            let _ = tx.send(TransportEvent::Error(failure)).await;
            return;
        }
    };

    let status = response.status();
    if !status.is_success() {
        let body = read_capped_error_body(response).await;
        debug!(status = status.as_u16(), body_bytes = body.len(), "Non-success response");
        let failure = TransportFailure::Status {
            status: status.as_u16(),
            body,
        };
        let _ = tx.send(TransportEvent::Error(failure)).await;
        return;
    }

    let mut stream = response.bytes_stream();
    let mut utf8 = Utf8Carry::default();
    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                let text = utf8.push(&bytes);
                if !text.is_empty() && tx.send(TransportEvent::Chunk(text)).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!(%e, "Response stream failed");
                let failure = TransportFailure::Connection(e.to_string());
                let _ = tx.send(TransportEvent::Error(failure)).await;
                return;
            }
        }
    }

    let tail = utf8.finish();
    if !tail.is_empty() && tx.send(TransportEvent::Chunk(tail)).await.is_err() {
        return;
    }
    let _ = tx
        .send(TransportEvent::Done {
            status: status.as_u16(),
            body: None,
        })
        .await;
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

/// Incremental UTF-8 decoding across network chunk boundaries.
#[derive(Debug, Default)]
struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    /// Decode as much of the buffered bytes as possible.
    ///
    /// An incomplete trailing sequence stays buffered; invalid bytes are
    /// replaced with U+FFFD.
    fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        match std::str::from_utf8(&self.pending) {
            Ok(text) => {
                let text = text.to_owned();
                self.pending.clear();
                text
            }
            Err(e) if e.error_len().is_none() => {
                let valid = e.valid_up_to();
                let text = String::from_utf8_lossy(&self.pending[..valid]).into_owned();
                self.pending.drain(..valid);
                text
            }
            Err(_) => {
                let text = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                text
            }
        }
    }

    fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}
