//! Scripted transports shared by the engine's unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lumen_config::Settings;
use lumen_providers::{
    DeltaSink, Transport, TransportEvent, TransportHandle, TransportRequest,
};
use lumen_types::{Credential, GenerationError};
use tokio::sync::mpsc;

use crate::GenerationController;

pub type Opened = (TransportRequest, mpsc::Sender<TransportEvent>);

/// Hands every opened request's event sender to the test.
pub struct ChannelTransport {
    opened: mpsc::UnboundedSender<Opened>,
}

impl Transport for ChannelTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        let (tx, rx) = mpsc::channel(16);
        let _ = self.opened.send((request, tx));
        TransportHandle::from_receiver(rx)
    }
}

pub fn channel_controller() -> (GenerationController, mpsc::UnboundedReceiver<Opened>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let transport = Arc::new(ChannelTransport { opened: tx });
    (
        GenerationController::new(transport, Duration::from_secs(60)),
        rx,
    )
}

/// Answers each request with the next scripted event list.
#[derive(Default)]
pub struct ReplyTransport {
    replies: Mutex<VecDeque<Vec<TransportEvent>>>,
    requests: Mutex<Vec<TransportRequest>>,
}

impl ReplyTransport {
    pub fn new(replies: Vec<Vec<TransportEvent>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<serde_json::Value> {
        self.requests()
            .iter()
            .map(|r| serde_json::from_str(&r.body).unwrap())
            .collect()
    }
}

impl Transport for ReplyTransport {
    fn open(&self, request: TransportRequest) -> TransportHandle {
        self.requests.lock().unwrap().push(request);
        let events = self.replies.lock().unwrap().pop_front().unwrap_or_default();
        let (tx, rx) = mpsc::channel(events.len().max(1));
        for event in events {
            tx.try_send(event).unwrap();
        }
        TransportHandle::from_receiver(rx)
    }
}

pub fn content(text: &str) -> TransportEvent {
    TransportEvent::Chunk(format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    ))
}

pub fn done() -> TransportEvent {
    TransportEvent::Done {
        status: 200,
        body: None,
    }
}

pub fn answer(text: &str) -> Vec<TransportEvent> {
    vec![content(text), done()]
}

pub fn model_of(request: &TransportRequest) -> String {
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    body["model"].as_str().unwrap().to_string()
}

pub fn settings_with_key() -> Settings {
    let mut settings = Settings::resolve_with(None, |_| None);
    settings.provider.api_key = Some(Credential::new("sk-or-v1-abcdef0123"));
    settings
}

#[derive(Clone, Default)]
pub struct SharedLog(Arc<Mutex<Vec<String>>>);

impl SharedLog {
    pub fn sink(&self, label: &'static str) -> LabelledSink {
        LabelledSink {
            label,
            log: self.clone(),
        }
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

pub struct LabelledSink {
    label: &'static str,
    log: SharedLog,
}

impl LabelledSink {
    fn push(&self, entry: String) {
        self.log
            .0
            .lock()
            .unwrap()
            .push(format!("{}:{entry}", self.label));
    }
}

impl DeltaSink for LabelledSink {
    fn on_answer(&mut self, delta: &str, _full: &str) {
        self.push(format!("answer({delta})"));
    }

    fn on_complete(&mut self, answer: &str) {
        self.push(format!("complete({answer})"));
    }

    fn on_error(&mut self, error: &GenerationError) {
        self.push(format!("error({error})"));
    }
}
