//! Terminal rendering of a streamed generation.

use std::io::{Write, stdout};

use lumen_core::{format_generation_error, sanitize_terminal_text};
use lumen_engine::DeltaSink;
use lumen_types::{GenerationError, ProviderKind};

const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

/// Streams reasoning (dimmed) and answer text to stdout, errors to stderr.
#[derive(Debug)]
pub struct TerminalSink {
    kind: ProviderKind,
    model: String,
    reasoning_shown: usize,
    reasoning_closed: bool,
    color: bool,
}

impl TerminalSink {
    pub fn new(kind: ProviderKind, model: impl Into<String>, color: bool) -> Self {
        Self {
            kind,
            model: model.into(),
            reasoning_shown: 0,
            reasoning_closed: false,
            color,
        }
    }

    fn write(&self, text: &str) {
        let mut out = stdout().lock();
        let _ = out.write_all(sanitize_terminal_text(text).as_bytes());
        let _ = out.flush();
    }

    fn close_reasoning(&mut self) {
        if self.reasoning_shown > 0 && !self.reasoning_closed {
            self.reasoning_closed = true;
            let end = if self.color { RESET } else { "" };
            let mut out = stdout().lock();
            let _ = write!(out, "{end}\n\n");
            let _ = out.flush();
        }
    }
}

impl DeltaSink for TerminalSink {
    fn on_reasoning(&mut self, text: &str, complete: bool) {
        if let Some(fresh) = text.get(self.reasoning_shown..)
            && !fresh.is_empty()
        {
            let reopening = self.reasoning_shown == 0 || self.reasoning_closed;
            if reopening && self.color {
                let _ = stdout().lock().write_all(DIM.as_bytes());
            }
            self.reasoning_closed = false;
            self.write(fresh);
            self.reasoning_shown = text.len();
        }
        if complete {
            self.close_reasoning();
        }
    }

    fn on_answer(&mut self, delta: &str, _full: &str) {
        self.close_reasoning();
        self.write(delta);
    }

    fn on_complete(&mut self, _answer: &str) {
        self.close_reasoning();
        self.write("\n");
    }

    fn on_error(&mut self, error: &GenerationError) {
        self.close_reasoning();
        let message = format_generation_error(error, self.kind, &self.model);
        eprintln!("\n{message}");
    }
}
