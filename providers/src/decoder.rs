//! Incremental decoder for streamed chat-completion responses.
//!
//! The transport delivers arbitrary text fragments whose boundaries do not
//! line up with records. [`StreamDecoder::feed`] carries incomplete lines
//! across calls, parses each complete `data:` line as a
//! [`ChatCompletionChunk`], and splits its delta into two channels:
//!
//! - reasoning, from the dedicated reasoning fields or from answer text
//!   enclosed in inline `<think>` … `</think>` markers
//! - answer, everything else
//!
//! Both channels accumulate into append-only buffers owned by
//! [`StreamState`]. Emitted events carry the delta plus the buffer length
//! after it was appended, so a consumer can hand out the cumulative view
//! without copying.
//!
//! The decoder performs no I/O and never fails: malformed records are
//! counted, logged and skipped.

use tracing::{debug, warn};

use crate::sse_types::ChatCompletionChunk;

/// Event-data line prefix.
const DATA_PREFIX: &str = "data:";
/// Payload of the termination line.
const DONE_SENTINEL: &str = "[DONE]";

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// An incomplete line longer than this is dropped.
const MAX_LINE_CARRY_BYTES: usize = 4 * 1024 * 1024;

/// One decoded unit of output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructuredEvent {
    /// Text appended to the reasoning buffer.
    ///
    /// `end` is the reasoning buffer length (bytes) once `delta` is appended.
    /// `complete` is set when a closing inline marker ended the segment.
    Reasoning {
        delta: String,
        complete: bool,
        end: usize,
    },
    /// Text appended to the answer buffer; `end` as for `Reasoning`.
    Answer { delta: String, end: usize },
    /// A data record that contributed nothing.
    Ignored,
}

impl StructuredEvent {
    #[must_use]
    pub fn carries_text(&self) -> bool {
        match self {
            Self::Reasoning { delta, .. } | Self::Answer { delta, .. } => !delta.is_empty(),
            Self::Ignored => false,
        }
    }
}

/// Accumulated output of one session.
///
/// Both buffers only grow. `inside_thinking_tag` toggles only on recognised
/// markers, and `has_received_any_content` never reverts once set.
#[derive(Debug, Clone, Default)]
pub struct StreamState {
    reasoning: String,
    answer: String,
    inside_thinking_tag: bool,
    has_received_any_content: bool,
}

impl StreamState {
    #[must_use]
    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        &self.answer
    }

    #[must_use]
    pub const fn inside_thinking_tag(&self) -> bool {
        self.inside_thinking_tag
    }

    #[must_use]
    pub const fn has_received_any_content(&self) -> bool {
        self.has_received_any_content
    }

    /// Reasoning buffer as it was when an event with this `end` was emitted.
    #[must_use]
    pub fn reasoning_until(&self, end: usize) -> &str {
        self.reasoning.get(..end).unwrap_or(&self.reasoning)
    }

    /// Answer buffer as it was when an event with this `end` was emitted.
    #[must_use]
    pub fn answer_until(&self, end: usize) -> &str {
        self.answer.get(..end).unwrap_or(&self.answer)
    }

    fn append_reasoning(&mut self, text: &str, complete: bool, out: &mut Vec<StructuredEvent>) {
        if text.is_empty() && !complete {
            return;
        }
        self.reasoning.push_str(text);
        self.has_received_any_content |= !text.is_empty();
        out.push(StructuredEvent::Reasoning {
            delta: text.to_owned(),
            complete,
            end: self.reasoning.len(),
        });
    }

    fn append_answer(&mut self, text: &str, out: &mut Vec<StructuredEvent>) {
        if text.is_empty() {
            return;
        }
        self.answer.push_str(text);
        self.has_received_any_content = true;
        out.push(StructuredEvent::Answer {
            delta: text.to_owned(),
            end: self.answer.len(),
        });
    }
}

#[derive(Debug, Default)]
pub struct StreamDecoder {
    state: StreamState,
    /// Unterminated trailing line from the previous fragment.
    line_carry: String,
    /// Trailing answer text that may be the start of a split marker.
    marker_carry: String,
    done: bool,
    finalized: bool,
    parse_errors: usize,
}

impl StreamDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &StreamState {
        &self.state
    }

    /// Whether the termination sentinel has been seen.
    #[must_use]
    pub const fn is_done(&self) -> bool {
        self.done
    }

    /// Number of records skipped because they were not valid JSON.
    #[must_use]
    pub const fn parse_errors(&self) -> usize {
        self.parse_errors
    }

    /// Consume one raw fragment and return the events of every line it completed.
    pub fn feed(&mut self, fragment: &str) -> Vec<StructuredEvent> {
        let mut events = Vec::new();
        if self.done || self.finalized {
            return events;
        }

        self.line_carry.push_str(fragment);
        while let Some(newline) = self.line_carry.find('\n') {
            let line: String = self.line_carry.drain(..=newline).collect();
            self.process_line(&line[..newline], &mut events);
            if self.done {
                self.line_carry.clear();
                return events;
            }
        }

        if self.line_carry.len() > MAX_LINE_CARRY_BYTES {
            self.parse_errors = self.parse_errors.saturating_add(1);
            warn!(
                carry_bytes = self.line_carry.len(),
                "Dropping oversized unterminated stream line"
            );
            self.line_carry.clear();
        }
        events
    }

    /// Flush the trailing partial line and any held-back marker prefix.
    ///
    /// Later calls to `feed` or `finalize` return nothing.
    pub fn finalize(&mut self) -> Vec<StructuredEvent> {
        let mut events = Vec::new();
        if self.finalized {
            return events;
        }
        self.finalized = true;

        if !self.done && !self.line_carry.is_empty() {
            let line = std::mem::take(&mut self.line_carry);
            self.process_line(&line, &mut events);
        }

        let held = std::mem::take(&mut self.marker_carry);
        if self.state.inside_thinking_tag {
            self.state.append_reasoning(&held, false, &mut events);
        } else {
            self.state.append_answer(&held, &mut events);
        }

        if self.parse_errors > 0 {
            debug!(parse_errors = self.parse_errors, "Stream finished with skipped records");
        }
        events
    }

    fn process_line(&mut self, line: &str, events: &mut Vec<StructuredEvent>) {
        let line = line.strip_suffix('\r').unwrap_or(line);
        let Some(rest) = line.strip_prefix(DATA_PREFIX) else {
            return;
        };
        let payload = rest.strip_prefix(' ').unwrap_or(rest);

        if payload == DONE_SENTINEL {
            self.done = true;
            return;
        }

        let chunk = match serde_json::from_str::<ChatCompletionChunk>(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                self.parse_errors = self.parse_errors.saturating_add(1);
                warn!(%e, payload_bytes = payload.len(), "Invalid stream record skipped");
                events.push(StructuredEvent::Ignored);
                return;
            }
        };

        let Some(delta) = chunk.first_delta() else {
            debug!(payload_bytes = payload.len(), "Stream record without delta");
            events.push(StructuredEvent::Ignored);
            return;
        };

        let before = events.len();
        if let Some(reasoning) = delta.reasoning_text() {
            self.state.append_reasoning(&reasoning, false, events);
        }
        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            self.route_content(content, events);
        }
        if events.len() == before {
            events.push(StructuredEvent::Ignored);
        }
    }

    /// Split answer-channel text on inline markers.
    fn route_content(&mut self, content: &str, events: &mut Vec<StructuredEvent>) {
        let mut pending = std::mem::take(&mut self.marker_carry);
        pending.push_str(content);
        let mut rest = pending.as_str();

        loop {
            if self.state.inside_thinking_tag {
                if let Some(idx) = rest.find(THINK_CLOSE) {
                    self.state.append_reasoning(&rest[..idx], true, events);
                    self.state.inside_thinking_tag = false;
                    rest = &rest[idx + THINK_CLOSE.len()..];
                    continue;
                }
                let keep = partial_marker_len(rest, &[THINK_CLOSE]);
                let (emit, held) = rest.split_at(rest.len() - keep);
                self.state.append_reasoning(emit, false, events);
                self.marker_carry = held.to_owned();
                return;
            }

            let close = rest.find(THINK_CLOSE);
            let open = rest
                .find(THINK_OPEN)
                .filter(|open| close.is_none_or(|close| *open < close));
            match (open, close) {
                (Some(open), _) => {
                    self.state.append_answer(&rest[..open], events);
                    self.state.inside_thinking_tag = true;
                    rest = &rest[open + THINK_OPEN.len()..];
                }
                (_, Some(close)) => {
                    // Closing marker without an opener: the text before it was reasoning.
                    self.state.append_reasoning(&rest[..close], true, events);
                    rest = &rest[close + THINK_CLOSE.len()..];
                }
                (None, None) => {
                    let keep = partial_marker_len(rest, &[THINK_OPEN, THINK_CLOSE]);
                    let (emit, held) = rest.split_at(rest.len() - keep);
                    self.state.append_answer(emit, events);
                    self.marker_carry = held.to_owned();
                    return;
                }
            }
        }
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of a marker.
fn partial_marker_len(text: &str, markers: &[&str]) -> usize {
    markers
        .iter()
        .filter_map(|marker| {
            (1..marker.len())
                .rev()
                .find(|&n| text.ends_with(&marker[..n]))
        })
        .max()
        .unwrap_or(0)
}
