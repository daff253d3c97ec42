//! Conversation history owned by the chat layer.

use lumen_types::{ChatMessage, Role};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscriptError {
    #[error("no message at index {index} (transcript has {len})")]
    OutOfRange { index: usize, len: usize },
    #[error("message {index} is a {role} message, not an assistant answer")]
    NotAnAnswer { index: usize, role: &'static str },
    #[error("no assistant answer to regenerate")]
    NoAnswer,
}

/// Append-only message list capped at `max_history` entries.
///
/// Messages before the context cutoff stay visible in the history but are not
/// sent with the next request. Trimming the oldest entries shifts the cutoff
/// with them.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    context_start: usize,
    max_history: usize,
}

impl Transcript {
    #[must_use]
    pub fn new(max_history: usize) -> Self {
        Self {
            messages: Vec::new(),
            context_start: 0,
            max_history: max_history.max(1),
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
        self.trim();
    }

    fn trim(&mut self) {
        let excess = self.messages.len().saturating_sub(self.max_history);
        if excess == 0 {
            return;
        }
        self.messages.drain(..excess);
        self.context_start = self.context_start.saturating_sub(excess);
    }

    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Messages sent with the next request.
    #[must_use]
    pub fn context(&self) -> &[ChatMessage] {
        &self.messages[self.context_start.min(self.messages.len())..]
    }

    #[must_use]
    pub fn context_start(&self) -> usize {
        self.context_start
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    #[must_use]
    pub fn last_answer_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| m.role() == Role::Assistant)
    }

    /// Hide everything so far from the next request.
    pub fn clear_context(&mut self) {
        self.context_start = self.messages.len();
    }

    pub fn restore_context(&mut self) {
        self.context_start = 0;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.context_start = 0;
    }

    /// Remove the assistant answer at `index` and everything after it.
    ///
    /// The user turn that prompted the answer stays, and is pulled back into
    /// the sent context if a cutoff had hidden it.
    pub fn truncate_at_answer(&mut self, index: usize) -> Result<ChatMessage, TranscriptError> {
        let len = self.messages.len();
        let message = self
            .messages
            .get(index)
            .ok_or(TranscriptError::OutOfRange { index, len })?;
        if message.role() != Role::Assistant {
            return Err(TranscriptError::NotAnAnswer {
                index,
                role: message.role().as_str(),
            });
        }

        let removed = self.messages.drain(index..).next();
        let anchor = index.saturating_sub(1);
        if self.context_start > anchor {
            self.context_start = anchor;
        }
        removed.ok_or(TranscriptError::OutOfRange { index, len })
    }
}
