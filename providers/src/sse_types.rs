//! Typed records of the chat-completion event stream.
//!
//! Parse errors happen at the serde boundary, not scattered through the
//! decoder. Every field is optional: providers omit what they do not send.

use serde::Deserialize;
use serde_json::Value;

/// One `data:` record of a streamed chat completion.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

impl ChatCompletionChunk {
    /// The delta of the first choice, if the record carries one.
    #[must_use]
    pub fn first_delta(&self) -> Option<&Delta> {
        self.choices.first().and_then(|choice| choice.delta.as_ref())
    }
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub delta: Option<Delta>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    /// DeepSeek-style reasoning channel.
    #[serde(default)]
    pub reasoning_content: Option<String>,
    /// OpenRouter-style reasoning channel.
    #[serde(default)]
    pub reasoning: Option<String>,
    /// Kept untyped so one malformed detail cannot discard the whole record.
    #[serde(default)]
    pub reasoning_details: Option<Value>,
}

impl Delta {
    /// Reasoning text carried by this delta.
    ///
    /// Exactly one shape is honoured, in priority order: `reasoning_content`,
    /// `reasoning`, then `reasoning_details`. Empty strings fall through.
    #[must_use]
    pub fn reasoning_text(&self) -> Option<String> {
        if let Some(text) = self.reasoning_content.as_deref().filter(|s| !s.is_empty()) {
            return Some(text.to_owned());
        }
        if let Some(text) = self.reasoning.as_deref().filter(|s| !s.is_empty()) {
            return Some(text.to_owned());
        }
        let details = self.reasoning_details.as_ref()?.as_array()?;
        let joined: String = details
            .iter()
            .filter_map(|detail| ReasoningDetail::deserialize(detail).ok())
            .filter_map(ReasoningDetail::into_text)
            .collect();
        (!joined.is_empty()).then_some(joined)
    }
}

/// Typed reasoning fragment, tagged by its `type` field.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ReasoningDetail {
    #[serde(rename = "reasoning.text")]
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "reasoning.summary")]
    Summary {
        #[serde(default)]
        summary: Option<String>,
    },
    /// Encrypted or unknown detail types contribute nothing.
    #[serde(other)]
    Unknown,
}

impl ReasoningDetail {
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text { text } => text,
            Self::Summary { summary } => summary,
            Self::Unknown => None,
        }
    }
}
