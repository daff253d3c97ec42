//! Prompt assembly for chat requests.

use std::fmt::Write;

use lumen_types::sanitize_input;

pub const MAX_SYSTEM_PROMPT_CHARS: usize = 5000;
pub const MAX_QUERY_CHARS: usize = 1000;
pub const MAX_SELECTION_CHARS: usize = 2000;
pub const MAX_SELECTIONS: usize = 5;

pub const EXPLAIN_ONE: &str = "Please explain this content:";
pub const EXPLAIN_MANY: &str = "Please explain these contents:";

/// What the model is told about the current page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContext {
    Summary(String),
    Content(String),
}

impl PageContext {
    #[must_use]
    pub fn is_summary(&self) -> bool {
        matches!(self, Self::Summary(_))
    }
}

impl std::fmt::Display for PageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Summary(text) => write!(f, "[Page Summary]:\n{text}"),
            Self::Content(text) => write!(f, "[Page Content]:\n{text}"),
        }
    }
}

/// Configured system prompt followed by the page context block, if any.
#[must_use]
pub fn build_system_prompt(configured: &str, page: Option<(&str, &PageContext)>) -> String {
    let mut prompt = sanitize_input(configured, MAX_SYSTEM_PROMPT_CHARS);
    if let Some((redacted_url, context)) = page {
        let _ = write!(prompt, "\n\nContext:\nURL: {redacted_url}\n{context}");
    }
    prompt
}

/// User turn: quoted selections (at most [`MAX_SELECTIONS`]) then the question.
///
/// Returns `None` when there is neither a question nor a selection.
#[must_use]
pub fn build_user_prompt<S: AsRef<str>>(query: &str, selections: &[S]) -> Option<String> {
    let selections = &selections[..selections.len().min(MAX_SELECTIONS)];
    let mut query = sanitize_input(query, MAX_QUERY_CHARS);
    if query.is_empty() {
        query = match selections.len() {
            0 => return None,
            1 => EXPLAIN_ONE.to_string(),
            _ => EXPLAIN_MANY.to_string(),
        };
    }

    let mut prompt = String::new();
    if !selections.is_empty() {
        prompt.push_str("=== Selected Contents ===\n");
        for (i, selection) in selections.iter().enumerate() {
            let text = sanitize_input(selection.as_ref(), MAX_SELECTION_CHARS);
            let _ = write!(prompt, "[Block {}]:\n\"\"\"{text}\"\"\"\n\n", i + 1);
        }
        prompt.push_str("=========================\n");
    }
    let _ = write!(prompt, "User Question: {query}");
    Some(prompt)
}
