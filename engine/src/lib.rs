//! Generation orchestration for Lumen.
//!
//! [`GenerationController`] serializes streamed generations; [`ChatSession`]
//! and [`SummaryService`] build on it to run a conversation about a page.

mod chat;
mod controller;
mod prompt;
mod request;
mod summary;
mod transcript;

#[cfg(test)]
mod test_support;

pub use chat::{ChatSession, StopHandle};
pub use controller::{GenerationController, GenerationTask};
pub use prompt::{
    EXPLAIN_MANY, EXPLAIN_ONE, MAX_QUERY_CHARS, MAX_SELECTION_CHARS, MAX_SELECTIONS,
    MAX_SYSTEM_PROMPT_CHARS, PageContext, build_system_prompt, build_user_prompt,
};
pub use request::{RequestBuildError, RequestOptions, build_request};
pub use summary::{SummaryOutcome, SummaryService, SummaryStatus};
pub use transcript::{Transcript, TranscriptError};

pub use lumen_providers::{DeltaSink, GenerationOutcome, NoopSink};
