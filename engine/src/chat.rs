//! Chat orchestration: prompt, summary, transcript and generation in one place.

use std::sync::Arc;

use lumen_config::Settings;
use lumen_context::{DEFAULT_PAGE_CONTENT_CHARS, PageSnapshot};
use lumen_providers::{DeltaSink, GenerationOutcome, NoopSink, Transport};
use lumen_types::{ChatMessage, GenerationRequest};
use tracing::{debug, info};

use crate::controller::GenerationController;
use crate::prompt::{PageContext, build_system_prompt, build_user_prompt};
use crate::request::{RequestBuildError, RequestOptions, build_request};
use crate::summary::{SummaryOutcome, SummaryService};
use crate::transcript::{Transcript, TranscriptError};

/// Stops chat and summary generations from outside the session's owner.
#[derive(Debug, Clone)]
pub struct StopHandle {
    chat: GenerationController,
    summary: GenerationController,
}

impl StopHandle {
    /// Returns `true` if anything was running.
    pub fn stop(&self) -> bool {
        let summary = self.summary.abort();
        let chat = self.chat.abort();
        summary || chat
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.chat.is_generating() || self.summary.is_generating()
    }
}

#[derive(Debug)]
pub struct ChatSession {
    settings: Settings,
    controller: GenerationController,
    summary: SummaryService,
    transcript: Transcript,
    /// System prompt of the last send, reused by regenerate.
    system_prompt: Option<String>,
    page_url: Option<String>,
}

impl ChatSession {
    #[must_use]
    pub fn new(settings: Settings, transport: Arc<dyn Transport>) -> Self {
        let controller = GenerationController::new(Arc::clone(&transport), settings.idle_timeout);
        let summary = SummaryService::new(
            settings.summary.clone(),
            settings.provider.clone(),
            GenerationController::new(transport, settings.idle_timeout),
        );
        Self {
            transcript: Transcript::new(settings.chat.max_history),
            settings,
            controller,
            summary,
            system_prompt: None,
            page_url: None,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    #[must_use]
    pub fn summary(&self) -> &SummaryService {
        &self.summary
    }

    #[must_use]
    pub fn controller(&self) -> &GenerationController {
        &self.controller
    }

    #[must_use]
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            chat: self.controller.clone(),
            summary: self.summary.controller().clone(),
        }
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.settings.chat.model = model.into();
    }

    fn options<'a>(&'a self, model: &'a str, page_url: Option<&'a str>) -> RequestOptions<'a> {
        RequestOptions {
            model,
            temperature: self.settings.chat.temperature,
            reasoning_effort: self.settings.chat.reasoning_effort,
            page_url,
        }
    }

    /// Ask `query` about `selections` and, optionally, the current page.
    ///
    /// The user turn joins the transcript before the request; the answer joins
    /// it only if the generation completes with text. Stopping while the page
    /// summary is still generating skips the chat request entirely.
    pub async fn send<S, T>(
        &mut self,
        query: &str,
        selections: &[T],
        page: Option<&PageSnapshot>,
        sink: S,
    ) -> Result<GenerationOutcome, RequestBuildError>
    where
        S: DeltaSink + 'static,
        T: AsRef<str>,
    {
        let user_prompt =
            build_user_prompt(query, selections).ok_or(RequestBuildError::EmptyPrompt)?;
        let model = self.settings.chat.model.clone();
        let request = build_request(
            &self.settings.provider,
            &self.options(&model, page.map(PageSnapshot::url)),
            Vec::new(),
        )?;

        let system_prompt = match page {
            Some(page) => {
                let Some(context) = self.page_context(page).await else {
                    debug!("Stopped during page summary");
                    return Ok(GenerationOutcome::Aborted);
                };
                let url = page.redacted_url();
                build_system_prompt(&self.settings.chat.system_prompt, Some((&url, &context)))
            }
            None => build_system_prompt(&self.settings.chat.system_prompt, None),
        };

        let user = ChatMessage::user(user_prompt);
        let mut messages = Vec::with_capacity(self.transcript.context().len() + 2);
        messages.push(ChatMessage::system(system_prompt.as_str()));
        messages.extend_from_slice(self.transcript.context());
        messages.push(user.clone());
        self.transcript.push(user);

        self.system_prompt = Some(system_prompt);
        self.page_url = page.map(|p| p.url().to_string());

        Ok(self.generate(request.with_messages(messages), sink).await)
    }

    /// Replace the assistant answer at `answer_index`, optionally with another model.
    ///
    /// The answer and everything after it leave the transcript; the question
    /// that prompted it is sent again through the ordinary start path.
    pub async fn regenerate<S>(
        &mut self,
        answer_index: usize,
        model: Option<&str>,
        sink: S,
    ) -> Result<GenerationOutcome, RequestBuildError>
    where
        S: DeltaSink + 'static,
    {
        let model = model.map_or_else(|| self.settings.chat.model.clone(), str::to_owned);
        let request = build_request(
            &self.settings.provider,
            &self.options(&model, self.page_url.as_deref()),
            Vec::new(),
        )?;
        self.transcript.truncate_at_answer(answer_index)?;

        let system_prompt = self
            .system_prompt
            .clone()
            .unwrap_or_else(|| build_system_prompt(&self.settings.chat.system_prompt, None));
        let mut messages = Vec::with_capacity(self.transcript.context().len() + 1);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend_from_slice(self.transcript.context());

        info!(answer_index, model = %model, "Regenerating answer");
        Ok(self.generate(request.with_messages(messages), sink).await)
    }

    /// [`regenerate`](Self::regenerate) the most recent answer.
    pub async fn regenerate_last<S>(
        &mut self,
        model: Option<&str>,
        sink: S,
    ) -> Result<GenerationOutcome, RequestBuildError>
    where
        S: DeltaSink + 'static,
    {
        let index = self
            .transcript
            .last_answer_index()
            .ok_or(TranscriptError::NoAnswer)?;
        self.regenerate(index, model, sink).await
    }

    pub fn stop(&self) -> bool {
        self.stop_handle().stop()
    }

    pub fn clear_context(&mut self) {
        self.transcript.clear_context();
    }

    pub fn restore_context(&mut self) {
        self.transcript.restore_context();
    }

    /// `None` if the summary was stopped.
    async fn page_context(&mut self, page: &PageSnapshot) -> Option<PageContext> {
        let raw = || PageContext::Content(page.prepared_text(DEFAULT_PAGE_CONTENT_CHARS));
        if !self.summary.is_enabled() && self.summary.cached_summary(page).is_none() {
            return Some(raw());
        }
        match self.summary.summarize(page, NoopSink).await {
            SummaryOutcome::Cached(text) | SummaryOutcome::Generated(text) => {
                Some(PageContext::Summary(text))
            }
            SummaryOutcome::Aborted => None,
            SummaryOutcome::Disabled | SummaryOutcome::Failed(_) => Some(raw()),
        }
    }

    async fn generate<S>(&mut self, request: GenerationRequest, sink: S) -> GenerationOutcome
    where
        S: DeltaSink + 'static,
    {
        let outcome = self.controller.start(request, sink).outcome().await;
        if let GenerationOutcome::Completed { answer, .. } = &outcome
            && !answer.is_empty()
        {
            self.transcript.push(ChatMessage::assistant(answer.as_str()));
        }
        outcome
    }
}
