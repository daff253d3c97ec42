//! Page summarization with fingerprint-checked reuse.

use std::sync::{Mutex, MutexGuard, PoisonError};

use lumen_config::{ProviderSettings, SummarySettings};
use lumen_context::{DEFAULT_PAGE_CONTENT_CHARS, PageSnapshot, SummaryCache};
use lumen_providers::{DeltaSink, GenerationOutcome};
use lumen_types::{ChatMessage, ReasoningEffort};
use tracing::{debug, info, warn};

use crate::controller::GenerationController;
use crate::request::{RequestOptions, build_request};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SummaryStatus {
    #[default]
    Idle,
    Loading,
    Complete(String),
    Error(String),
}

/// Result of one [`SummaryService::summarize`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryOutcome {
    /// Fresh summary reused without a request.
    Cached(String),
    Generated(String),
    Disabled,
    Aborted,
    Failed(String),
}

impl SummaryOutcome {
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Cached(text) | Self::Generated(text) => Some(text),
            Self::Disabled | Self::Aborted | Self::Failed(_) => None,
        }
    }
}

/// Owns the summary cache and the generations that fill it.
///
/// The cache is only written here, after a summary generation completes with
/// non-empty text.
#[derive(Debug)]
pub struct SummaryService {
    settings: SummarySettings,
    provider: ProviderSettings,
    controller: GenerationController,
    cache: SummaryCache,
    status: Mutex<SummaryStatus>,
}

impl SummaryService {
    #[must_use]
    pub fn new(
        settings: SummarySettings,
        provider: ProviderSettings,
        controller: GenerationController,
    ) -> Self {
        Self {
            settings,
            provider,
            controller,
            cache: SummaryCache::new(DEFAULT_PAGE_CONTENT_CHARS),
            status: Mutex::new(SummaryStatus::Idle),
        }
    }

    fn status_lock(&self) -> MutexGuard<'_, SummaryStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: SummaryStatus) {
        *self.status_lock() = status;
    }

    #[must_use]
    pub fn status(&self) -> SummaryStatus {
        self.status_lock().clone()
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    #[must_use]
    pub fn needs_summary(&self, page: &PageSnapshot) -> bool {
        self.cache.needs_refresh(page)
    }

    #[must_use]
    pub fn cached_summary(&self, page: &PageSnapshot) -> Option<&str> {
        self.cache.get_if_fresh(page)
    }

    #[must_use]
    pub fn cache(&self) -> &SummaryCache {
        &self.cache
    }

    /// Forget the cached summary, e.g. after navigating away.
    pub fn reset(&mut self) {
        self.cache.clear();
        self.set_status(SummaryStatus::Idle);
    }

    #[must_use]
    pub fn controller(&self) -> &GenerationController {
        &self.controller
    }

    /// Summarize `page`, reusing the cached summary while the page is unchanged.
    ///
    /// Progress streams through `sink`. A cached summary is reported through
    /// `on_complete` alone.
    pub async fn summarize<S>(&mut self, page: &PageSnapshot, sink: S) -> SummaryOutcome
    where
        S: DeltaSink + 'static,
    {
        let mut sink = sink;
        if let Some(cached) = self.cache.get_if_fresh(page).map(str::to_owned) {
            debug!(page = %page.key(), "Reusing cached page summary");
            self.set_status(SummaryStatus::Complete(cached.clone()));
            sink.on_complete(&cached);
            return SummaryOutcome::Cached(cached);
        }

        if !self.settings.enabled {
            return SummaryOutcome::Disabled;
        }

        let messages = vec![
            ChatMessage::system(self.settings.system_prompt.as_str()),
            ChatMessage::user(page.prepared_text(self.settings.max_content_chars)),
        ];
        let options = RequestOptions {
            model: &self.settings.model,
            temperature: self.settings.temperature,
            reasoning_effort: ReasoningEffort::None,
            page_url: Some(page.url()),
        };
        let request = match build_request(&self.provider, &options, messages) {
            Ok(request) => request,
            Err(err) => {
                warn!("Summary not configured: {err}");
                let message = format!("Summary not configured: {err}");
                self.set_status(SummaryStatus::Error(message.clone()));
                return SummaryOutcome::Failed(message);
            }
        };

        self.set_status(SummaryStatus::Loading);
        info!(page = %page.key(), model = %self.settings.model, "Generating page summary");

        match self.controller.start(request, sink).outcome().await {
            GenerationOutcome::Completed { answer, .. } if !answer.trim().is_empty() => {
                self.cache.update(page, answer.as_str());
                self.set_status(SummaryStatus::Complete(answer.clone()));
                SummaryOutcome::Generated(answer)
            }
            GenerationOutcome::Completed { .. } => {
                let message = "no response received from model".to_string();
                self.set_status(SummaryStatus::Error(message.clone()));
                SummaryOutcome::Failed(message)
            }
            GenerationOutcome::Aborted => {
                self.set_status(SummaryStatus::Idle);
                SummaryOutcome::Aborted
            }
            GenerationOutcome::Failed(err) => {
                warn!("Summary generation failed: {err}");
                self.set_status(SummaryStatus::Error(err.to_string()));
                SummaryOutcome::Failed(err.to_string())
            }
        }
    }

    /// Cancel a running summary; a `Loading` status drops back to `Idle`.
    pub fn abort(&self) -> bool {
        let aborted = self.controller.abort();
        let mut status = self.status_lock();
        if *status == SummaryStatus::Loading {
            *status = SummaryStatus::Idle;
        }
        aborted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use lumen_context::PageSnapshot;
    use lumen_providers::{NoopSink, TransportEvent};

    use super::{SummaryOutcome, SummaryService, SummaryStatus};
    use crate::GenerationController;
    use crate::test_support::{
        ReplyTransport, SharedLog, answer, channel_controller, content, settings_with_key,
    };

    const PAGE_TEXT: &str = "Tokio is an asynchronous runtime for the Rust programming language. \
        It provides the building blocks needed for writing network applications.";

    fn service(transport: Arc<ReplyTransport>, enabled: bool) -> SummaryService {
        let mut settings = settings_with_key();
        settings.summary.enabled = enabled;
        SummaryService::new(
            settings.summary,
            settings.provider,
            GenerationController::new(transport, Duration::from_secs(60)),
        )
    }

    fn page() -> PageSnapshot {
        PageSnapshot::new("https://tokio.rs/tokio/tutorial?token=secret", PAGE_TEXT)
    }

    #[tokio::test]
    async fn generates_then_reuses_cached_summary() {
        let transport = ReplyTransport::new(vec![answer("Async runtime docs.")]);
        let mut service = service(Arc::clone(&transport), true);
        let page = page();

        let first = service.summarize(&page, NoopSink).await;
        assert_eq!(first, SummaryOutcome::Generated("Async runtime docs.".into()));
        assert_eq!(
            service.status(),
            SummaryStatus::Complete("Async runtime docs.".into())
        );

        let log = SharedLog::default();
        let second = service.summarize(&page, log.sink("S")).await;
        assert_eq!(second, SummaryOutcome::Cached("Async runtime docs.".into()));
        assert_eq!(log.entries(), vec!["S:complete(Async runtime docs.)"]);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn request_uses_summary_model_without_thinking() {
        let transport = ReplyTransport::new(vec![answer("ok")]);
        let mut service = service(Arc::clone(&transport), true);
        service.summarize(&page(), NoopSink).await;

        let body = &transport.bodies()[0];
        assert_eq!(body["model"], "google/gemini-2.0-flash-exp:free");
        assert!(body.get("reasoning").is_none());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], PAGE_TEXT);
        let referer = transport.requests()[0]
            .header("HTTP-Referer")
            .map(str::to_owned);
        assert_eq!(
            referer.as_deref(),
            Some("https://tokio.rs/tokio/tutorial?token=%5BREDACTED%5D")
        );
    }

    #[tokio::test]
    async fn changed_page_is_summarized_again() {
        let transport = ReplyTransport::new(vec![answer("first"), answer("second")]);
        let mut service = service(Arc::clone(&transport), true);
        service.summarize(&page(), NoopSink).await;

        let edited = PageSnapshot::new(page().url(), "Completely different and much shorter.");
        let outcome = service.summarize(&edited, NoopSink).await;
        assert_eq!(outcome, SummaryOutcome::Generated("second".into()));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn disabled_service_does_nothing() {
        let transport = ReplyTransport::new(vec![]);
        let mut service = service(Arc::clone(&transport), false);
        assert_eq!(
            service.summarize(&page(), NoopSink).await,
            SummaryOutcome::Disabled
        );
        assert!(transport.requests().is_empty());
        assert_eq!(service.status(), SummaryStatus::Idle);
    }

    #[tokio::test]
    async fn empty_summary_is_not_cached() {
        let transport = ReplyTransport::new(vec![vec![TransportEvent::Done {
            status: 200,
            body: None,
        }]]);
        let mut service = service(Arc::clone(&transport), true);
        let page = page();
        let outcome = service.summarize(&page, NoopSink).await;
        assert!(matches!(outcome, SummaryOutcome::Failed(_)));
        assert!(service.cached_summary(&page).is_none());
    }

    #[tokio::test]
    async fn abort_resets_loading_to_idle() {
        let (controller, mut opened) = channel_controller();
        let mut settings = settings_with_key();
        settings.summary.enabled = true;
        let mut service = SummaryService::new(settings.summary, settings.provider, controller.clone());
        let page = page();

        let stopper = controller.clone();
        let abort = tokio::spawn(async move {
            let (_request, tx) = opened.recv().await.unwrap();
            tx.send(content("partial")).await.unwrap();
            stopper.abort();
            tx
        });

        let outcome = service.summarize(&page, NoopSink).await;
        assert_eq!(outcome, SummaryOutcome::Aborted);
        assert_eq!(service.status(), SummaryStatus::Idle);
        assert!(service.cached_summary(&page).is_none());
        drop(abort.await.unwrap());
    }
}
