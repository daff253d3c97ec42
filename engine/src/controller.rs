//! Serializing owner of the one live generation.
//!
//! `start` never runs two sessions at once. Each call registers its session
//! as current (aborting whatever was current before) and then queues behind
//! a one-slot gate, so a session only opens its transport after the previous
//! one has delivered its terminal callback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lumen_providers::{DeltaSink, GenerationOutcome, GenerationSession, SessionHandle, Transport};
use lumen_types::{GenerationRequest, SessionId};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Inner {
    transport: Arc<dyn Transport>,
    idle_timeout: Duration,
    next_id: AtomicU64,
    current: Mutex<Option<SessionHandle>>,
    gate: tokio::sync::Mutex<()>,
}

impl Inner {
    fn current(&self) -> MutexGuard<'_, Option<SessionHandle>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cheap to clone; clones share the same current session and gate.
#[derive(Clone)]
pub struct GenerationController {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for GenerationController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationController")
            .field("idle_timeout", &self.inner.idle_timeout)
            .field("current", &self.current_id())
            .finish_non_exhaustive()
    }
}

impl GenerationController {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                idle_timeout,
                next_id: AtomicU64::new(0),
                current: Mutex::new(None),
                gate: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Begin a generation, replacing the current one.
    ///
    /// Must be called within a tokio runtime. The returned task need not be
    /// awaited; dropping it leaves the generation running.
    pub fn start<S>(&self, request: GenerationRequest, sink: S) -> GenerationTask
    where
        S: DeltaSink + 'static,
    {
        let id = SessionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let session = GenerationSession::new(id, request, self.inner.idle_timeout);
        let handle = session.handle();

        let previous = self.inner.current().replace(handle.clone());
        if let Some(previous) = previous
            && previous.abort()
        {
            debug!(session_id = %id, replaced = %previous.id(), "Replacing active generation");
        }

        let inner = Arc::clone(&self.inner);
        let mut sink = sink;
        let join = tokio::spawn(async move {
            let _turn = inner.gate.lock().await;
            let outcome = session.run(inner.transport.as_ref(), &mut sink).await;
            debug!(session_id = %id, state = %outcome.state(), "Generation settled");

            let mut current = inner.current();
            if current.as_ref().is_some_and(|h| h.id() == id) {
                *current = None;
            }
            outcome
        });

        GenerationTask { handle, join }
    }

    /// Abort the current generation, if any. Does not wait for queued starts.
    ///
    /// Returns `true` if a live session was cancelled. No sink callback for
    /// that session fires after this returns.
    pub fn abort(&self) -> bool {
        let current = self.inner.current().clone();
        current.is_some_and(|handle| handle.abort())
    }

    #[must_use]
    pub fn is_generating(&self) -> bool {
        self.inner
            .current()
            .as_ref()
            .is_some_and(SessionHandle::is_active)
    }

    #[must_use]
    pub fn current_id(&self) -> Option<SessionId> {
        self.inner.current().as_ref().map(SessionHandle::id)
    }

    #[must_use]
    pub fn idle_timeout(&self) -> Duration {
        self.inner.idle_timeout
    }
}

/// A started generation.
#[derive(Debug)]
pub struct GenerationTask {
    handle: SessionHandle,
    join: JoinHandle<GenerationOutcome>,
}

impl GenerationTask {
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.handle.id()
    }

    #[must_use]
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Wait for the terminal outcome.
    pub async fn outcome(self) -> GenerationOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!(session_id = %self.handle.id(), "Generation task failed: {err}");
                self.handle.abort();
                GenerationOutcome::Aborted
            }
        }
    }
}
