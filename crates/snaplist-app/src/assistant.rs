// Session coordinator: owns the listing store and runs one exchange with the
// completion service at a time.
//
// State is only ever mutated after an exchange succeeds, under a lock that
// is never held across an await. A generation counter, bumped by `cancel`
// and `reset`, marks exchanges whose results must be discarded.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use snaplist_core::completion::{CompletionRequest, CompletionService};
use snaplist_core::config::{Config, DEFAULT_HISTORY_TURNS, DEFAULT_REQUEST_TIMEOUT_SECS};
use snaplist_core::image::ImagePayload;
use snaplist_core::listing::ListingRecord;
use snaplist_core::session::ListingStore;
use snaplist_core::transcript::TranscriptEntry;
use snaplist_core::WorkflowError;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::extractor;
use crate::publish::{ListingBackend, ListingSubmission};
use crate::updater::{self, ChatReply};

/// Per-session limits applied to every exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Most recent transcript turns sent upstream, including the new message.
    pub history_turns: usize,
    pub request_timeout: Duration,
    pub extraction_max_tokens: u32,
    pub chat_max_tokens: u32,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        SessionSettings {
            history_turns: config.session.history_turns,
            request_timeout: config.session.request_timeout(),
            extraction_max_tokens: config.llm.extraction_max_tokens,
            chat_max_tokens: config.llm.chat_max_tokens,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        SessionSettings {
            history_turns: DEFAULT_HISTORY_TURNS,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            extraction_max_tokens: 1500,
            chat_max_tokens: 1024,
        }
    }
}

/// Clears the busy flag when the exchange that set it ends, however it ends.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, WorkflowError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| WorkflowError::Busy)?;
        Ok(BusyGuard { flag })
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One listing session: the current listing, its transcript, and the
/// completion service used to extract and refine it.
pub struct Assistant {
    completion: Arc<dyn CompletionService>,
    settings: SessionSettings,
    store: Mutex<ListingStore>,
    busy: AtomicBool,
    cancel: Notify,
    generation: AtomicU64,
}

impl Assistant {
    pub fn new(completion: Arc<dyn CompletionService>, settings: SessionSettings) -> Self {
        Assistant {
            completion,
            settings,
            store: Mutex::new(ListingStore::new()),
            busy: AtomicBool::new(false),
            cancel: Notify::new(),
            generation: AtomicU64::new(0),
        }
    }

    // -----------------------------------------------------------------------
    // Workflow operations
    // -----------------------------------------------------------------------

    /// Draft a listing from a product photo and optional seller notes.
    ///
    /// On success the new listing replaces the current one. On any failure
    /// the store is left exactly as it was.
    pub async fn extract(
        &self,
        image: &ImagePayload,
        notes: &str,
    ) -> Result<ListingRecord, WorkflowError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let generation = self.generation.load(Ordering::SeqCst);

        let request =
            extractor::extraction_request(image, notes, self.settings.extraction_max_tokens);
        let response = self.exchange(request, generation).await?;
        let record = extractor::parse_extraction(&response, image)?;

        let mut store = self.lock_store();
        self.ensure_current(generation)?;
        store.set(record.clone());
        Ok(record)
    }

    /// `extract` for an image still in its encoded form: a data URL or bare
    /// base64. An unusable payload is a `MalformedExtraction`.
    pub async fn extract_encoded(
        &self,
        image: &str,
        notes: &str,
    ) -> Result<ListingRecord, WorkflowError> {
        let image = ImagePayload::parse(image).map_err(|reason| {
            warn!(%reason, "rejected image payload");
            WorkflowError::MalformedExtraction(reason)
        })?;
        self.extract(&image, notes).await
    }

    /// Send one chat message about the current listing.
    ///
    /// The reply may update fields, replace the listing, or simply answer.
    /// Both turns are recorded in the transcript only once the exchange has
    /// succeeded.
    pub async fn send_message(&self, text: &str) -> Result<ChatReply, WorkflowError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let generation = self.generation.load(Ordering::SeqCst);

        let request = {
            let store = self.lock_store();
            updater::conversation_request(
                &store,
                text,
                self.settings.history_turns,
                self.settings.chat_max_tokens,
            )
        };
        debug!(turns = request.messages.len(), "sending chat message");

        let response = self.exchange(request, generation).await?;

        let mut store = self.lock_store();
        self.ensure_current(generation)?;
        Ok(updater::apply_reply(&mut store, text, &response))
    }

    /// Submit the current listing to the backend and return its id.
    ///
    /// The listing is cleared only once the backend has accepted it; the
    /// transcript is kept. A publish abandoned by `cancel` or the session
    /// timeout keeps the listing, although the backend may still have
    /// stored it.
    pub async fn publish(&self, backend: &dyn ListingBackend) -> Result<String, WorkflowError> {
        let _busy = BusyGuard::acquire(&self.busy)?;
        let generation = self.generation.load(Ordering::SeqCst);

        let submission = {
            let store = self.lock_store();
            let listing = store.get().ok_or(WorkflowError::NoListing)?;
            ListingSubmission::from(listing)
        };

        let id = self
            .guarded(
                backend.create_listing(&submission),
                generation,
                WorkflowError::Backend,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "publish failed, keeping listing");
                e
            })?;

        let mut store = self.lock_store();
        self.ensure_current(generation)?;
        store.clear();
        info!(%id, "published listing cleared from session");
        Ok(id)
    }

    /// Abort the in-flight exchange, if any. Returns whether one was running.
    pub fn cancel(&self) -> bool {
        let in_flight = self.busy.load(Ordering::Acquire);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.cancel.notify_waiters();
        if in_flight {
            info!("cancelled in-flight exchange");
        }
        in_flight
    }

    /// Start over: cancel any exchange and drop the listing and transcript.
    pub fn reset(&self) {
        self.cancel();
        self.lock_store().reset();
        info!("session reset");
    }

    /// Drop the current listing, keeping the transcript.
    pub fn clear_listing(&self) -> Option<ListingRecord> {
        self.lock_store().clear()
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn listing(&self) -> Option<ListingRecord> {
        self.lock_store().get().cloned()
    }

    /// The full transcript, oldest first.
    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        self.lock_store().transcript().entries().to_vec()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn lock_store(&self) -> MutexGuard<'_, ListingStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_current(&self, generation: u64) -> Result<(), WorkflowError> {
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "discarding result of a cancelled exchange");
            return Err(WorkflowError::Cancelled);
        }
        Ok(())
    }

    /// Run one request against the completion service, bounded by the
    /// session timeout and interruptible by `cancel`.
    async fn exchange(
        &self,
        request: CompletionRequest,
        generation: u64,
    ) -> Result<String, WorkflowError> {
        let call = async {
            self.completion.complete(request).await.map_err(|e| {
                warn!(error = %e, "completion service failed");
                WorkflowError::from(e)
            })
        };
        self.guarded(call, generation, WorkflowError::ServiceUnavailable)
            .await
    }

    /// Await `call` unless `cancel` fires first or the session timeout
    /// expires; `on_timeout` builds the error reported on expiry.
    async fn guarded<T>(
        &self,
        call: impl Future<Output = Result<T, WorkflowError>>,
        generation: u64,
        on_timeout: fn(String) -> WorkflowError,
    ) -> Result<T, WorkflowError> {
        let cancelled = self.cancel.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();
        // A cancel that landed before the waiter was registered.
        self.ensure_current(generation)?;

        let timeout = self.settings.request_timeout;
        tokio::select! {
            biased;
            _ = cancelled => Err(WorkflowError::Cancelled),
            result = tokio::time::timeout(timeout, call) => match result {
                Ok(result) => result,
                Err(_) => {
                    warn!(timeout_secs = timeout.as_secs(), "request timed out");
                    Err(on_timeout(format!("no response within {}s", timeout.as_secs())))
                }
            },
        }
    }
}
