//! Upload orchestration core.
//!
//! [`Orchestrator`] owns the scheduling state (bounded active set, FIFO pending queue, session
//! registry) and drives every item through its lifecycle. It is deliberately synchronous:
//! the host feeds it commands and transport events one at a time, and it answers by
//! replacing the whole item collection and by handing [`UploadTicket`]s to a [`Launcher`].
//! Callbacks carry the [`SessionId`] of the attempt that produced them; anything from a
//! superseded session is ignored.

mod scheduler;
mod session;
mod summary;

pub use scheduler::Scheduler;
pub use session::{
    Clock, ManualClock, SessionId, SystemClock, Throughput, ThroughputSampler, UploadSession,
};
pub use summary::UploadSummary;

use crate::file::SourceFile;
use crate::item::{CANCELLED_MESSAGE, DocumentType, ItemId, Transfer, UploadItem, UploadState};
use crate::metrics::UploadMetrics;
use crate::notify::{NotificationSink, TracingNotifier};
use crate::transport::{
    FALLBACK_FAILURE_MESSAGE, TransportError, TransportRequest, UploadReceipt,
};
use crate::validation::{ValidationVerdict, Validator};
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Externally owned, ordered item collection.
///
/// The orchestrator reads the current sequence and writes back whole replacements; it never
/// patches items in place.
pub trait ItemCollection: Send {
    /// Current items, in order.
    fn snapshot(&self) -> Vec<UploadItem>;
    /// Replace the whole sequence.
    fn replace(&mut self, items: Vec<UploadItem>);
}

/// Plain in-memory collection.
#[derive(Debug, Default, Clone)]
pub struct VecCollection {
    items: Vec<UploadItem>,
}

impl VecCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Borrow the items.
    pub fn items(&self) -> &[UploadItem] {
        &self.items
    }
}

impl ItemCollection for VecCollection {
    fn snapshot(&self) -> Vec<UploadItem> {
        self.items.clone()
    }

    fn replace(&mut self, items: Vec<UploadItem>) {
        self.items = items;
    }
}

/// Work order for one upload attempt.
#[derive(Debug)]
pub struct UploadTicket {
    /// Item being uploaded.
    pub item_id: ItemId,
    /// Attempt identity; echo it back with every event.
    pub session_id: SessionId,
    /// What to send.
    pub request: TransportRequest,
    /// Fired when the attempt must stop.
    pub cancel: CancellationToken,
}

/// Starts transport work for tickets issued by the orchestrator.
///
/// Implementations must return immediately and report progress and the final outcome back
/// through [`Orchestrator::handle_progress`] and [`Orchestrator::handle_outcome`].
pub trait Launcher: Send {
    /// Begin the attempt described by `ticket`.
    fn launch(&mut self, ticket: UploadTicket);
}

/// Callback invoked with the item after a successful upload.
pub type CompletionHook = Box<dyn Fn(&UploadItem) + Send>;

/// Callback invoked with the item and the user-facing message after a failed upload.
pub type ErrorHook = Box<dyn Fn(&UploadItem, &str) + Send>;

/// A file offered for admission with its initial metadata.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// File to admit.
    pub file: SourceFile,
    /// Classification.
    pub document_type: DocumentType,
    /// Title; defaults to the file stem.
    pub title: Option<String>,
    /// Free-form description.
    pub description: String,
}

impl NewUpload {
    /// Offer `file` with default metadata.
    pub fn new(file: SourceFile) -> Self {
        Self {
            file,
            document_type: DocumentType::default(),
            title: None,
            description: String::new(),
        }
    }

    /// Set the classification.
    pub fn with_document_type(mut self, document_type: DocumentType) -> Self {
        self.document_type = document_type;
        self
    }

    /// Set the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Result of offering one file.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Gate verdict.
    pub verdict: ValidationVerdict,
    /// The new item, when the file was admitted.
    pub item: Option<UploadItem>,
}

impl Admission {
    /// Whether the file became an item.
    pub fn is_admitted(&self) -> bool {
        self.item.is_some()
    }
}

/// Metadata edits; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ItemDetails {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New classification.
    pub document_type: Option<DocumentType>,
}

/// Scheduling core. See the module docs.
pub struct Orchestrator<C, L> {
    validator: Validator,
    collection: C,
    launcher: L,
    scheduler: Scheduler,
    sessions: HashMap<ItemId, UploadSession>,
    sequential: bool,
    auto_start: bool,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    metrics: Arc<UploadMetrics>,
    on_complete: Option<CompletionHook>,
    on_error: Option<ErrorHook>,
}

impl<C: ItemCollection, L: Launcher> Orchestrator<C, L> {
    /// Orchestrator enforcing `validator`'s policy over `collection`.
    pub fn new(validator: Validator, collection: C, launcher: L) -> Self {
        let policy = validator.policy();
        let scheduler = Scheduler::new(policy.concurrency_cap());
        let sequential = policy.sequential;
        Self {
            validator,
            collection,
            launcher,
            scheduler,
            sessions: HashMap::new(),
            sequential,
            auto_start: true,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(UploadMetrics::new()),
            on_complete: None,
            on_error: None,
        }
    }

    /// Whether admitted items start without an explicit [`Orchestrator::start`].
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Route notifications to `notifier`.
    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Read time from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record counters into `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<UploadMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Call `hook` after every successful upload.
    pub fn on_complete(mut self, hook: impl Fn(&UploadItem) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    /// Call `hook` after every failed upload.
    pub fn on_error(mut self, hook: impl Fn(&UploadItem, &str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(hook));
        self
    }

    /// Validation gate in use.
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Shared counters.
    pub fn metrics(&self) -> &Arc<UploadMetrics> {
        &self.metrics
    }

    /// Scheduling state.
    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Item collection.
    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Current items, in order.
    pub fn items(&self) -> Vec<UploadItem> {
        self.collection.snapshot()
    }

    /// Current state of one item.
    pub fn item(&self, id: ItemId) -> Option<UploadItem> {
        self.collection
            .snapshot()
            .into_iter()
            .find(|item| item.id() == id)
    }

    /// Aggregate counts and byte totals.
    pub fn summary(&self) -> UploadSummary {
        UploadSummary::from_items(&self.collection.snapshot())
    }

    /// Whether nothing is in flight or waiting for a slot.
    pub fn is_idle(&self) -> bool {
        self.scheduler.active_len() == 0 && self.scheduler.pending_len() == 0
    }

    /// Validate a file without admitting it.
    pub fn validate(&self, file: &SourceFile) -> ValidationVerdict {
        self.validator.validate(file, &self.collection.snapshot())
    }

    /// Offer one file.
    pub fn admit(&mut self, upload: NewUpload) -> Admission {
        self.admit_batch(vec![upload]).remove(0)
    }

    /// Offer several files at once. Every file gets its own verdict; valid files are
    /// admitted even when siblings are rejected.
    pub fn admit_batch(&mut self, uploads: Vec<NewUpload>) -> Vec<Admission> {
        let mut items = self.collection.snapshot();
        let files: Vec<SourceFile> = uploads.iter().map(|upload| upload.file.clone()).collect();
        let verdicts = self.validator.validate_batch(&files, &items);

        let mut admitted = Vec::new();
        let mut results = Vec::with_capacity(uploads.len());
        for (upload, verdict) in uploads.into_iter().zip(verdicts) {
            self.metrics.record_validation(verdict.valid);
            if !verdict.valid {
                tracing::warn!(
                    file_name = upload.file.name(),
                    errors = %verdict.summary(),
                    "File rejected"
                );
                results.push(Admission {
                    verdict,
                    item: None,
                });
                continue;
            }

            let title = upload
                .title
                .filter(|title| !title.trim().is_empty())
                .unwrap_or_else(|| upload.file.stem().to_string());
            let item = UploadItem::new(
                upload.file,
                upload.document_type,
                title,
                upload.description,
                items.len(),
            );
            tracing::info!(
                item_id = %item.id(),
                file_name = item.file().name(),
                size = item.file().size(),
                "File admitted"
            );
            admitted.push(item.id());
            results.push(Admission {
                verdict,
                item: Some(item.clone()),
            });
            items.push(item);
        }

        if self.auto_start {
            for id in admitted {
                self.schedule(&mut items, id, UploadState::Queued);
            }
        }
        self.collection.replace(items);
        self.pump();

        // Reflect any dispatch that happened after admission.
        let current = self.collection.snapshot();
        for result in &mut results {
            if let Some(item) = &mut result.item
                && let Some(latest) = current.iter().find(|latest| latest.id() == item.id())
            {
                *item = latest.clone();
            }
        }
        results
    }

    /// Schedule an idle item.
    pub fn start(&mut self, id: ItemId) -> bool {
        let mut items = self.collection.snapshot();
        let idle = find(&items, id).is_some_and(|item| matches!(item.state(), UploadState::Idle));
        if !idle {
            tracing::debug!(item_id = %id, "Start ignored: item is not idle");
            return false;
        }
        self.schedule(&mut items, id, UploadState::Queued);
        self.collection.replace(items);
        self.pump();
        true
    }

    /// Schedule every idle item in collection order; returns how many were scheduled.
    pub fn start_all_idle(&mut self) -> usize {
        let mut items = self.collection.snapshot();
        let mut idle: Vec<(usize, ItemId)> = items
            .iter()
            .filter(|item| matches!(item.state(), UploadState::Idle))
            .map(|item| (item.order, item.id()))
            .collect();
        idle.sort_by_key(|(order, _)| *order);
        for (_, id) in &idle {
            self.schedule(&mut items, *id, UploadState::Queued);
        }
        self.collection.replace(items);
        self.pump();
        idle.len()
    }

    /// Cancel an in-flight or waiting item and mark it paused.
    pub fn pause(&mut self, id: ItemId) -> bool {
        let mut items = self.collection.snapshot();
        if !self.halt(&mut items, id) {
            return false;
        }
        self.collection.replace(items);
        self.pump();
        true
    }

    /// Pause every uploading, queued, or retrying item without dispatching anything in
    /// their place. Returns how many items were paused.
    pub fn pause_all(&mut self) -> usize {
        let mut items = self.collection.snapshot();
        let outstanding: Vec<ItemId> = items
            .iter()
            .filter(|item| {
                matches!(
                    item.state(),
                    UploadState::Uploading(_) | UploadState::Queued | UploadState::Retrying
                )
            })
            .map(UploadItem::id)
            .collect();
        let paused = outstanding
            .into_iter()
            .filter(|id| self.halt(&mut items, *id))
            .count();
        if paused > 0 {
            self.collection.replace(items);
        }
        paused
    }

    /// Re-admit a failed or paused item. It competes for the next free slot ahead of items
    /// already waiting when capacity is available right away.
    pub fn retry(&mut self, id: ItemId) -> bool {
        let mut items = self.collection.snapshot();
        let Some(item) = find_mut(&mut items, id) else {
            tracing::debug!(item_id = %id, "Retry ignored: unknown item");
            return false;
        };
        if !item.state().is_retryable() {
            tracing::debug!(item_id = %id, status = ?item.status(), "Retry ignored");
            return false;
        }
        item.set_state(UploadState::Retrying);
        tracing::info!(item_id = %id, retry_count = item.retry_count(), "Retrying upload");
        self.schedule(&mut items, id, UploadState::Retrying);
        self.collection.replace(items);
        self.pump();
        true
    }

    /// Drop an item, cancelling any attempt in flight.
    pub fn remove(&mut self, id: ItemId) -> bool {
        let mut items = self.collection.snapshot();
        let Some(index) = items.iter().position(|item| item.id() == id) else {
            tracing::debug!(item_id = %id, "Remove ignored: unknown item");
            return false;
        };
        if let Some(session) = self.sessions.remove(&id) {
            session.cancel();
        }
        self.scheduler.forget(id);
        let removed = items.remove(index);
        renumber(&mut items);
        tracing::info!(item_id = %id, file_name = removed.file().name(), "Item removed");
        self.collection.replace(items);
        self.pump();
        true
    }

    /// Move the item at `from` to position `to`, renumbering every item.
    pub fn reorder(&mut self, from: usize, to: usize) -> bool {
        let mut items = self.collection.snapshot();
        if from >= items.len() || to >= items.len() {
            tracing::debug!(from, to, len = items.len(), "Reorder ignored: index out of range");
            return false;
        }
        let item = items.remove(from);
        items.insert(to, item);
        renumber(&mut items);
        self.collection.replace(items);
        true
    }

    /// Edit metadata of an item that is not uploading.
    pub fn set_details(&mut self, id: ItemId, details: ItemDetails) -> bool {
        let mut items = self.collection.snapshot();
        let Some(item) = find_mut(&mut items, id) else {
            return false;
        };
        if matches!(item.state(), UploadState::Uploading(_)) {
            tracing::debug!(item_id = %id, "Details locked while uploading");
            return false;
        }
        if let Some(title) = details.title {
            item.title = title;
        }
        if let Some(description) = details.description {
            item.description = description;
        }
        if let Some(document_type) = details.document_type {
            item.document_type = document_type;
        }
        self.collection.replace(items);
        true
    }

    /// Remove every completed item; returns how many were removed.
    pub fn clear_completed(&mut self) -> usize {
        let mut items = self.collection.snapshot();
        let before = items.len();
        items.retain(|item| !matches!(item.state(), UploadState::Completed { .. }));
        let removed = before - items.len();
        if removed > 0 {
            renumber(&mut items);
            self.collection.replace(items);
            tracing::info!(removed, "Cleared completed items");
        }
        removed
    }

    /// Apply a progress report. Returns `false` when the report was ignored.
    pub fn handle_progress(&mut self, id: ItemId, session_id: SessionId, percent: f64) -> bool {
        if !self.is_current(id, session_id) {
            tracing::trace!(item_id = %id, session_id = %session_id, "Ignoring stale progress");
            return false;
        }
        let now = self.clock.now();
        let mut items = self.collection.snapshot();
        let Some(item) = find_mut(&mut items, id) else {
            return false;
        };
        let UploadState::Uploading(previous) = item.state() else {
            return false;
        };
        let mut transfer = *previous;
        let percent = percent.clamp(0.0, 100.0);
        transfer.progress = percent;
        let size = item.file().size();
        if let Some(sample) = self
            .sessions
            .get_mut(&id)
            .and_then(|session| session.sampler_mut().observe(percent, now, size))
        {
            transfer.speed = Some(sample.speed);
            transfer.eta = Some(sample.eta);
        }
        tracing::trace!(
            item_id = %id,
            percent,
            speed = ?transfer.speed,
            eta = ?transfer.eta,
            "Upload progress"
        );
        item.set_state(UploadState::Uploading(transfer));
        self.collection.replace(items);
        true
    }

    /// Apply the final outcome of an attempt. Returns `false` when it was ignored.
    pub fn handle_outcome(
        &mut self,
        id: ItemId,
        session_id: SessionId,
        outcome: Result<UploadReceipt, TransportError>,
    ) -> bool {
        if !self.is_current(id, session_id) {
            tracing::trace!(item_id = %id, session_id = %session_id, "Ignoring stale outcome");
            return false;
        }
        self.sessions.remove(&id);
        self.scheduler.release(id);

        let mut items = self.collection.snapshot();
        let Some(item) = find_mut(&mut items, id) else {
            self.pump();
            return false;
        };

        match outcome {
            Ok(receipt) => {
                item.set_state(UploadState::Completed { url: receipt.url });
                self.metrics.record_completion(item.file().size());
                tracing::info!(
                    item_id = %id,
                    file_name = item.file().name(),
                    url = item.result_url().unwrap_or_default(),
                    "Upload completed"
                );
                let done = item.clone();
                self.collection.replace(items);
                self.notifier.success(
                    "Upload complete",
                    &format!("{} was uploaded successfully", done.title),
                );
                if let Some(hook) = &self.on_complete {
                    hook(&done);
                }
            }
            Err(error) if error.is_cancelled() => {
                let progress = item.progress().unwrap_or(0.0);
                item.set_state(UploadState::Paused {
                    progress,
                    message: CANCELLED_MESSAGE.to_string(),
                });
                self.metrics.record_pause();
                tracing::info!(item_id = %id, progress, "Upload cancelled by transport");
                self.collection.replace(items);
            }
            Err(error) => {
                let message = error
                    .user_message()
                    .unwrap_or_else(|| FALLBACK_FAILURE_MESSAGE.to_string());
                item.record_failure(message.clone());
                self.metrics.record_failure();
                tracing::warn!(
                    item_id = %id,
                    file_name = item.file().name(),
                    retry_count = item.retry_count(),
                    error = %error,
                    "Upload failed"
                );
                let failed = item.clone();
                self.collection.replace(items);
                self.notifier
                    .error("Upload failed", &format!("{}: {message}", failed.title));
                if let Some(hook) = &self.on_error {
                    hook(&failed, &message);
                }
            }
        }

        self.pump();
        true
    }

    fn is_current(&self, id: ItemId, session_id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|session| session.id() == session_id)
    }

    /// Admission step shared by auto start, explicit start, and retry: take a free slot now,
    /// or wait at the queue tail in `waiting`.
    /// Cancel or dequeue `id` and mark it paused, leaving the freed slot unfilled.
    fn halt(&mut self, items: &mut [UploadItem], id: ItemId) -> bool {
        let Some(item) = find_mut(items, id) else {
            tracing::debug!(item_id = %id, "Pause ignored: unknown item");
            return false;
        };
        let progress = match item.state() {
            UploadState::Uploading(transfer) => {
                if let Some(session) = self.sessions.remove(&id) {
                    session.cancel();
                }
                self.scheduler.release(id);
                transfer.progress
            }
            UploadState::Queued | UploadState::Retrying => {
                self.scheduler.dequeue(id);
                0.0
            }
            _ => {
                tracing::debug!(item_id = %id, status = ?item.status(), "Pause ignored");
                return false;
            }
        };
        item.set_state(UploadState::Paused {
            progress,
            message: CANCELLED_MESSAGE.to_string(),
        });
        self.metrics.record_pause();
        tracing::info!(item_id = %id, progress, "Upload paused");
        true
    }

    fn schedule(&mut self, items: &mut [UploadItem], id: ItemId, waiting: UploadState) {
        if !self.sequential && self.scheduler.has_capacity() && self.launch(items, id) {
            return;
        }
        if let Some(item) = find_mut(items, id) {
            item.set_state(waiting);
        }
        self.scheduler.enqueue(id);
        tracing::debug!(
            item_id = %id,
            active = self.scheduler.active_len(),
            pending = self.scheduler.pending_len(),
            "Upload queued"
        );
    }

    /// Dispatch loop: start queued items while slots are free, dropping entries whose item
    /// is gone or no longer dispatchable.
    fn pump(&mut self) {
        let mut items = self.collection.snapshot();
        let mut changed = false;
        while let Some(id) = self.scheduler.next_ready() {
            let dispatchable =
                find(&items, id).is_some_and(|item| item.state().is_dispatchable());
            if dispatchable && self.launch(&mut items, id) {
                changed = true;
            } else {
                tracing::debug!(item_id = %id, "Dropped queue entry");
            }
        }
        if changed {
            self.collection.replace(items);
        }
    }

    /// Open a new session for `id` and hand it to the launcher.
    fn launch(&mut self, items: &mut [UploadItem], id: ItemId) -> bool {
        let Some(item) = find_mut(items, id) else {
            return false;
        };
        if !item.state().is_dispatchable() || !self.scheduler.activate(id) {
            return false;
        }
        self.scheduler.dequeue(id);

        let session = UploadSession::start(self.clock.now());
        let session_id = session.id();
        let cancel = session.token().clone();
        if let Some(previous) = self.sessions.insert(id, session) {
            previous.cancel();
        }

        item.set_state(UploadState::Uploading(Transfer::default()));
        self.metrics.record_start();
        tracing::info!(
            item_id = %id,
            session_id = %session_id,
            file_name = item.file().name(),
            active = self.scheduler.active_len(),
            pending = self.scheduler.pending_len(),
            "Upload started"
        );

        let request = TransportRequest {
            file: item.file().clone(),
            document_type: item.document_type,
            title: item.title.clone(),
        };
        self.launcher.launch(UploadTicket {
            item_id: id,
            session_id,
            request,
            cancel,
        });
        true
    }
}

fn find(items: &[UploadItem], id: ItemId) -> Option<&UploadItem> {
    items.iter().find(|item| item.id() == id)
}

fn find_mut(items: &mut [UploadItem], id: ItemId) -> Option<&mut UploadItem> {
    items.iter_mut().find(|item| item.id() == id)
}

fn renumber(items: &mut [UploadItem]) {
    for (index, item) in items.iter_mut().enumerate() {
        item.order = index;
    }
}
