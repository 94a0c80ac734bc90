//! Async front end for the orchestrator.
//!
//! [`UploadManager`] owns one [`Orchestrator`] on a dedicated tokio task. Host commands and
//! transport events travel through the same channel, so every state change is applied by a
//! single event loop in arrival order. The current item collection is published through a
//! `watch` channel for hosts that render it.

use crate::config::Config;
use crate::file::SourceFile;
use crate::item::{ItemId, UploadItem};
use crate::metrics::{MetricsSnapshot, UploadMetrics};
use crate::notify::{NotificationSink, TracingNotifier};
use crate::orchestrator::{
    Admission, Clock, CompletionHook, ErrorHook, ItemCollection, ItemDetails, Launcher,
    NewUpload, Orchestrator, SessionId, SystemClock, UploadSummary, UploadTicket,
};
use crate::transport::{ProgressReporter, Transport, TransportError, UploadControl, UploadReceipt};
use crate::validation::{ValidationVerdict, Validator};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

/// Errors returned by [`UploadManager`] handles.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// The event loop is no longer running.
    #[error("upload manager has shut down")]
    Closed,
}

enum Message {
    Submit {
        uploads: Vec<NewUpload>,
        resp: oneshot::Sender<Vec<Admission>>,
    },
    Validate {
        file: SourceFile,
        resp: oneshot::Sender<ValidationVerdict>,
    },
    Start {
        id: ItemId,
        resp: oneshot::Sender<bool>,
    },
    StartAllIdle {
        resp: oneshot::Sender<usize>,
    },
    Pause {
        id: ItemId,
        resp: oneshot::Sender<bool>,
    },
    Retry {
        id: ItemId,
        resp: oneshot::Sender<bool>,
    },
    Remove {
        id: ItemId,
        resp: oneshot::Sender<bool>,
    },
    Reorder {
        from: usize,
        to: usize,
        resp: oneshot::Sender<bool>,
    },
    SetDetails {
        id: ItemId,
        details: ItemDetails,
        resp: oneshot::Sender<bool>,
    },
    ClearCompleted {
        resp: oneshot::Sender<usize>,
    },
    Summary {
        resp: oneshot::Sender<UploadSummary>,
    },
    Progress {
        item_id: ItemId,
        session_id: SessionId,
        percent: f64,
    },
    Finished {
        item_id: ItemId,
        session_id: SessionId,
        outcome: Result<UploadReceipt, TransportError>,
    },
    Stop,
}

/// Collection published through a `watch` channel.
pub struct WatchCollection {
    sender: watch::Sender<Vec<UploadItem>>,
}

impl WatchCollection {
    /// Collection starting empty.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(Vec::new());
        Self { sender }
    }

    /// Receiver observing every replacement.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadItem>> {
        self.sender.subscribe()
    }
}

impl Default for WatchCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemCollection for WatchCollection {
    fn snapshot(&self) -> Vec<UploadItem> {
        self.sender.borrow().clone()
    }

    fn replace(&mut self, items: Vec<UploadItem>) {
        self.sender.send_replace(items);
    }
}

/// Runs each attempt as its own tokio task and reports back over the manager's channel.
struct SpawnLauncher {
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<Message>,
}

impl Launcher for SpawnLauncher {
    fn launch(&mut self, ticket: UploadTicket) {
        let UploadTicket {
            item_id,
            session_id,
            request,
            cancel,
        } = ticket;
        let transport = Arc::clone(&self.transport);
        let events = self.events.clone();
        let progress = {
            let events = events.clone();
            ProgressReporter::new(cancel.clone(), move |percent| {
                let _ = events.send(Message::Progress {
                    item_id,
                    session_id,
                    percent,
                });
            })
        };

        tokio::spawn(async move {
            let outcome = transport
                .upload(request, UploadControl { cancel, progress })
                .await;
            if events
                .send(Message::Finished {
                    item_id,
                    session_id,
                    outcome,
                })
                .is_err()
            {
                tracing::debug!(item_id = %item_id, "Upload finished after manager shutdown");
            }
        });
    }
}

type Core = Orchestrator<WatchCollection, SpawnLauncher>;

/// Builder for [`UploadManager`].
pub struct UploadManagerBuilder {
    validator: Validator,
    transport: Arc<dyn Transport>,
    auto_start: bool,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    metrics: Arc<UploadMetrics>,
    on_complete: Option<CompletionHook>,
    on_error: Option<ErrorHook>,
}

impl UploadManagerBuilder {
    /// Whether admitted files start uploading right away (default `true`).
    pub fn auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Route notifications to `notifier` instead of the log.
    pub fn notifier(mut self, notifier: Arc<dyn NotificationSink>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Read time from `clock`.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record counters into `metrics`.
    pub fn metrics(mut self, metrics: Arc<UploadMetrics>) -> Self {
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

    /// Start the event loop. Must be called from within a tokio runtime.
    pub fn spawn(self) -> UploadManager {
        let (tx, rx) = mpsc::unbounded_channel();
        let collection = WatchCollection::new();
        let view = collection.subscribe();
        let (idle_tx, idle_rx) = watch::channel(true);
        let launcher = SpawnLauncher {
            transport: self.transport,
            events: tx.clone(),
        };

        let mut core = Orchestrator::new(self.validator, collection, launcher)
            .with_auto_start(self.auto_start)
            .with_notifier(self.notifier)
            .with_clock(self.clock)
            .with_metrics(Arc::clone(&self.metrics));
        if let Some(hook) = self.on_complete {
            core = core.on_complete(hook);
        }
        if let Some(hook) = self.on_error {
            core = core.on_error(hook);
        }

        let join = tokio::spawn(run_event_loop(core, rx, idle_tx));
        tracing::debug!("Upload manager started");
        UploadManager {
            tx,
            view,
            idle: idle_rx,
            metrics: self.metrics,
            join: Some(join),
        }
    }
}

/// Handle to the upload event loop.
pub struct UploadManager {
    tx: mpsc::UnboundedSender<Message>,
    view: watch::Receiver<Vec<UploadItem>>,
    idle: watch::Receiver<bool>,
    metrics: Arc<UploadMetrics>,
    join: Option<JoinHandle<()>>,
}

impl UploadManager {
    /// Configure a manager enforcing `validator` and sending through `transport`.
    pub fn builder(validator: Validator, transport: Arc<dyn Transport>) -> UploadManagerBuilder {
        UploadManagerBuilder {
            validator,
            transport,
            auto_start: true,
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            metrics: Arc::new(UploadMetrics::new()),
            on_complete: None,
            on_error: None,
        }
    }

    /// Configure a manager from environment configuration.
    pub fn from_config(config: &Config, transport: Arc<dyn Transport>) -> UploadManagerBuilder {
        Self::builder(config.validator(), transport).auto_start(config.auto_start)
    }

    /// Offer files for admission; one [`Admission`] per file, in order.
    pub async fn submit(&self, uploads: Vec<NewUpload>) -> Result<Vec<Admission>, ManagerError> {
        self.request(|resp| Message::Submit { uploads, resp }).await
    }

    /// Validate a file against the current collection without admitting it.
    pub async fn validate(&self, file: SourceFile) -> Result<ValidationVerdict, ManagerError> {
        self.request(|resp| Message::Validate { file, resp }).await
    }

    /// Schedule an idle item.
    pub async fn start(&self, id: ItemId) -> Result<bool, ManagerError> {
        self.request(|resp| Message::Start { id, resp }).await
    }

    /// Schedule every idle item in order.
    pub async fn start_all_idle(&self) -> Result<usize, ManagerError> {
        self.request(|resp| Message::StartAllIdle { resp }).await
    }

    /// Pause an in-flight or waiting item.
    pub async fn pause(&self, id: ItemId) -> Result<bool, ManagerError> {
        self.request(|resp| Message::Pause { id, resp }).await
    }

    /// Retry a failed or paused item.
    pub async fn retry(&self, id: ItemId) -> Result<bool, ManagerError> {
        self.request(|resp| Message::Retry { id, resp }).await
    }

    /// Remove an item, cancelling it if needed.
    pub async fn remove(&self, id: ItemId) -> Result<bool, ManagerError> {
        self.request(|resp| Message::Remove { id, resp }).await
    }

    /// Move the item at `from` to `to`.
    pub async fn reorder(&self, from: usize, to: usize) -> Result<bool, ManagerError> {
        self.request(|resp| Message::Reorder { from, to, resp }).await
    }

    /// Edit an item's metadata.
    pub async fn set_details(
        &self,
        id: ItemId,
        details: ItemDetails,
    ) -> Result<bool, ManagerError> {
        self.request(|resp| Message::SetDetails { id, details, resp })
            .await
    }

    /// Drop every completed item.
    pub async fn clear_completed(&self) -> Result<usize, ManagerError> {
        self.request(|resp| Message::ClearCompleted { resp }).await
    }

    /// Aggregate counts and byte totals.
    pub async fn summary(&self) -> Result<UploadSummary, ManagerError> {
        self.request(|resp| Message::Summary { resp }).await
    }

    /// Latest published items.
    pub fn items(&self) -> Vec<UploadItem> {
        self.view.borrow().clone()
    }

    /// Receiver observing every collection replacement.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadItem>> {
        self.view.clone()
    }

    /// Current counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Resolve once nothing is uploading or waiting for a slot.
    pub async fn wait_idle(&self) -> Result<(), ManagerError> {
        let mut idle = self.idle.clone();
        idle.wait_for(|idle| *idle)
            .await
            .map(|_| ())
            .map_err(|_| ManagerError::Closed)
    }

    /// Pause everything still in flight and stop the event loop.
    pub async fn shutdown(mut self) {
        if self.tx.send(Message::Stop).is_err() {
            tracing::debug!("Upload manager already stopped");
        }
        if let Some(join) = self.join.take()
            && let Err(err) = join.await
        {
            tracing::error!(error = %err, "Upload manager task failed");
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Message,
    ) -> Result<T, ManagerError> {
        let (resp_tx, resp_rx) = oneshot::channel();
        self.tx
            .send(build(resp_tx))
            .map_err(|_| ManagerError::Closed)?;
        resp_rx.await.map_err(|_| ManagerError::Closed)
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        if self.join.is_some() {
            let _ = self.tx.send(Message::Stop);
        }
    }
}

async fn run_event_loop(
    mut core: Core,
    mut rx: mpsc::UnboundedReceiver<Message>,
    idle: watch::Sender<bool>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            Message::Submit { uploads, resp } => {
                let admissions = core.admit_batch(uploads);
                reply(&core, &idle, resp, admissions);
            }
            Message::Validate { file, resp } => {
                let verdict = core.validate(&file);
                reply(&core, &idle, resp, verdict);
            }
            Message::Start { id, resp } => {
                let started = core.start(id);
                reply(&core, &idle, resp, started);
            }
            Message::StartAllIdle { resp } => {
                let started = core.start_all_idle();
                reply(&core, &idle, resp, started);
            }
            Message::Pause { id, resp } => {
                let paused = core.pause(id);
                reply(&core, &idle, resp, paused);
            }
            Message::Retry { id, resp } => {
                let retried = core.retry(id);
                reply(&core, &idle, resp, retried);
            }
            Message::Remove { id, resp } => {
                let removed = core.remove(id);
                reply(&core, &idle, resp, removed);
            }
            Message::Reorder { from, to, resp } => {
                let moved = core.reorder(from, to);
                reply(&core, &idle, resp, moved);
            }
            Message::SetDetails { id, details, resp } => {
                let updated = core.set_details(id, details);
                reply(&core, &idle, resp, updated);
            }
            Message::ClearCompleted { resp } => {
                let cleared = core.clear_completed();
                reply(&core, &idle, resp, cleared);
            }
            Message::Summary { resp } => {
                let summary = core.summary();
                reply(&core, &idle, resp, summary);
            }
            Message::Progress {
                item_id,
                session_id,
                percent,
            } => {
                core.handle_progress(item_id, session_id, percent);
            }
            Message::Finished {
                item_id,
                session_id,
                outcome,
            } => {
                core.handle_outcome(item_id, session_id, outcome);
                idle.send_replace(core.is_idle());
            }
            Message::Stop => {
                let paused = core.pause_all();
                tracing::debug!(paused, "Paused outstanding uploads on shutdown");
                idle.send_replace(true);
                break;
            }
        }
    }
    tracing::debug!("Upload manager stopped");
}

/// Publish the idle flag before answering so callers observe the state their command left.
fn reply<T>(core: &Core, idle: &watch::Sender<bool>, resp: oneshot::Sender<T>, value: T) {
    idle.send_replace(core.is_idle());
    let _ = resp.send(value);
}
