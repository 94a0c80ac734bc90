//! User-facing notifications emitted on upload completion and failure.

use std::sync::Mutex;

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    /// An upload finished.
    Success,
    /// An upload failed.
    Error,
}

/// Receiver of transient user notifications.
pub trait NotificationSink: Send + Sync {
    /// Announce a success.
    fn success(&self, title: &str, message: &str);
    /// Announce a failure.
    fn error(&self, title: &str, message: &str);
}

/// Writes notifications to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl NotificationSink for TracingNotifier {
    fn success(&self, title: &str, message: &str) {
        tracing::info!(title, message, "Notification");
    }

    fn error(&self, title: &str, message: &str) {
        tracing::warn!(title, message, "Notification");
    }
}

/// Discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn success(&self, _title: &str, _message: &str) {}

    fn error(&self, _title: &str, _message: &str) {}
}

/// Keeps every notification in memory, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    entries: Mutex<Vec<(NotificationKind, String, String)>>,
}

impl RecordingNotifier {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications received so far.
    pub fn entries(&self) -> Vec<(NotificationKind, String, String)> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    fn push(&self, kind: NotificationKind, title: &str, message: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push((kind, title.to_string(), message.to_string()));
        }
    }
}

impl NotificationSink for RecordingNotifier {
    fn success(&self, title: &str, message: &str) {
        self.push(NotificationKind::Success, title, message);
    }

    fn error(&self, title: &str, message: &str) {
        self.push(NotificationKind::Error, title, message);
    }
}
