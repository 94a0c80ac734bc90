use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe counters describing upload activity.
#[derive(Default)]
pub struct UploadMetrics {
    files_admitted: AtomicU64,
    files_rejected: AtomicU64,
    uploads_started: AtomicU64,
    uploads_completed: AtomicU64,
    uploads_failed: AtomicU64,
    uploads_paused: AtomicU64,
    bytes_uploaded: AtomicU64,
}

impl UploadMetrics {
    /// Create an empty metrics accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of a validation gate pass.
    pub fn record_validation(&self, admitted: bool) {
        if admitted {
            self.files_admitted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.files_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record an upload attempt leaving the queue.
    pub fn record_start(&self) {
        self.uploads_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a finished upload and the bytes it transferred.
    pub fn record_completion(&self, bytes: u64) {
        self.uploads_completed.fetch_add(1, Ordering::Relaxed);
        self.bytes_uploaded.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a failed upload attempt.
    pub fn record_failure(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a pause (user cancellation).
    pub fn record_pause(&self) {
        self.uploads_paused.fetch_add(1, Ordering::Relaxed);
    }

    /// Return a snapshot of the current counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_admitted: self.files_admitted.load(Ordering::Relaxed),
            files_rejected: self.files_rejected.load(Ordering::Relaxed),
            uploads_started: self.uploads_started.load(Ordering::Relaxed),
            uploads_completed: self.uploads_completed.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            uploads_paused: self.uploads_paused.load(Ordering::Relaxed),
            bytes_uploaded: self.bytes_uploaded.load(Ordering::Relaxed),
        }
    }
}

/// Immutable view of upload counters used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Files that passed the validation gate.
    pub files_admitted: u64,
    /// Files rejected by the validation gate.
    pub files_rejected: u64,
    /// Upload attempts dispatched to the transport.
    pub uploads_started: u64,
    /// Uploads that finished successfully.
    pub uploads_completed: u64,
    /// Upload attempts that failed.
    pub uploads_failed: u64,
    /// Upload attempts cancelled by a pause.
    pub uploads_paused: u64,
    /// Total bytes of successfully uploaded files.
    pub bytes_uploaded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_validation_outcomes() {
        let metrics = UploadMetrics::new();
        metrics.record_validation(true);
        metrics.record_validation(false);
        metrics.record_validation(true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.files_admitted, 2);
        assert_eq!(snapshot.files_rejected, 1);
    }

    #[test]
    fn completion_accumulates_bytes() {
        let metrics = UploadMetrics::new();
        metrics.record_start();
        metrics.record_completion(1024);
        metrics.record_start();
        metrics.record_completion(2048);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_started, 2);
        assert_eq!(snapshot.uploads_completed, 2);
        assert_eq!(snapshot.bytes_uploaded, 3072);
    }

    #[test]
    fn snapshot_starts_empty() {
        let metrics = UploadMetrics::new();
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.uploads_failed, 0);
        assert_eq!(snapshot.uploads_paused, 0);
    }
}
