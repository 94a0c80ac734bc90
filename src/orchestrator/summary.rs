//! Aggregate read model over the item collection.

use crate::item::{UploadItem, UploadStatus};
use serde::Serialize;

/// Counts and byte totals for a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    /// Items tracked.
    pub total: usize,
    /// Items completed.
    pub completed: usize,
    /// Items uploading.
    pub uploading: usize,
    /// Items in the error state.
    pub failed: usize,
    /// Items waiting: idle, queued, or retrying.
    pub pending: usize,
    /// Items paused.
    pub paused: usize,
    /// Bytes of completed files plus the observed share of in-flight files.
    pub uploaded_bytes: u64,
    /// Bytes across every tracked file.
    pub total_bytes: u64,
}

impl UploadSummary {
    /// Summarize `items`.
    pub fn from_items(items: &[UploadItem]) -> Self {
        items.iter().fold(Self::default(), |mut summary, item| {
            summary.total += 1;
            summary.total_bytes += item.file().size();
            summary.uploaded_bytes += item.uploaded_bytes();
            match item.status() {
                UploadStatus::Completed => summary.completed += 1,
                UploadStatus::Uploading => summary.uploading += 1,
                UploadStatus::Error => summary.failed += 1,
                UploadStatus::Paused => summary.paused += 1,
                UploadStatus::Idle | UploadStatus::Queued | UploadStatus::Retrying => {
                    summary.pending += 1
                }
            }
            summary
        })
    }

    /// Share of bytes uploaded, in percent.
    pub fn percent_complete(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.uploaded_bytes as f64 / self.total_bytes as f64 * 100.0
    }
}
