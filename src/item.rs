//! Upload items and their lifecycle state.
//!
//! The per-status fields of an item live inside [`UploadState`], so an item can only carry
//! transfer metrics while uploading and a result URL once completed. The flat record shape
//! used for serialization is produced by [`UploadItem::to_record`].

use crate::file::SourceFile;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Message attached to items paused by a cancellation.
pub const CANCELLED_MESSAGE: &str = "Upload cancelled";

/// Opaque unique identifier for an upload item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Allocate a fresh identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Document classification forwarded to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Supplier or customer invoice.
    Invoice,
    /// Purchase receipt.
    Receipt,
    /// Signed agreement.
    Contract,
    /// Bank or account statement.
    Statement,
    /// Tax filing or assessment.
    TaxReturn,
    /// Generic report.
    Report,
    /// Anything else.
    #[default]
    Other,
}

impl DocumentType {
    /// Wire tag sent to the transport.
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Invoice => "invoice",
            Self::Receipt => "receipt",
            Self::Contract => "contract",
            Self::Statement => "statement",
            Self::TaxReturn => "tax_return",
            Self::Report => "report",
            Self::Other => "other",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "invoice" => Ok(Self::Invoice),
            "receipt" => Ok(Self::Receipt),
            "contract" => Ok(Self::Contract),
            "statement" => Ok(Self::Statement),
            "tax_return" => Ok(Self::TaxReturn),
            "report" => Ok(Self::Report),
            "other" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

/// Flat status discriminant used by read models and serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Admitted but not yet scheduled.
    Idle,
    /// Waiting in the pending queue for a free slot.
    Queued,
    /// Transfer in flight.
    Uploading,
    /// Cancelled by the user; resumable via retry.
    Paused,
    /// Retried and waiting for a free slot.
    Retrying,
    /// Transfer finished and a result URL is known.
    Completed,
    /// Transfer failed; resumable via retry.
    Error,
}

/// Live transfer metrics, only present while uploading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Transfer {
    /// Percentage complete, `0..=100`.
    pub progress: f64,
    /// Estimated throughput in bytes per second.
    pub speed: Option<f64>,
    /// Estimated seconds remaining.
    pub eta: Option<f64>,
}

/// Lifecycle state with the fields each status is allowed to carry.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadState {
    /// Admitted but not yet scheduled.
    Idle,
    /// Waiting in the pending queue.
    Queued,
    /// Transfer in flight.
    Uploading(Transfer),
    /// Cancelled by the user.
    Paused {
        /// Last progress observed before the cancellation.
        progress: f64,
        /// Informational message shown to the user.
        message: String,
    },
    /// Retried and waiting for a free slot.
    Retrying,
    /// Finished successfully.
    Completed {
        /// Location returned by the transport.
        url: String,
    },
    /// Failed attempt.
    Failed {
        /// Transport message or generic fallback.
        message: String,
    },
}

impl UploadState {
    /// Flat status discriminant.
    pub fn status(&self) -> UploadStatus {
        match self {
            Self::Idle => UploadStatus::Idle,
            Self::Queued => UploadStatus::Queued,
            Self::Uploading(_) => UploadStatus::Uploading,
            Self::Paused { .. } => UploadStatus::Paused,
            Self::Retrying => UploadStatus::Retrying,
            Self::Completed { .. } => UploadStatus::Completed,
            Self::Failed { .. } => UploadStatus::Error,
        }
    }

    /// Whether the dispatch loop may start this item.
    pub fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Idle | Self::Queued | Self::Retrying)
    }

    /// Whether `retry` is permitted from this state.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Paused { .. } | Self::Failed { .. })
    }
}

/// A tracked document moving through the upload lifecycle.
#[derive(Debug, Clone)]
pub struct UploadItem {
    id: ItemId,
    file: SourceFile,
    /// Classification forwarded to the transport.
    pub document_type: DocumentType,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Position within the collection.
    pub order: usize,
    state: UploadState,
    retry_count: u32,
}

impl UploadItem {
    pub(crate) fn new(
        file: SourceFile,
        document_type: DocumentType,
        title: String,
        description: String,
        order: usize,
    ) -> Self {
        Self {
            id: ItemId::new(),
            file,
            document_type,
            title,
            description,
            order,
            state: UploadState::Idle,
            retry_count: 0,
        }
    }

    /// Identifier of the item.
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Underlying file handle.
    pub fn file(&self) -> &SourceFile {
        &self.file
    }

    /// Current lifecycle state.
    pub fn state(&self) -> &UploadState {
        &self.state
    }

    /// Flat status discriminant.
    pub fn status(&self) -> UploadStatus {
        self.state.status()
    }

    /// Number of failed attempts so far.
    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Progress percentage, defined while uploading or paused.
    pub fn progress(&self) -> Option<f64> {
        match &self.state {
            UploadState::Uploading(transfer) => Some(transfer.progress),
            UploadState::Paused { progress, .. } => Some(*progress),
            UploadState::Completed { .. } => Some(100.0),
            UploadState::Retrying | UploadState::Failed { .. } => Some(0.0),
            UploadState::Idle | UploadState::Queued => None,
        }
    }

    /// Throughput estimate, only while uploading.
    pub fn speed(&self) -> Option<f64> {
        match &self.state {
            UploadState::Uploading(transfer) => transfer.speed,
            _ => None,
        }
    }

    /// Remaining-time estimate, only while uploading.
    pub fn eta(&self) -> Option<f64> {
        match &self.state {
            UploadState::Uploading(transfer) => transfer.eta,
            _ => None,
        }
    }

    /// Error or cancellation message, if any.
    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            UploadState::Failed { message } | UploadState::Paused { message, .. } => {
                Some(message)
            }
            _ => None,
        }
    }

    /// Location returned by the transport, only once completed.
    pub fn result_url(&self) -> Option<&str> {
        match &self.state {
            UploadState::Completed { url } => Some(url),
            _ => None,
        }
    }

    /// Bytes counted as uploaded: the whole file once completed, the observed share while
    /// uploading, nothing otherwise.
    pub fn uploaded_bytes(&self) -> u64 {
        match &self.state {
            UploadState::Completed { .. } => self.file.size(),
            UploadState::Uploading(transfer) => {
                (self.file.size() as f64 * transfer.progress / 100.0).round() as u64
            }
            _ => 0,
        }
    }

    pub(crate) fn set_state(&mut self, state: UploadState) {
        self.state = state;
    }

    pub(crate) fn record_failure(&mut self, message: String) {
        self.retry_count += 1;
        self.state = UploadState::Failed { message };
    }

    /// Flatten into the serializable record shape.
    pub fn to_record(&self) -> UploadItemRecord {
        UploadItemRecord {
            id: self.id,
            source_file: FileRecord {
                name: self.file.name().to_string(),
                size: self.file.size(),
                mime_type: self.file.mime_type().to_string(),
                last_modified: self.file.last_modified_ms(),
            },
            document_type: self.document_type,
            title: self.title.clone(),
            description: self.description.clone(),
            order: self.order,
            status: self.status(),
            progress: self.progress(),
            speed: self.speed(),
            eta: self.eta(),
            retry_count: self.retry_count,
            error_message: self.error_message().map(str::to_string),
            result_url: self.result_url().map(str::to_string),
        }
    }
}

impl Serialize for UploadItem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_record().serialize(serializer)
    }
}

/// Descriptive attributes of the source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Declared MIME type.
    pub mime_type: String,
    /// Last-modified timestamp in epoch milliseconds.
    pub last_modified: i64,
}

/// Flat representation of an [`UploadItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItemRecord {
    /// Item identifier.
    pub id: ItemId,
    /// Source file attributes.
    pub source_file: FileRecord,
    /// Document classification.
    pub document_type: DocumentType,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: String,
    /// Position in the collection.
    pub order: usize,
    /// Lifecycle status.
    pub status: UploadStatus,
    /// Progress percentage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    /// Throughput estimate in bytes per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Remaining seconds estimate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta: Option<f64>,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Error or cancellation message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Result location once completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
}
