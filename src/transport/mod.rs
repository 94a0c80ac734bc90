//! Upload transport abstraction.
//!
//! The orchestrator never talks to the network directly. It hands a [`TransportRequest`]
//! and an [`UploadControl`] to a [`Transport`], which reports progress through the control's
//! reporter and resolves to an [`UploadReceipt`] or a [`TransportError`]. Cancellation is
//! cooperative: transports must observe the control's token and resolve with
//! [`TransportError::Cancelled`].

mod http;

pub use http::HttpTransport;

use crate::file::SourceFile;
use crate::item::DocumentType;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Message shown when a transport fails without explaining why.
pub const FALLBACK_FAILURE_MESSAGE: &str = "Upload failed. Please try again.";

/// Errors raised by transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The upload was cancelled through its control token.
    #[error("Upload cancelled")]
    Cancelled,
    /// The remote side refused the upload.
    #[error("Upload rejected{}: {}", status.map(|code| format!(" ({code})")).unwrap_or_default(), supplied_message(message).unwrap_or(FALLBACK_FAILURE_MESSAGE))]
    Rejected {
        /// HTTP status, when the transport speaks HTTP.
        status: Option<u16>,
        /// Message supplied by the remote side.
        message: Option<String>,
    },
    /// HTTP layer failed before a usable response arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The file could not be read.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),
    /// The configured endpoint is unusable.
    #[error("Invalid upload endpoint: {0}")]
    InvalidEndpoint(String),
}

impl TransportError {
    /// Whether this error stems from a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Message to show the user, or `None` when the transport supplied nothing useful.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::Rejected { message, .. } => supplied_message(message).map(str::to_string),
            other => Some(other.to_string()),
        }
    }
}

/// Server-supplied text, ignoring blank messages.
fn supplied_message(message: &Option<String>) -> Option<&str> {
    message
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

/// Successful upload result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Location of the stored document.
    pub url: String,
}

/// Everything a transport needs to send one document.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    /// File to send.
    pub file: SourceFile,
    /// Classification tag.
    pub document_type: DocumentType,
    /// Display title.
    pub title: String,
}

/// Receives progress percentages for one attempt.
///
/// Reports made after the attempt's token is cancelled are dropped, so a cancelled attempt
/// never produces further progress.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(f64) + Send + Sync>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    /// Build a reporter that forwards to `sink` until `cancel` fires.
    pub fn new(cancel: CancellationToken, sink: impl Fn(f64) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            cancel,
        }
    }

    /// Reporter that discards everything.
    pub fn noop() -> Self {
        Self::new(CancellationToken::new(), |_| {})
    }

    /// Report progress in percent; values are clamped to `0..=100`.
    pub fn report(&self, percent: f64) {
        if self.cancel.is_cancelled() || percent.is_nan() {
            return;
        }
        (self.sink)(percent.clamp(0.0, 100.0));
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Cancellation handle and progress callback bound to one attempt.
#[derive(Debug, Clone)]
pub struct UploadControl {
    /// Token fired when the attempt must stop.
    pub cancel: CancellationToken,
    /// Progress callback.
    pub progress: ProgressReporter,
}

/// Network operation performing a single upload.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, reporting progress and honouring cancellation through `control`.
    async fn upload(
        &self,
        request: TransportRequest,
        control: UploadControl,
    ) -> Result<UploadReceipt, TransportError>;
}
