#![deny(missing_docs)]

//! Client-side document ingestion: a validation gate in front of a bounded-concurrency
//! upload queue.

/// Command-line front end.
pub mod cli;
/// Environment-driven configuration management.
pub mod config;
/// Binary handles for candidate documents.
pub mod file;
/// Upload items and lifecycle state.
pub mod item;
/// Structured logging and tracing setup.
pub mod logging;
/// Async event loop around the orchestrator.
pub mod manager;
/// Upload activity counters.
pub mod metrics;
/// User-facing notification sinks.
pub mod notify;
/// Scheduling core and upload state machine.
pub mod orchestrator;
/// Upload transports.
pub mod transport;
/// Validation gate.
pub mod validation;

pub use file::SourceFile;
pub use item::{DocumentType, ItemId, UploadItem, UploadState, UploadStatus};
pub use manager::{ManagerError, UploadManager};
pub use orchestrator::{NewUpload, Orchestrator, UploadSummary};
pub use transport::{HttpTransport, Transport, TransportError, UploadReceipt};
pub use validation::{UploadPolicy, ValidationVerdict, Validator, validate};
