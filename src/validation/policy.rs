//! Admission policy: allowed types, size limits, and scheduling knobs.

use serde::{Deserialize, Serialize};

/// Bytes in one megabyte as used for size limits.
pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Default MIME allow-list for document uploads.
pub const DEFAULT_ALLOWED_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.ms-excel",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/jpeg",
    "image/png",
    "image/tiff",
    "text/plain",
    "text/csv",
];

/// Rules applied by the validation gate and the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPolicy {
    /// Accepted MIME types (lower-case).
    pub allowed_types: Vec<String>,
    /// Per-file size limit in megabytes.
    pub max_file_size_mb: f64,
    /// Maximum number of items tracked at once.
    pub max_files: usize,
    /// Concurrency cap for uploads.
    pub max_concurrent_uploads: usize,
    /// Force one upload at a time.
    pub sequential: bool,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            allowed_types: DEFAULT_ALLOWED_TYPES
                .iter()
                .map(|value| value.to_string())
                .collect(),
            max_file_size_mb: 50.0,
            max_files: 20,
            max_concurrent_uploads: 3,
            sequential: false,
        }
    }
}

impl UploadPolicy {
    /// Effective number of upload slots.
    pub fn concurrency_cap(&self) -> usize {
        if self.sequential {
            1
        } else {
            self.max_concurrent_uploads.max(1)
        }
    }

    /// Per-file limit in bytes.
    pub fn max_file_size_bytes(&self) -> u64 {
        (self.max_file_size_mb * BYTES_PER_MB) as u64
    }

    /// Whether the declared MIME type is on the allow-list.
    pub fn allows(&self, mime_type: &str) -> bool {
        let mime_type = mime_type.trim().to_lowercase();
        self.allowed_types.iter().any(|allowed| *allowed == mime_type)
    }

    /// Human-readable list of supported formats, deduplicated and in allow-list order.
    pub fn supported_formats(&self) -> String {
        let mut names: Vec<&str> = Vec::new();
        for mime in &self.allowed_types {
            let name = format_name(mime);
            if !names.contains(&name) {
                names.push(name);
            }
        }
        names.join(", ")
    }
}

/// Display name for a MIME type; unknown types are shown verbatim.
pub fn format_name(mime_type: &str) -> &str {
    match mime_type {
        "application/pdf" => "PDF",
        "application/msword"
        | "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "Word",
        "application/vnd.ms-excel"
        | "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "Excel",
        "application/vnd.ms-powerpoint"
        | "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
            "PowerPoint"
        }
        "image/jpeg" => "JPEG",
        "image/png" => "PNG",
        "image/tiff" => "TIFF",
        "image/gif" => "GIF",
        "image/webp" => "WebP",
        "text/plain" => "Text",
        "text/csv" => "CSV",
        "application/rtf" => "RTF",
        "application/zip" => "ZIP",
        other => other,
    }
}
