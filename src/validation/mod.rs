//! Validation gate: decides whether a candidate file may become an upload item.
//!
//! Checks run in a fixed order, cheapest first, and every failing check contributes its
//! own error so a user sees all problems with a file at once. The file content is read at
//! most once per file, and only when a signature or script scan needs it. Nothing here
//! throws: every outcome is returned as a [`ValidationVerdict`].

pub mod filename;
pub mod policy;
pub mod quota;
pub mod security;
pub mod signature;

pub use policy::{BYTES_PER_MB, DEFAULT_ALLOWED_TYPES, UploadPolicy, format_name};
pub use quota::{QuotaDecision, QuotaProvider, QuotaTier, StaticQuota};

use crate::file::SourceFile;
use crate::item::UploadItem;
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

const NEAR_LIMIT_RATIO: f64 = 0.9;
const LONG_FILENAME_WARNING: usize = 100;
const QUOTA_WARNING_RATIO: f64 = 0.9;

/// Reasons a file is refused admission.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// The collection already holds the maximum number of files.
    #[error("Too many files. You can add at most {limit} files")]
    TooManyFiles {
        /// Configured maximum.
        limit: usize,
    },
    /// Declared MIME type is not on the allow-list.
    #[error("Unsupported file type ({mime_type}). Supported formats: {supported}")]
    UnsupportedType {
        /// Declared MIME type.
        mime_type: String,
        /// Display list of accepted formats.
        supported: String,
    },
    /// File exceeds the policy size limit.
    #[error("File is too large ({size_mb:.1} MB). Maximum size is {limit_mb} MB")]
    TooLarge {
        /// Actual size in megabytes.
        size_mb: f64,
        /// Limit in megabytes.
        limit_mb: f64,
    },
    /// An item with the same name, size, and modification time already exists.
    #[error("{name} has already been added")]
    Duplicate {
        /// Name of the duplicated file.
        name: String,
    },
    /// File name failed a safety rule.
    #[error("{0}")]
    UnsafeFilename(String),
    /// Content could not be read for inspection.
    #[error("File could not be read: {0}")]
    Unreadable(String),
    /// Leading bytes do not match the declared type.
    #[error("File content does not match its declared type ({format})")]
    SignatureMismatch {
        /// Display name of the declared format.
        format: String,
    },
    /// Name ends with an executable extension.
    #[error("Executable files are not allowed (.{extension})")]
    ExecutableFile {
        /// Offending extension.
        extension: String,
    },
    /// Executable extension hidden among several extensions.
    #[error("File name has a suspicious double extension")]
    DoubleExtension,
    /// Operating-system metadata file.
    #[error("System metadata files cannot be uploaded")]
    OsMetadata,
    /// File exceeds the absolute size ceiling.
    #[error("File exceeds the absolute limit of 2 GB")]
    ExceedsHardLimit,
    /// Text content carries script markers.
    #[error("File contains embedded script content ({markers})")]
    EmbeddedScript {
        /// Comma-separated marker labels.
        markers: String,
    },
    /// Upload would exceed the storage quota.
    #[error(
        "Storage quota exceeded on the {tier} plan: {needed_mb:.1} MB needed, {available_mb:.1} MB available"
    )]
    QuotaExceeded {
        /// Tier of the quota.
        tier: QuotaTier,
        /// Size of the file in megabytes.
        needed_mb: f64,
        /// Remaining quota in megabytes.
        available_mb: f64,
    },
}

/// Outcome of validating one file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    /// Name of the validated file.
    pub file_name: String,
    /// Whether the file may be admitted.
    pub valid: bool,
    /// Blocking problems, each independently actionable.
    #[serde(serialize_with = "serialize_messages")]
    pub errors: Vec<ValidationError>,
    /// Non-blocking observations.
    pub warnings: Vec<String>,
    /// Lower-cased final extension, if any.
    pub detected_extension: Option<String>,
    /// Declared MIME type.
    pub declared_mime: String,
    /// Declared size in bytes.
    pub size_bytes: u64,
    /// Policy size limit in bytes.
    pub limit_bytes: u64,
}

impl ValidationVerdict {
    /// Error messages as display strings.
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }

    /// All error messages joined into one line.
    pub fn summary(&self) -> String {
        self.messages().join("; ")
    }
}

fn serialize_messages<S: Serializer>(
    errors: &[ValidationError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// What the gate already knows about the collection while validating a batch.
struct GateContext {
    tracked: usize,
    fingerprints: HashSet<(String, u64, i64)>,
    reserved_bytes: u64,
}

impl GateContext {
    fn from_items(existing: &[UploadItem]) -> Self {
        Self {
            tracked: existing.len(),
            fingerprints: existing
                .iter()
                .map(|item| owned_fingerprint(item.file()))
                .collect(),
            reserved_bytes: 0,
        }
    }

    fn admit(&mut self, file: &SourceFile) {
        self.tracked += 1;
        self.fingerprints.insert(owned_fingerprint(file));
        self.reserved_bytes = self.reserved_bytes.saturating_add(file.size());
    }
}

fn owned_fingerprint(file: &SourceFile) -> (String, u64, i64) {
    let (name, size, modified) = file.fingerprint();
    (name.to_string(), size, modified)
}

/// The validation gate, bound to a policy and an optional quota provider.
#[derive(Clone)]
pub struct Validator {
    policy: UploadPolicy,
    quota: Option<(Arc<dyn QuotaProvider>, String)>,
}

impl Validator {
    /// Build a gate for `policy` without quota enforcement.
    pub fn new(policy: UploadPolicy) -> Self {
        Self {
            policy,
            quota: None,
        }
    }

    /// Enforce `provider`'s quota for `user_id` as the last check.
    pub fn with_quota(mut self, provider: Arc<dyn QuotaProvider>, user_id: impl Into<String>) -> Self {
        self.quota = Some((provider, user_id.into()));
        self
    }

    /// Policy the gate enforces.
    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validate one file against the items already tracked.
    pub fn validate(&self, file: &SourceFile, existing: &[UploadItem]) -> ValidationVerdict {
        self.check(file, &GateContext::from_items(existing))
    }

    /// Validate a batch; files admitted earlier in the batch count toward limits, duplicate
    /// detection, and quota for later siblings. Returns one verdict per file, in order.
    pub fn validate_batch(
        &self,
        files: &[SourceFile],
        existing: &[UploadItem],
    ) -> Vec<ValidationVerdict> {
        let mut context = GateContext::from_items(existing);
        files
            .iter()
            .map(|file| {
                let verdict = self.check(file, &context);
                if verdict.valid {
                    context.admit(file);
                }
                verdict
            })
            .collect()
    }

    fn check(&self, file: &SourceFile, context: &GateContext) -> ValidationVerdict {
        let policy = &self.policy;
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let name = file.name();
        let mime_type = file.mime_type();
        let size = file.size();
        let limit_bytes = policy.max_file_size_bytes();

        if context.tracked >= policy.max_files {
            errors.push(ValidationError::TooManyFiles {
                limit: policy.max_files,
            });
        }

        if !policy.allows(mime_type) {
            errors.push(ValidationError::UnsupportedType {
                mime_type: if mime_type.is_empty() {
                    "unknown".to_string()
                } else {
                    mime_type.to_string()
                },
                supported: policy.supported_formats(),
            });
        }

        let size_mb = size as f64 / BYTES_PER_MB;
        if size_mb > policy.max_file_size_mb {
            errors.push(ValidationError::TooLarge {
                size_mb,
                limit_mb: policy.max_file_size_mb,
            });
        } else if size == 0 {
            warnings.push("File is empty".to_string());
        } else if size_mb > policy.max_file_size_mb * NEAR_LIMIT_RATIO {
            warnings.push(format!(
                "File is close to the {} MB limit",
                policy.max_file_size_mb
            ));
        }

        if context.fingerprints.contains(&owned_fingerprint(file)) {
            errors.push(ValidationError::Duplicate {
                name: name.to_string(),
            });
        }

        errors.extend(
            filename::check_filename(name)
                .into_iter()
                .map(ValidationError::UnsafeFilename),
        );
        if name.chars().count() > LONG_FILENAME_WARNING {
            warnings.push("File name is long and may be shortened by some systems".to_string());
        }

        let needs_signature = signature::has_known_signature(mime_type);
        let needs_scan = security::is_text_like(mime_type);
        let within_hard_cap = size <= security::HARD_SIZE_CAP_BYTES;
        let head = if (needs_signature || needs_scan) && within_hard_cap {
            let probe = if needs_scan {
                security::SCRIPT_SCAN_LEN
            } else {
                signature::SIGNATURE_PROBE_LEN
            };
            match file.read_prefix(probe) {
                Ok(bytes) => Some(bytes),
                Err(error) => {
                    errors.push(ValidationError::Unreadable(error.to_string()));
                    None
                }
            }
        } else {
            None
        };

        if let (true, Some(bytes)) = (needs_signature, head.as_deref()) {
            let probe = &bytes[..bytes.len().min(signature::SIGNATURE_PROBE_LEN)];
            if !signature::matches_signature(mime_type, probe) {
                errors.push(ValidationError::SignatureMismatch {
                    format: format_name(mime_type).to_string(),
                });
            }
        }

        if security::has_executable_extension(name) {
            errors.push(ValidationError::ExecutableFile {
                extension: file.extension().unwrap_or_default(),
            });
        }
        if security::has_double_extension(name) {
            errors.push(ValidationError::DoubleExtension);
        }
        if security::is_os_metadata(name) {
            errors.push(ValidationError::OsMetadata);
        }
        if !within_hard_cap {
            errors.push(ValidationError::ExceedsHardLimit);
        }
        if let (true, Some(bytes)) = (needs_scan, head.as_deref()) {
            let markers = security::find_script_markers(bytes);
            if !markers.is_empty() {
                errors.push(ValidationError::EmbeddedScript {
                    markers: markers.join(", "),
                });
            }
        }

        if let Some((provider, user_id)) = &self.quota {
            let requested = size.saturating_add(context.reserved_bytes);
            let decision = provider.check(user_id, requested);
            if !decision.allowed {
                let available = decision.remaining().saturating_sub(context.reserved_bytes);
                errors.push(ValidationError::QuotaExceeded {
                    tier: decision.tier,
                    needed_mb: size_mb,
                    available_mb: available as f64 / BYTES_PER_MB,
                });
            } else if decision.max_quota > 0
                && (decision.current_usage + requested) as f64
                    > decision.max_quota as f64 * QUOTA_WARNING_RATIO
            {
                warnings.push("Storage quota is more than 90% used".to_string());
            }
        }

        let valid = errors.is_empty();
        if !valid {
            tracing::debug!(
                file_name = %name,
                errors = errors.len(),
                "File rejected by validation gate"
            );
        }

        ValidationVerdict {
            file_name: name.to_string(),
            valid,
            errors,
            warnings,
            detected_extension: file.extension(),
            declared_mime: mime_type.to_string(),
            size_bytes: size,
            limit_bytes,
        }
    }
}

/// Validate one file against `policy` and the items already tracked.
pub fn validate(
    file: &SourceFile,
    policy: &UploadPolicy,
    existing: &[UploadItem],
) -> ValidationVerdict {
    Validator::new(policy.clone()).validate(file, existing)
}
