use crate::validation::{QuotaTier, StaticQuota, UploadPolicy, Validator};
use serde::Deserialize;
use std::env;
use std::sync::{Arc, OnceLock};
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the upload pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// HTTP endpoint that receives uploaded documents.
    pub upload_endpoint: Option<String>,
    /// Optional bearer token attached to each upload request.
    pub upload_api_key: Option<String>,
    /// Maximum number of simultaneously running uploads.
    pub max_concurrent_uploads: usize,
    /// Force one upload at a time regardless of `max_concurrent_uploads`.
    pub sequential_uploads: bool,
    /// Dispatch admitted files immediately instead of leaving them idle.
    pub auto_start: bool,
    /// Per-file size limit in megabytes.
    pub max_file_size_mb: f64,
    /// Maximum number of items tracked at once.
    pub max_files: usize,
    /// Optional override for the MIME allow-list.
    pub allowed_mime_types: Option<Vec<String>>,
    /// Optional static quota ceiling in bytes; enables quota checks when present.
    pub quota_max_bytes: Option<u64>,
    /// Bytes already consumed against the quota.
    pub quota_used_bytes: u64,
    /// Quota tier reported alongside quota decisions.
    pub quota_tier: QuotaTier,
    /// User identifier passed to the quota provider.
    pub quota_user_id: String,
}

impl Default for Config {
    fn default() -> Self {
        let policy = UploadPolicy::default();
        Self {
            upload_endpoint: None,
            upload_api_key: None,
            max_concurrent_uploads: policy.max_concurrent_uploads,
            sequential_uploads: policy.sequential,
            auto_start: true,
            max_file_size_mb: policy.max_file_size_mb,
            max_files: policy.max_files,
            allowed_mime_types: None,
            quota_max_bytes: None,
            quota_used_bytes: 0,
            quota_tier: QuotaTier::Free,
            quota_user_id: "local".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            upload_endpoint: load_env_optional("UPLOAD_ENDPOINT"),
            upload_api_key: load_env_optional("UPLOAD_API_KEY"),
            max_concurrent_uploads: parse_env("MAX_CONCURRENT_UPLOADS")?
                .unwrap_or(defaults.max_concurrent_uploads),
            sequential_uploads: parse_flag("SEQUENTIAL_UPLOADS")?
                .unwrap_or(defaults.sequential_uploads),
            auto_start: parse_flag("AUTO_START_UPLOADS")?.unwrap_or(defaults.auto_start),
            max_file_size_mb: parse_env("MAX_FILE_SIZE_MB")?.unwrap_or(defaults.max_file_size_mb),
            max_files: parse_env("MAX_FILES")?.unwrap_or(defaults.max_files),
            allowed_mime_types: load_env_optional("ALLOWED_MIME_TYPES").map(|value| {
                value
                    .split(',')
                    .map(|item| item.trim().to_lowercase())
                    .filter(|item| !item.is_empty())
                    .collect()
            }),
            quota_max_bytes: parse_env("QUOTA_MAX_BYTES")?,
            quota_used_bytes: parse_env("QUOTA_USED_BYTES")?.unwrap_or(0),
            quota_tier: load_env_optional("QUOTA_TIER")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("QUOTA_TIER".into()))
                })
                .transpose()?
                .unwrap_or(defaults.quota_tier),
            quota_user_id: load_env_optional("QUOTA_USER_ID").unwrap_or(defaults.quota_user_id),
        })
    }

    /// Build the validation policy described by this configuration.
    pub fn policy(&self) -> UploadPolicy {
        let mut policy = UploadPolicy {
            max_file_size_mb: self.max_file_size_mb,
            max_files: self.max_files,
            max_concurrent_uploads: self.max_concurrent_uploads,
            sequential: self.sequential_uploads,
            ..UploadPolicy::default()
        };
        if let Some(types) = &self.allowed_mime_types {
            policy.allowed_types = types.clone();
        }
        policy
    }

    /// Build the static quota provider, if a ceiling was configured.
    pub fn quota(&self) -> Option<StaticQuota> {
        self.quota_max_bytes
            .map(|max| StaticQuota::new(self.quota_tier, self.quota_used_bytes, max))
    }

    /// Build the validation gate, attaching the quota provider when one is configured.
    pub fn validator(&self) -> Validator {
        let validator = Validator::new(self.policy());
        match self.quota() {
            Some(quota) => validator.with_quota(Arc::new(quota), self.quota_user_id.clone()),
            None => validator,
        }
    }

    /// Return the upload endpoint or a descriptive error when it is missing.
    pub fn require_endpoint(&self) -> Result<&str, ConfigError> {
        self.upload_endpoint
            .as_deref()
            .ok_or_else(|| ConfigError::MissingVariable("UPLOAD_ENDPOINT".to_string()))
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_flag(key: &str) -> Result<Option<bool>, ConfigError> {
    load_env_optional(key)
        .map(|value| match value.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        })
        .transpose()
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        endpoint = ?config.upload_endpoint,
        max_concurrent = config.max_concurrent_uploads,
        sequential = config.sequential_uploads,
        max_file_size_mb = config.max_file_size_mb,
        quota_enabled = config.quota_max_bytes.is_some(),
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_default_policy() {
        let config = Config::default();
        let policy = config.policy();
        assert_eq!(policy.max_concurrent_uploads, 3);
        assert_eq!(policy.concurrency_cap(), 3);
        assert!(config.quota().is_none());
    }

    #[test]
    fn sequential_config_forces_single_slot() {
        let config = Config {
            sequential_uploads: true,
            max_concurrent_uploads: 8,
            ..Config::default()
        };
        assert_eq!(config.policy().concurrency_cap(), 1);
    }

    #[test]
    fn allowed_types_override_replaces_defaults() {
        let config = Config {
            allowed_mime_types: Some(vec!["application/pdf".into()]),
            ..Config::default()
        };
        assert_eq!(config.policy().allowed_types, vec!["application/pdf"]);
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let error = Config::default().require_endpoint().unwrap_err();
        assert!(error.to_string().contains("UPLOAD_ENDPOINT"));
    }
}
