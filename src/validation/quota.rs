//! Storage quota lookups used by the last validation stage.

use serde::{Deserialize, Serialize};

/// Subscription tier reported with quota decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaTier {
    /// Free plan.
    #[default]
    Free,
    /// Paid individual plan.
    Pro,
    /// Organisation plan.
    Enterprise,
}

impl std::str::FromStr for QuotaTier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "enterprise" => Ok(Self::Enterprise),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for QuotaTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        };
        f.write_str(label)
    }
}

/// Answer returned by a [`QuotaProvider`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaDecision {
    /// Whether the requested bytes fit in the remaining quota.
    pub allowed: bool,
    /// Bytes already consumed.
    pub current_usage: u64,
    /// Quota ceiling in bytes.
    pub max_quota: u64,
    /// Tier the ceiling belongs to.
    pub tier: QuotaTier,
}

impl QuotaDecision {
    /// Bytes still available before the ceiling.
    pub fn remaining(&self) -> u64 {
        self.max_quota.saturating_sub(self.current_usage)
    }
}

/// Source of per-user storage ceilings.
pub trait QuotaProvider: Send + Sync {
    /// Decide whether `file_size` more bytes fit in the user's quota.
    fn check(&self, user_id: &str, file_size: u64) -> QuotaDecision;
}

/// Fixed quota shared by every user; suitable for single-user hosts and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticQuota {
    /// Tier label.
    pub tier: QuotaTier,
    /// Bytes already consumed.
    pub current_usage_bytes: u64,
    /// Ceiling in bytes.
    pub max_quota_bytes: u64,
}

impl StaticQuota {
    /// Build a static quota.
    pub fn new(tier: QuotaTier, current_usage_bytes: u64, max_quota_bytes: u64) -> Self {
        Self {
            tier,
            current_usage_bytes,
            max_quota_bytes,
        }
    }
}

impl QuotaProvider for StaticQuota {
    fn check(&self, _user_id: &str, file_size: u64) -> QuotaDecision {
        QuotaDecision {
            allowed: self.current_usage_bytes.saturating_add(file_size) <= self.max_quota_bytes,
            current_usage: self.current_usage_bytes,
            max_quota: self.max_quota_bytes,
            tier: self.tier,
        }
    }
}
