//! Account model: a single OAuth-backed (or API-key-backed) upstream identity.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::quota::ModelQuota;

/// How an account's credential material should be interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CredentialKind {
    /// Composite `<refresh-token>|<project-id>|<managed-project-id>` value.
    OauthRefresh,
    /// A static bearer API key.
    ApiKey,
    /// Refresh token is read from a local sqlite store at request time.
    LocalDb,
}

/// Subscription tier reported by the upstream, used by quota weighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Ultra,
    #[default]
    Unknown,
}

/// Per-(account, model) rate-limit bookkeeping.
///
/// `reset_instant` is an absolute unix timestamp, never a relative delay
/// (data model invariant iii).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RateLimitEntry {
    pub is_rate_limited: bool,
    pub reset_instant: i64,
}

impl RateLimitEntry {
    /// Whether this entry's rate limit has cleared as of `now`.
    pub fn has_expired(&self, now: i64) -> bool {
        !self.is_rate_limited || self.reset_instant <= now
    }
}

/// A single upstream identity: its credential, quota snapshot, and
/// dispatcher-owned health bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    /// Unique key.
    pub email: String,
    /// How to interpret `credential`.
    pub credential_kind: CredentialKind,
    /// Composite refresh token, raw API key, or (unused placeholder for
    /// local-db accounts, whose token is read from the local store).
    pub credential: String,
    /// Managed Cloud project id, once discovered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_project_id: Option<String>,
    /// Subscription tier as last observed.
    #[serde(default)]
    pub subscription_tier: SubscriptionTier,
    /// Per-model quota snapshot: fraction remaining in [0,1) plus the
    /// instant it was observed (not a reset time — see `ModelQuota`).
    #[serde(default)]
    pub quota: HashMap<String, ModelQuota>,
    /// Per-model rate-limit state.
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitEntry>,
    /// Whether the account is eligible for selection at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Sticky invalidation — set once credentials are permanently bad.
    #[serde(default)]
    pub is_invalid: bool,
    /// Why `is_invalid` was set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    /// Absolute instant of last successful or attempted use.
    #[serde(default)]
    pub last_used: i64,
    /// Consecutive non-success outcomes since the last success.
    #[serde(default)]
    pub consecutive_failures: u32,
    /// Account-level quota floor, overriding the pool default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_quota_threshold: Option<f64>,
    /// Per-model quota floors, overriding the account/pool default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_model_quota_thresholds: Option<HashMap<String, f64>>,
    /// Creation instant.
    pub created_at: i64,
}

const fn default_enabled() -> bool {
    true
}

impl Account {
    /// Create a new account with defaults for all dispatcher-owned state.
    pub fn new(email: String, credential_kind: CredentialKind, credential: String) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            email,
            credential_kind,
            credential,
            managed_project_id: None,
            subscription_tier: SubscriptionTier::Unknown,
            quota: HashMap::new(),
            rate_limits: HashMap::new(),
            enabled: true,
            is_invalid: false,
            invalid_reason: None,
            last_used: now,
            consecutive_failures: 0,
            account_quota_threshold: None,
            per_model_quota_thresholds: None,
            created_at: now,
        }
    }

    /// Whether this account may be returned by any selection strategy.
    /// Invariant (ii): an invalid account is never selected.
    pub const fn is_selectable(&self) -> bool {
        self.enabled && !self.is_invalid
    }

    /// Whether the account is currently rate-limited for `model`.
    pub fn is_rate_limited_for(&self, model: &str, now: i64) -> bool {
        self.rate_limits.get(model).is_some_and(|entry| !entry.has_expired(now))
    }

    /// Remaining rate-limit wait in milliseconds for `model`, or 0 if clear.
    pub fn rate_limit_wait_ms(&self, model: &str, now: i64) -> i64 {
        match self.rate_limits.get(model) {
            Some(entry) if !entry.has_expired(now) => {
                (entry.reset_instant - now).max(0).saturating_mul(1000)
            }
            _ => 0,
        }
    }

    /// Record a rate-limit hit for `model`, resetting at `reset_instant`.
    pub fn mark_rate_limited(&mut self, model: &str, reset_instant: i64) {
        self.rate_limits
            .insert(model.to_string(), RateLimitEntry { is_rate_limited: true, reset_instant });
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    /// Invariant (v): clear rate-limit state for (account, model) on success.
    pub fn clear_rate_limit(&mut self, model: &str) {
        self.rate_limits.remove(model);
    }

    /// Record a successful use of the account.
    pub fn notify_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_used = chrono::Utc::now().timestamp();
    }

    /// Mark this account permanently unusable.
    pub fn mark_invalid(&mut self, reason: impl Into<String>) {
        self.is_invalid = true;
        self.invalid_reason = Some(reason.into());
    }

    /// Clear every per-model rate-limit entry whose reset has passed.
    pub fn sweep_expired_rate_limits(&mut self, now: i64) {
        self.rate_limits.retain(|_, entry| !entry.has_expired(now));
    }

    /// Fraction remaining for `model`, or `None` if no snapshot exists or
    /// the snapshot is stale (data model: quota older than 5 minutes is
    /// treated as unknown by the hybrid strategy).
    pub fn quota_fraction(&self, model: &str, now: i64, max_age_secs: i64) -> Option<f64> {
        self.quota.get(model).and_then(|q| {
            if now.saturating_sub(q.observed_at) > max_age_secs {
                None
            } else {
                Some(q.fraction_remaining)
            }
        })
    }

    /// Minimum fraction remaining across all tracked models, ignoring
    /// stale snapshots.
    pub fn min_quota_fraction(&self, now: i64, max_age_secs: i64) -> Option<f64> {
        self.quota
            .values()
            .filter(|q| now.saturating_sub(q.observed_at) <= max_age_secs)
            .map(|q| q.fraction_remaining)
            .fold(None, |acc, f| Some(acc.map_or(f, |a: f64| a.min(f))))
    }
}

/// On-disk account index (`accounts.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountIndex {
    /// Schema version.
    pub version: String,
    /// Full account records.
    pub accounts: Vec<Account>,
    /// Email of the account treated as "active" by management tooling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_email: Option<String>,
}

impl AccountIndex {
    /// Create a new empty account index.
    pub fn new() -> Self {
        Self { version: "1.0".to_string(), accounts: Vec::new(), active_email: None }
    }
}

impl Default for AccountIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// Lightweight summary for listing endpoints that should not leak credential material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSummary {
    pub email: String,
    pub subscription_tier: SubscriptionTier,
    pub enabled: bool,
    pub is_invalid: bool,
    pub created_at: i64,
    pub last_used: i64,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            email: account.email.clone(),
            subscription_tier: account.subscription_tier,
            enabled: account.enabled,
            is_invalid: account.is_invalid,
            created_at: account.created_at,
            last_used: account.last_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_account() -> Account {
        Account::new("user@example.com".to_string(), CredentialKind::OauthRefresh, "rt|p|mp".to_string())
    }

    #[test]
    fn invalid_account_is_never_selectable() {
        let mut account = make_account();
        assert!(account.is_selectable());
        account.mark_invalid("revoked");
        assert!(!account.is_selectable());
    }

    #[test]
    fn rate_limit_clears_after_reset_instant() {
        let mut account = make_account();
        account.mark_rate_limited("gemini-3-pro", 1_000);
        assert!(account.is_rate_limited_for("gemini-3-pro", 500));
        assert!(!account.is_rate_limited_for("gemini-3-pro", 1_500));
    }

    #[test]
    fn success_resets_consecutive_failures_and_clears_rate_limit() {
        let mut account = make_account();
        account.mark_rate_limited("gemini-3-pro", 1_000);
        account.consecutive_failures = 4;
        account.clear_rate_limit("gemini-3-pro");
        account.notify_success();
        assert_eq!(account.consecutive_failures, 0);
        assert!(!account.is_rate_limited_for("gemini-3-pro", 0));
    }
}
