//! Statistics and monitoring models.

use super::Account;
use serde::{Deserialize, Serialize};

/// Proxy service status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProxyStatus {
    /// Whether the proxy is running
    pub running: bool,
    /// Port the proxy is listening on
    pub port: u16,
    /// Base URL for the proxy
    pub base_url: String,
    /// Number of active accounts in the pool
    pub active_accounts: usize,
}

/// Dashboard statistics derived from account data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DashboardStats {
    /// Total number of accounts
    pub total_accounts: usize,
    /// Average Gemini quota percentage
    pub avg_gemini_quota: i32,
    /// Average Claude quota percentage
    pub avg_claude_quota: i32,
    /// Number of accounts with low quota (< 20%)
    pub low_quota_count: usize,
    /// Number of Pro tier accounts
    pub pro_count: usize,
    /// Number of Ultra tier accounts
    pub ultra_count: usize,
    /// Number of Free tier accounts
    pub free_count: usize,
}

impl DashboardStats {
    /// Calculate statistics from a list of accounts.
    pub fn from_accounts(accounts: &[Account]) -> Self {
        let mut stats = Self { total_accounts: accounts.len(), ..Default::default() };

        if accounts.is_empty() {
            return stats;
        }

        let mut gemini_sum = 0i32;
        let mut claude_sum = 0i32;

        for account in accounts {
            for (model, quota) in &account.quota {
                let percent = (quota.fraction_remaining * 100.0) as i32;
                if model.contains("gemini") || model.contains("flash") {
                    gemini_sum += percent;
                }
                if model.contains("claude") {
                    claude_sum += percent;
                }
            }

            match account.subscription_tier {
                super::SubscriptionTier::Ultra => stats.ultra_count += 1,
                super::SubscriptionTier::Pro => stats.pro_count += 1,
                super::SubscriptionTier::Free | super::SubscriptionTier::Unknown => {
                    stats.free_count += 1;
                }
            }

            let any_low = account.quota.values().any(|q| q.fraction_remaining < 0.20);
            if any_low {
                stats.low_quota_count += 1;
            }
        }

        let n = accounts.len() as i32;
        if n > 0 {
            stats.avg_gemini_quota = gemini_sum / n;
            stats.avg_claude_quota = claude_sum / n;
        }

        stats
    }
}

/// Token refresh operation statistics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RefreshStats {
    /// Total accounts attempted
    pub total: usize,
    /// Successfully refreshed
    pub success: usize,
    /// Failed to refresh
    pub failed: usize,
}

/// Proxy request statistics (aggregate counters, not per-request logs).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ProxyStats {
    /// Total requests processed
    pub total_requests: u64,
    /// Successful requests
    #[serde(alias = "success_requests")]
    pub success_count: u64,
    /// Failed requests
    #[serde(alias = "failed_requests")]
    pub error_count: u64,
    /// Total input tokens processed (upstream-reported only)
    #[serde(default)]
    pub total_input_tokens: u64,
    /// Total output tokens generated (upstream-reported only)
    #[serde(default)]
    pub total_output_tokens: u64,
}

impl ProxyStats {
    /// Calculate success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 100.0;
        }
        (self.success_count as f64 / self.total_requests as f64) * 100.0
    }
}
