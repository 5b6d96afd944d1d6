//! Dispatch pipeline tunables (spec §4.G, §9's cooldown Open Question).

/// Progressive backoff tiers for model-capacity-exhausted retries on the
/// same endpoint, clamped at the last value once exhausted.
pub const CAPACITY_BACKOFF_TIERS_MS: [i64; 5] = [5_000, 10_000, 20_000, 30_000, 60_000];

/// Backoff tiers for an empty/truncated streaming response.
pub const EMPTY_RESPONSE_RETRY_DELAYS_MS: [i64; 3] = [500, 1_000, 2_000];

#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Floor on `maxAttempts`; the effective value is
    /// `max(max_retries, account_count + 1)`.
    pub max_retries: u32,
    /// A first rate limit at or below this cooldown retries the same
    /// endpoint instead of switching accounts.
    pub quick_retry_cooldown_ms: i64,
    /// Cooldown applied once `consecutive_failures` crosses the network
    /// error threshold.
    pub extended_cooldown_ms: i64,
    /// Consecutive network-error count that triggers `extended_cooldown_ms`.
    pub consecutive_failure_threshold: u32,
    /// Cap on same-endpoint capacity-exhausted retries before switching
    /// accounts.
    pub max_capacity_retries: u32,
    /// Delay inserted before switching accounts after a long-term
    /// rate-limit/quota observation.
    pub switch_account_delay_ms: i64,
    /// Maximum time a caller will wait on a rate-limited pool before this
    /// dispatch either falls back to another model family or fails.
    pub max_wait_before_error_ms: i64,
    /// Retry budget for an empty/truncated streaming response.
    pub max_empty_response_retries: u32,
    /// Whether cross-model fallback is permitted at all (the `FALLBACK`
    /// environment variable in spec §6).
    pub fallback_enabled: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            quick_retry_cooldown_ms: 10_000,
            extended_cooldown_ms: 60_000,
            consecutive_failure_threshold: 3,
            max_capacity_retries: 5,
            switch_account_delay_ms: 5_000,
            max_wait_before_error_ms: 120_000,
            max_empty_response_retries: 3,
            fallback_enabled: true,
        }
    }
}
