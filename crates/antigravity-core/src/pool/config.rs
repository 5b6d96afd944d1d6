//! Tunables for the hybrid scoring formula and pool-wide thresholds.
//!
//! Values match the defaults named in the spec exactly; everything here is
//! a plain, overridable struct rather than a hardcoded constant, per the
//! "no name is special-cased in code" ambient design note.

/// Weights in the hybrid score `w_h*H + w_t*(T/T_max*100) + w_q*Q + w_lru*L`.
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub health: f64,
    pub token_bucket: f64,
    pub quota: f64,
    pub lru: f64,
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self { health: 2.0, token_bucket: 5.0, quota: 3.0, lru: 0.1 }
    }
}

/// Health-score bookkeeping thresholds.
#[derive(Debug, Clone, Copy)]
pub struct HealthConfig {
    pub start: f64,
    pub success_delta: f64,
    pub rate_limit_delta: f64,
    pub failure_delta: f64,
    pub recovery_per_hour: f64,
    pub floor: f64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            start: 70.0,
            success_delta: 1.0,
            rate_limit_delta: -10.0,
            failure_delta: -20.0,
            recovery_per_hour: 10.0,
            floor: 50.0,
        }
    }
}

/// Token-bucket capacity/refill for the hybrid strategy's burst limiter.
#[derive(Debug, Clone, Copy)]
pub struct TokenBucketConfig {
    pub capacity: f64,
    pub refill_per_minute: f64,
}

impl Default for TokenBucketConfig {
    fn default() -> Self {
        Self { capacity: 50.0, refill_per_minute: 6.0 }
    }
}

/// Quota-awareness thresholds for the hybrid strategy.
#[derive(Debug, Clone, Copy)]
pub struct QuotaConfig {
    pub critical_threshold: f64,
    pub low_threshold: f64,
    pub stale_after_secs: i64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self { critical_threshold: 0.05, low_threshold: 0.10, stale_after_secs: 300 }
    }
}

/// Throttle applied when the hybrid strategy has to relax a filter to find
/// any candidate at all.
#[derive(Debug, Clone, Copy)]
pub struct RelaxationConfig {
    pub emergency_throttle_ms: i64,
    pub last_resort_throttle_ms: i64,
}

impl Default for RelaxationConfig {
    fn default() -> Self {
        Self { emergency_throttle_ms: 250, last_resort_throttle_ms: 500 }
    }
}

/// Sticky-strategy tunables.
#[derive(Debug, Clone, Copy)]
pub struct StickyConfig {
    /// Waits at or below this are absorbed by returning `Selection::Wait`
    /// instead of switching accounts.
    pub max_absorbed_wait_ms: i64,
}

impl Default for StickyConfig {
    fn default() -> Self {
        Self { max_absorbed_wait_ms: 120_000 }
    }
}

/// All pool-level tunables in one place.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolConfig {
    pub hybrid_weights: HybridWeights,
    pub health: HealthConfig,
    pub token_bucket: TokenBucketConfig,
    pub quota: QuotaConfig,
    pub relaxation: RelaxationConfig,
    pub sticky: StickyConfig,
}
