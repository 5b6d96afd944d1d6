//! Per-model quota snapshot.

use serde::{Deserialize, Serialize};

/// A single model's quota snapshot as last reported by upstream.
///
/// `fraction_remaining` is a fraction in `[0, 1)` (data model invariant iv).
/// `reset_instant` is the absolute timestamp quota is expected to refill;
/// `observed_at` is when this snapshot was taken, used to decide staleness
/// independently of the reset time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct ModelQuota {
    pub fraction_remaining: f64,
    pub reset_instant: i64,
    pub observed_at: i64,
}

impl ModelQuota {
    pub fn new(fraction_remaining: f64, reset_instant: i64) -> Self {
        Self {
            fraction_remaining: fraction_remaining.clamp(0.0, 0.999_999),
            reset_instant,
            observed_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Whether this snapshot is still within `max_age_secs` of its capture.
    pub fn is_fresh(&self, now: i64, max_age_secs: i64) -> bool {
        now.saturating_sub(self.observed_at) <= max_age_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_is_clamped_below_one() {
        let quota = ModelQuota::new(1.5, 0);
        assert!(quota.fraction_remaining < 1.0);
    }

    #[test]
    fn staleness_is_relative_to_observed_at() {
        let quota = ModelQuota { fraction_remaining: 0.5, reset_instant: 0, observed_at: 100 };
        assert!(quota.is_fresh(200, 300));
        assert!(!quota.is_fresh(500, 300));
    }
}
