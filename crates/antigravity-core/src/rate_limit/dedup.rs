//! Deduplication and exponential escalation of rate-limit observations.
//!
//! Keyed by (account email, model id). A process-wide singleton per spec
//! §9 ("global state... document them as singletons with an explicit
//! background sweeper"); the pool owns one instance and a background task
//! sweeps it every 60s.

use dashmap::DashMap;

const DEDUP_WINDOW_MS: i64 = 2_000;
const IDLE_RESET_MS: i64 = 120_000;
const MAX_ESCALATED_DELAY_MS: i64 = 60_000;

#[derive(Debug, Clone, Copy)]
struct DedupEntry {
    last_429_at_ms: i64,
    consecutive_count: u32,
}

/// Outcome of recording one rate-limit observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitOutcome {
    /// A second 429 arrived within the dedup window for this key — the
    /// caller should switch accounts instead of retrying.
    Duplicate { delay_ms: i64 },
    /// A fresh or escalated rate limit, with its consecutive attempt count.
    Escalated { delay_ms: i64, attempt: u32 },
}

/// Process-wide rate-limit dedup/escalation table.
#[derive(Debug, Default)]
pub struct RateLimitDedup {
    state: DashMap<(String, String), DedupEntry>,
}

impl RateLimitDedup {
    pub fn new() -> Self {
        Self { state: DashMap::new() }
    }

    /// Record a 429 for `(email, model)` with `base_delay_ms` as the
    /// server/smart-backoff-computed delay, returning whether this is a
    /// duplicate within the dedup window or a fresh/escalated observation.
    pub fn record(
        &self,
        email: &str,
        model: &str,
        base_delay_ms: i64,
        now_ms: i64,
    ) -> RateLimitOutcome {
        let key = (email.to_string(), model.to_string());
        let mut entry = self.state.entry(key).or_insert(DedupEntry {
            last_429_at_ms: now_ms - IDLE_RESET_MS - 1,
            consecutive_count: 0,
        });

        let elapsed = now_ms - entry.last_429_at_ms;

        if elapsed < DEDUP_WINDOW_MS && entry.consecutive_count > 0 {
            entry.last_429_at_ms = now_ms;
            return RateLimitOutcome::Duplicate { delay_ms: base_delay_ms };
        }

        if elapsed > IDLE_RESET_MS {
            entry.consecutive_count = 1;
        } else {
            entry.consecutive_count = entry.consecutive_count.saturating_add(1);
        }
        entry.last_429_at_ms = now_ms;

        let escalated = base_delay_ms.saturating_mul(
            1_i64.checked_shl(entry.consecutive_count.saturating_sub(1)).unwrap_or(i64::MAX),
        );
        let delay_ms = base_delay_ms.max(escalated).min(MAX_ESCALATED_DELAY_MS);

        RateLimitOutcome::Escalated { delay_ms, attempt: entry.consecutive_count }
    }

    /// Drop entries idle for longer than the reset interval. Intended to
    /// run on a periodic background sweeper (spec: every 60s).
    pub fn sweep(&self, now_ms: i64) {
        self.state.retain(|_, entry| now_ms - entry.last_429_at_ms <= IDLE_RESET_MS);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.state.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_429_within_window_is_duplicate() {
        let dedup = RateLimitDedup::new();
        let first = dedup.record("a@x.com", "gemini-3-pro", 1_000, 0);
        assert!(matches!(first, RateLimitOutcome::Escalated { attempt: 1, .. }));

        let second = dedup.record("a@x.com", "gemini-3-pro", 1_000, 500);
        assert!(matches!(second, RateLimitOutcome::Duplicate { .. }));
    }

    #[test]
    fn escalation_doubles_and_clamps_at_ceiling() {
        let dedup = RateLimitDedup::new();
        let _ = dedup.record("a@x.com", "gemini-3-pro", 10_000, 0);
        let second = dedup.record("a@x.com", "gemini-3-pro", 10_000, 3_000);
        assert_eq!(second, RateLimitOutcome::Escalated { delay_ms: 20_000, attempt: 2 });

        let third = dedup.record("a@x.com", "gemini-3-pro", 10_000, 6_000);
        assert_eq!(third, RateLimitOutcome::Escalated { delay_ms: 40_000, attempt: 3 });

        let fourth = dedup.record("a@x.com", "gemini-3-pro", 10_000, 9_000);
        assert_eq!(fourth, RateLimitOutcome::Escalated { delay_ms: 60_000, attempt: 4 });
    }

    #[test]
    fn idle_beyond_two_minutes_resets_state() {
        let dedup = RateLimitDedup::new();
        let _ = dedup.record("a@x.com", "gemini-3-pro", 10_000, 0);
        let after_idle = dedup.record("a@x.com", "gemini-3-pro", 10_000, 200_000);
        assert_eq!(after_idle, RateLimitOutcome::Escalated { delay_ms: 10_000, attempt: 1 });
    }

    #[test]
    fn sweep_drops_idle_entries() {
        let dedup = RateLimitDedup::new();
        let _ = dedup.record("a@x.com", "gemini-3-pro", 10_000, 0);
        dedup.sweep(500_000);
        assert_eq!(dedup.len(), 0);
    }
}
