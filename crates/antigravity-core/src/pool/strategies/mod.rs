//! Selection Strategy Set (spec §4.D): Sticky, Round-Robin, Hybrid.
//!
//! Modeled as a trait plus an enum of concrete implementations rather than
//! `dyn`-dispatched subclasses — the pool owns exactly one active strategy
//! at a time, selected by [`antigravity_types::models::StrategyKind`].
//! Strategies read account state but never mutate it directly; their own
//! bookkeeping (cursor, health score, token bucket) lives in [`StrategyState`]
//! behind the pool's lock.

mod hybrid;
mod round_robin;
mod sticky;

pub use hybrid::HybridStrategy;
pub use round_robin::RoundRobinStrategy;
pub use sticky::StickyStrategy;

use std::collections::HashMap;

use antigravity_types::models::{Account, StrategyKind};

use crate::pool::config::PoolConfig;

/// Outcome of a strategy's `select` call.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// An account was chosen. `throttle_ms` is a small pre-request delay
    /// the hybrid strategy applies when it had to relax a filter.
    Account { email: String, throttle_ms: i64 },
    /// No account should be used yet; sleep this long and retry selection.
    Wait { wait_ms: i64 },
}

#[derive(Debug, Clone, Copy, Default)]
struct HealthEntry {
    score: f64,
    last_event_at: i64,
}

#[derive(Debug, Clone, Copy, Default)]
struct TokenBucketEntry {
    tokens: f64,
    last_refill_at: i64,
}

/// Mutable bookkeeping owned by the strategies, reset whenever the active
/// strategy changes (spec §3 pool invariant: "strategy state resets on
/// strategy change").
#[derive(Debug, Default)]
pub struct StrategyState {
    /// Last account used per model, for sticky affinity.
    sticky_last_used: HashMap<String, String>,
    /// Round-robin cursor into the sorted-by-email account list.
    round_robin_cursor: usize,
    health: HashMap<String, HealthEntry>,
    token_buckets: HashMap<String, TokenBucketEntry>,
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    fn health_for(&mut self, email: &str, now: i64, config: &PoolConfig) -> f64 {
        let entry = self.health.entry(email.to_string()).or_insert(HealthEntry {
            score: config.health.start,
            last_event_at: now,
        });
        let idle_hours = (now - entry.last_event_at).max(0) as f64 / 3600.0;
        let recovered = (entry.score + idle_hours * config.health.recovery_per_hour).min(100.0);
        entry.score = recovered;
        entry.last_event_at = now;
        recovered.clamp(0.0, 100.0)
    }

    fn adjust_health(&mut self, email: &str, now: i64, delta: f64, config: &PoolConfig) {
        let current = self.health_for(email, now, config);
        let entry = self.health.get_mut(email).expect("populated by health_for");
        entry.score = (current + delta).clamp(0.0, 100.0);
        entry.last_event_at = now;
    }

    fn tokens_for(&mut self, email: &str, now: i64, config: &PoolConfig) -> f64 {
        let entry = self.token_buckets.entry(email.to_string()).or_insert(TokenBucketEntry {
            tokens: config.token_bucket.capacity,
            last_refill_at: now,
        });
        let elapsed_min = (now - entry.last_refill_at).max(0) as f64 / 60.0;
        let refilled =
            (entry.tokens + elapsed_min * config.token_bucket.refill_per_minute).min(config.token_bucket.capacity);
        entry.tokens = refilled;
        entry.last_refill_at = now;
        refilled
    }

    fn consume_token(&mut self, email: &str, now: i64, config: &PoolConfig) {
        let _ = self.tokens_for(email, now, config);
        if let Some(entry) = self.token_buckets.get_mut(email) {
            entry.tokens = (entry.tokens - 1.0).max(0.0);
        }
    }
}

/// Read-only context a strategy needs to make a decision: the full account
/// set and the current clock, passed explicitly so strategies stay pure
/// with respect to anything but [`StrategyState`].
pub struct SelectContext<'a> {
    pub accounts: &'a [Account],
    pub model: &'a str,
    pub now: i64,
    pub config: &'a PoolConfig,
}

/// Shared interface implemented by each concrete strategy.
pub trait SelectionStrategy {
    fn select(&self, ctx: &SelectContext<'_>, state: &mut StrategyState) -> Selection;
    fn notify_success(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig);
    fn notify_rate_limit(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig);
    fn notify_failure(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig);
}

/// The active strategy, tagged by [`StrategyKind`] with no `dyn` indirection.
pub enum Strategy {
    Sticky(StickyStrategy),
    RoundRobin(RoundRobinStrategy),
    Hybrid(HybridStrategy),
}

impl Strategy {
    pub fn new(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Sticky => Self::Sticky(StickyStrategy),
            StrategyKind::RoundRobin => Self::RoundRobin(RoundRobinStrategy),
            StrategyKind::Hybrid => Self::Hybrid(HybridStrategy),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Sticky(_) => StrategyKind::Sticky,
            Self::RoundRobin(_) => StrategyKind::RoundRobin,
            Self::Hybrid(_) => StrategyKind::Hybrid,
        }
    }
}

impl SelectionStrategy for Strategy {
    fn select(&self, ctx: &SelectContext<'_>, state: &mut StrategyState) -> Selection {
        match self {
            Self::Sticky(s) => s.select(ctx, state),
            Self::RoundRobin(s) => s.select(ctx, state),
            Self::Hybrid(s) => s.select(ctx, state),
        }
    }

    fn notify_success(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig) {
        match self {
            Self::Sticky(s) => s.notify_success(state, email, model, now, config),
            Self::RoundRobin(s) => s.notify_success(state, email, model, now, config),
            Self::Hybrid(s) => s.notify_success(state, email, model, now, config),
        }
    }

    fn notify_rate_limit(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig) {
        match self {
            Self::Sticky(s) => s.notify_rate_limit(state, email, model, now, config),
            Self::RoundRobin(s) => s.notify_rate_limit(state, email, model, now, config),
            Self::Hybrid(s) => s.notify_rate_limit(state, email, model, now, config),
        }
    }

    fn notify_failure(&self, state: &mut StrategyState, email: &str, model: &str, now: i64, config: &PoolConfig) {
        match self {
            Self::Sticky(s) => s.notify_failure(state, email, model, now, config),
            Self::RoundRobin(s) => s.notify_failure(state, email, model, now, config),
            Self::Hybrid(s) => s.notify_failure(state, email, model, now, config),
        }
    }
}

/// Accounts eligible for any strategy at all: enabled, not invalid, and not
/// currently rate-limited for `model`.
pub(crate) fn base_eligible<'a>(accounts: &'a [Account], model: &str, now: i64) -> Vec<&'a Account> {
    accounts
        .iter()
        .filter(|a| a.is_selectable() && !a.is_rate_limited_for(model, now))
        .collect()
}

/// Minimum rate-limit wait across every tracked account for `model`, used
/// when no account is currently available.
pub(crate) fn min_wait_ms(accounts: &[Account], model: &str, now: i64) -> i64 {
    accounts
        .iter()
        .filter(|a| a.is_selectable())
        .map(|a| a.rate_limit_wait_ms(model, now))
        .filter(|wait| *wait > 0)
        .min()
        .unwrap_or(0)
}
