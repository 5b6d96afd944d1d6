//! Account Pool Manager (spec §4.E): central pool state, availability
//! queries, cooldown bookkeeping, and strategy dispatch.
//!
//! Grounded in the teacher's `proxy/token_manager/mod.rs`, whose
//! `DashMap<String, ProxyToken>` plus a single `RwLock<SmartRoutingConfig>`
//! is the same shape used here: a concurrent per-email map for account
//! state, and one lock guarding the strategy's own bookkeeping so a
//! strategy swap can't race a selection.

use std::sync::Arc;

use antigravity_types::models::{Account, StrategyKind};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::account::AccountStore;
use crate::error::DispatchResult;

use super::config::PoolConfig;
use super::strategies::{SelectContext, Selection, SelectionStrategy, Strategy, StrategyState};

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Result of [`AccountPool::select_account`].
#[derive(Debug, Clone)]
pub struct PoolSelection {
    pub account: Option<Account>,
    pub wait_ms: Option<i64>,
    /// Small pre-request delay the hybrid strategy applies after relaxing
    /// a filter. Zero for every other strategy and every primary-tier pick.
    pub throttle_ms: i64,
}

/// Owns the live account map and the active strategy's bookkeeping.
/// Mutating methods each touch exactly the entries they need to (DashMap's
/// per-shard locking); the strategy lock serialises selection and strategy
/// swaps so bookkeeping never observes a half-reset state.
pub struct AccountPool {
    accounts: DashMap<String, Account>,
    strategy: RwLock<(Strategy, StrategyState)>,
    store: Arc<AccountStore>,
    config: PoolConfig,
}

impl AccountPool {
    /// Build a pool from an already-loaded account list.
    pub fn new(store: Arc<AccountStore>, accounts: Vec<Account>, kind: StrategyKind, config: PoolConfig) -> Self {
        let map = DashMap::new();
        for account in accounts {
            map.insert(account.email.clone(), account);
        }
        Self { accounts: map, strategy: RwLock::new((Strategy::new(kind), StrategyState::new())), store, config }
    }

    /// Build a pool by reading the current contents of `store`.
    pub async fn from_store(store: Arc<AccountStore>, kind: StrategyKind, config: PoolConfig) -> Self {
        let accounts = store.list().await;
        Self::new(store, accounts, kind, config)
    }

    /// Switch the active strategy, resetting its bookkeeping (spec §3 pool
    /// invariant: "strategy state resets on strategy change").
    pub async fn set_strategy(&self, kind: StrategyKind) {
        let mut guard = self.strategy.write().await;
        *guard = (Strategy::new(kind), StrategyState::new());
    }

    pub async fn active_strategy(&self) -> StrategyKind {
        self.strategy.read().await.0.kind()
    }

    fn snapshot(&self) -> Vec<Account> {
        self.accounts.iter().map(|entry| entry.value().clone()).collect()
    }

    fn sweep_expired_rate_limits(&self, now: i64) {
        for mut entry in self.accounts.iter_mut() {
            entry.value_mut().sweep_expired_rate_limits(now);
        }
    }

    /// Ask the active strategy for an account to use for `model`, sweeping
    /// expired rate-limit marks first.
    pub async fn select_account(&self, model: &str) -> PoolSelection {
        let now = now_ts();
        self.sweep_expired_rate_limits(now);
        let accounts = self.snapshot();

        let mut guard = self.strategy.write().await;
        let (strategy, state) = &mut *guard;
        let ctx = SelectContext { accounts: &accounts, model, now, config: &self.config };

        match strategy.select(&ctx, state) {
            Selection::Account { email, throttle_ms } => {
                let account = self.accounts.get(&email).map(|entry| entry.value().clone());
                PoolSelection { account, wait_ms: None, throttle_ms }
            }
            Selection::Wait { wait_ms } => PoolSelection { account: None, wait_ms: Some(wait_ms), throttle_ms: 0 },
        }
    }

    /// Accounts currently eligible for `model` (enabled, not invalid, not
    /// rate-limited) — a read-only snapshot, independent of strategy state.
    pub fn get_available_accounts(&self, model: &str) -> Vec<Account> {
        let now = now_ts();
        self.accounts
            .iter()
            .filter(|entry| entry.value().is_selectable() && !entry.value().is_rate_limited_for(model, now))
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Whether every enabled, non-invalid account is currently rate-limited
    /// for `model`. `false` on an empty pool (that's a fatal condition, not
    /// a rate-limit one).
    pub fn is_all_rate_limited(&self, model: &str) -> bool {
        let now = now_ts();
        let mut saw_any = false;
        let mut all_limited = true;
        for entry in self.accounts.iter() {
            if !entry.value().is_selectable() {
                continue;
            }
            saw_any = true;
            if !entry.value().is_rate_limited_for(model, now) {
                all_limited = false;
            }
        }
        saw_any && all_limited
    }

    /// Smallest rate-limit wait across selectable accounts for `model`, or
    /// 0 if none are currently rate-limited.
    pub fn get_min_wait_time_ms(&self, model: &str) -> i64 {
        let now = now_ts();
        self.accounts
            .iter()
            .filter(|entry| entry.value().is_selectable())
            .map(|entry| entry.value().rate_limit_wait_ms(model, now))
            .filter(|wait| *wait > 0)
            .min()
            .unwrap_or(0)
    }

    /// Mark `email` rate-limited for `model` until `delay_ms` from now,
    /// bumping its consecutive-failure counter (handled by
    /// `Account::mark_rate_limited` itself).
    pub async fn mark_rate_limited(&self, email: &str, delay_ms: i64, model: &str) -> DispatchResult<()> {
        let now = now_ts();
        let reset_instant = now + (delay_ms.max(0) as f64 / 1000.0).ceil() as i64;
        let updated = {
            let mut entry = match self.accounts.get_mut(email) {
                Some(entry) => entry,
                None => return Ok(()),
            };
            entry.value_mut().mark_rate_limited(model, reset_instant);
            entry.value().clone()
        };
        self.store.upsert(updated).await?;
        Ok(())
    }

    /// Record a successful call: clears the (account, model) rate-limit
    /// entry, resets the consecutive-failure counter, bumps `last_used`,
    /// and notifies the active strategy.
    pub async fn notify_success(&self, email: &str, model: &str) -> DispatchResult<()> {
        let now = now_ts();
        let updated = {
            let mut entry = match self.accounts.get_mut(email) {
                Some(entry) => entry,
                None => return Ok(()),
            };
            entry.value_mut().clear_rate_limit(model);
            entry.value_mut().notify_success();
            entry.value().clone()
        };
        self.store.upsert(updated).await?;

        let mut guard = self.strategy.write().await;
        let (strategy, state) = &mut *guard;
        strategy.notify_success(state, email, model, now, &self.config);
        Ok(())
    }

    /// Strategy-hook-only notification; does not mutate account state
    /// itself (the caller is expected to have already called
    /// [`Self::mark_rate_limited`] if a rate-limit entry should be set).
    pub async fn notify_rate_limit(&self, email: &str, model: &str) {
        let now = now_ts();
        let mut guard = self.strategy.write().await;
        let (strategy, state) = &mut *guard;
        strategy.notify_rate_limit(state, email, model, now, &self.config);
    }

    /// Strategy-hook-only notification for non-rate-limit failures.
    pub async fn notify_failure(&self, email: &str, model: &str) {
        let now = now_ts();
        let mut guard = self.strategy.write().await;
        let (strategy, state) = &mut *guard;
        strategy.notify_failure(state, email, model, now, &self.config);
    }

    /// Permanently disable `email`, e.g. after a `PERMANENT_AUTH` failure.
    pub async fn mark_invalid(&self, email: &str, reason: impl Into<String>) -> DispatchResult<()> {
        let reason = reason.into();
        let updated = {
            let mut entry = match self.accounts.get_mut(email) {
                Some(entry) => entry,
                None => return Ok(()),
            };
            entry.value_mut().mark_invalid(reason);
            entry.value().clone()
        };
        self.store.upsert(updated).await?;
        Ok(())
    }

    /// Clear every rate-limit entry on every account (spec §4.G: invoked
    /// once, optimistically, when a dispatch attempt begins against an
    /// apparently fully rate-limited pool).
    pub async fn reset_all_rate_limits(&self) -> DispatchResult<()> {
        let emails: Vec<String> = self.accounts.iter().map(|entry| entry.key().clone()).collect();
        for email in emails {
            let updated = {
                let mut entry = match self.accounts.get_mut(&email) {
                    Some(entry) => entry,
                    None => continue,
                };
                entry.value_mut().rate_limits.clear();
                entry.value().clone()
            };
            self.store.upsert(updated).await?;
        }
        Ok(())
    }

    /// Flush the in-memory account map to disk via the credential store.
    pub async fn save_to_disk(&self) -> DispatchResult<()> {
        for account in self.snapshot() {
            self.store.upsert(account).await?;
        }
        Ok(())
    }

    /// Re-read the credential store (which itself preserves transient
    /// fields by email) and resync the in-memory map from it.
    pub async fn reload(&self) -> DispatchResult<()> {
        self.store.reload().await?;
        let refreshed = self.store.list().await;
        self.accounts.clear();
        for account in refreshed {
            self.accounts.insert(account.email.clone(), account);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_types::models::CredentialKind;

    fn account(email: &str) -> Account {
        Account::new(email.to_string(), CredentialKind::OauthRefresh, "rt".to_string())
    }

    async fn pool_with(accounts: Vec<Account>) -> AccountPool {
        let dir = tempfile::tempdir().unwrap();
        let store = AccountStore::load(dir.path().join("accounts.json"), 10).await.unwrap();
        for account in &accounts {
            store.upsert(account.clone()).await.unwrap();
        }
        AccountPool::new(Arc::new(store), accounts, StrategyKind::RoundRobin, PoolConfig::default())
    }

    #[tokio::test]
    async fn mark_rate_limited_then_expires_is_available_again() {
        let pool = pool_with(vec![account("a@x.com")]).await;
        pool.mark_rate_limited("a@x.com", 1_000, "gemini-3-pro").await.unwrap();
        assert!(pool.is_all_rate_limited("gemini-3-pro"));

        // Simulate the clock moving past the reset instant by sweeping with
        // a far-future now via a second pool built from the persisted state.
        let stored = pool.store.get("a@x.com").await.unwrap();
        let wait = stored.rate_limit_wait_ms("gemini-3-pro", now_ts() + 2);
        assert_eq!(wait, 0);
    }

    #[tokio::test]
    async fn notify_success_clears_consecutive_failures() {
        let pool = pool_with(vec![account("a@x.com")]).await;
        pool.mark_rate_limited("a@x.com", 1_000, "gemini-3-pro").await.unwrap();
        pool.notify_success("a@x.com", "gemini-3-pro").await.unwrap();

        let account = pool.store.get("a@x.com").await.unwrap();
        assert_eq!(account.consecutive_failures, 0);
        assert!(!account.rate_limits.contains_key("gemini-3-pro"));
    }

    #[tokio::test]
    async fn is_all_rate_limited_false_for_empty_pool() {
        let pool = pool_with(vec![]).await;
        assert!(!pool.is_all_rate_limited("gemini-3-pro"));
    }

    #[tokio::test]
    async fn select_account_round_robins_between_two() {
        let pool = pool_with(vec![account("a@x.com"), account("b@x.com")]).await;
        let first = pool.select_account("gemini-3-pro").await;
        let second = pool.select_account("gemini-3-pro").await;
        assert_ne!(first.account.unwrap().email, second.account.unwrap().email);
    }
}
