use antigravity_types::models::Account;

use super::{min_wait_ms, SelectContext, Selection, SelectionStrategy, StrategyState};
use crate::pool::config::PoolConfig;

/// Weighted multi-signal scoring: health, token-bucket headroom, quota
/// remaining, and time since last use. Filters progressively relax (token
/// bucket, then health) when the primary filter yields no candidate at all;
/// the quota-critical filter never relaxes.
pub struct HybridStrategy;

enum FilterTier {
    Primary,
    Emergency,
    LastResort,
}

impl HybridStrategy {
    fn quota_ok<'a>(&self, accounts: &[&'a Account], model: &str, now: i64, config: &PoolConfig) -> Vec<&'a Account> {
        accounts
            .iter()
            .filter(|a| {
                let model_fraction = a.quota_fraction(model, now, config.quota.stale_after_secs);
                let account_floor = a.min_quota_fraction(now, config.quota.stale_after_secs);
                let quota = model_fraction.or(account_floor);
                quota.map_or(true, |q| q >= config.quota.critical_threshold)
            })
            .copied()
            .collect()
    }

    fn candidates_for_tier<'a>(
        &self,
        quota_ok: &[&'a Account],
        state: &mut StrategyState,
        now: i64,
        config: &PoolConfig,
        tier: &FilterTier,
    ) -> Vec<&'a Account> {
        quota_ok
            .iter()
            .filter(|a| {
                let health_ok = matches!(tier, FilterTier::LastResort)
                    || state.health_for(&a.email, now, config) >= config.health.floor;
                let tokens_ok = matches!(tier, FilterTier::Emergency | FilterTier::LastResort)
                    || state.tokens_for(&a.email, now, config) >= 1.0;
                health_ok && tokens_ok
            })
            .copied()
            .collect()
    }

    fn score(&self, account: &Account, state: &mut StrategyState, model: &str, now: i64, config: &PoolConfig) -> f64 {
        let health = state.health_for(&account.email, now, config);
        let tokens = state.tokens_for(&account.email, now, config);
        let token_term = (tokens / config.token_bucket.capacity) * 100.0;

        let model_fraction = account.quota_fraction(model, now, config.quota.stale_after_secs);
        let account_floor = account.min_quota_fraction(now, config.quota.stale_after_secs);
        let quota_fraction = model_fraction.or(account_floor).unwrap_or(1.0);
        let quota_term = if quota_fraction < config.quota.low_threshold {
            quota_fraction * 100.0 * 0.5 // damped below the low-quota threshold
        } else {
            quota_fraction * 100.0
        };

        let minutes_since_use = (now - account.last_used).max(0) as f64 / 60.0;

        config.hybrid_weights.health * health
            + config.hybrid_weights.token_bucket * token_term
            + config.hybrid_weights.quota * quota_term
            + config.hybrid_weights.lru * minutes_since_use
    }
}

impl SelectionStrategy for HybridStrategy {
    fn select(&self, ctx: &SelectContext<'_>, state: &mut StrategyState) -> Selection {
        let base: Vec<&Account> = ctx
            .accounts
            .iter()
            .filter(|a| a.is_selectable() && !a.is_rate_limited_for(ctx.model, ctx.now))
            .collect();

        if base.is_empty() {
            return Selection::Wait { wait_ms: min_wait_ms(ctx.accounts, ctx.model, ctx.now) };
        }

        let quota_ok = self.quota_ok(&base, ctx.model, ctx.now, ctx.config);
        if quota_ok.is_empty() {
            return Selection::Wait { wait_ms: min_wait_ms(ctx.accounts, ctx.model, ctx.now) };
        }

        for (tier, throttle_ms) in [
            (FilterTier::Primary, 0),
            (FilterTier::Emergency, ctx.config.relaxation.emergency_throttle_ms),
            (FilterTier::LastResort, ctx.config.relaxation.last_resort_throttle_ms),
        ] {
            let candidates = self.candidates_for_tier(&quota_ok, state, ctx.now, ctx.config, &tier);
            if let Some(winner) = candidates
                .iter()
                .map(|a| (*a, self.score(a, state, ctx.model, ctx.now, ctx.config)))
                .max_by(|(_, a), (_, b)| a.total_cmp(b))
                .map(|(a, _)| a)
            {
                state.consume_token(&winner.email, ctx.now, ctx.config);
                return Selection::Account { email: winner.email.clone(), throttle_ms };
            }
        }

        Selection::Wait { wait_ms: min_wait_ms(ctx.accounts, ctx.model, ctx.now) }
    }

    fn notify_success(&self, state: &mut StrategyState, email: &str, _model: &str, now: i64, config: &PoolConfig) {
        state.adjust_health(email, now, config.health.success_delta, config);
    }

    fn notify_rate_limit(&self, state: &mut StrategyState, email: &str, _model: &str, now: i64, config: &PoolConfig) {
        state.adjust_health(email, now, config.health.rate_limit_delta, config);
    }

    fn notify_failure(&self, state: &mut StrategyState, email: &str, _model: &str, now: i64, config: &PoolConfig) {
        state.adjust_health(email, now, config.health.failure_delta, config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_types::models::CredentialKind;

    fn account(email: &str) -> Account {
        Account::new(email.to_string(), CredentialKind::OauthRefresh, "rt".to_string())
    }

    #[test]
    fn picks_highest_scoring_fresh_account() {
        let strategy = HybridStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let accounts = vec![account("a@x.com"), account("b@x.com")];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        let selection = strategy.select(&ctx, &mut state);
        assert!(matches!(selection, Selection::Account { .. }));
    }

    #[test]
    fn excludes_account_below_critical_quota_even_in_last_resort() {
        let strategy = HybridStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let mut low = account("a@x.com");
        low.quota.insert(
            "gemini-3-pro".to_string(),
            antigravity_types::models::ModelQuota::new(0.01, 0),
        );
        let accounts = vec![low];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        let selection = strategy.select(&ctx, &mut state);
        assert!(matches!(selection, Selection::Wait { .. }));
    }

    #[test]
    fn relaxes_token_bucket_filter_when_all_accounts_depleted() {
        let strategy = HybridStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let accounts = vec![account("a@x.com")];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        for _ in 0..(config.token_bucket.capacity as u32) {
            let _ = strategy.select(&ctx, &mut state);
        }
        // Bucket now empty; primary filter should fail but emergency relaxation succeeds.
        let selection = strategy.select(&ctx, &mut state);
        assert_eq!(
            selection,
            Selection::Account {
                email: "a@x.com".to_string(),
                throttle_ms: config.relaxation.emergency_throttle_ms
            }
        );
    }
}
