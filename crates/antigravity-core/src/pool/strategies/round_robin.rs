use super::{min_wait_ms, SelectContext, Selection, SelectionStrategy, StrategyState};
use crate::pool::config::PoolConfig;

/// Cycles through enabled, non-invalid, non-rate-limited accounts in a
/// stable order. Only reports a wait when the whole pool is exhausted for
/// the requested model.
pub struct RoundRobinStrategy;

impl SelectionStrategy for RoundRobinStrategy {
    fn select(&self, ctx: &SelectContext<'_>, state: &mut StrategyState) -> Selection {
        if ctx.accounts.is_empty() {
            return Selection::Wait { wait_ms: 0 };
        }

        let mut ordered: Vec<&antigravity_types::models::Account> = ctx.accounts.iter().collect();
        ordered.sort_by(|a, b| a.email.cmp(&b.email));

        let len = ordered.len();
        for offset in 0..len {
            let idx = (state.round_robin_cursor + offset) % len;
            let account = ordered[idx];
            if account.is_selectable() && !account.is_rate_limited_for(ctx.model, ctx.now) {
                state.round_robin_cursor = (idx + 1) % len;
                return Selection::Account { email: account.email.clone(), throttle_ms: 0 };
            }
        }

        Selection::Wait { wait_ms: min_wait_ms(ctx.accounts, ctx.model, ctx.now) }
    }

    fn notify_success(&self, _state: &mut StrategyState, _email: &str, _model: &str, _now: i64, _config: &PoolConfig) {
    }

    fn notify_rate_limit(&self, _state: &mut StrategyState, _email: &str, _model: &str, _now: i64, _config: &PoolConfig) {
    }

    fn notify_failure(&self, _state: &mut StrategyState, _email: &str, _model: &str, _now: i64, _config: &PoolConfig) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_types::models::{Account, CredentialKind};

    fn account(email: &str) -> Account {
        Account::new(email.to_string(), CredentialKind::OauthRefresh, "rt".to_string())
    }

    #[test]
    fn advances_cursor_across_calls() {
        let strategy = RoundRobinStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let accounts = vec![account("a@x.com"), account("b@x.com"), account("c@x.com")];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        let first = strategy.select(&ctx, &mut state);
        let second = strategy.select(&ctx, &mut state);
        let third = strategy.select(&ctx, &mut state);
        let fourth = strategy.select(&ctx, &mut state);

        assert_eq!(first, Selection::Account { email: "a@x.com".to_string(), throttle_ms: 0 });
        assert_eq!(second, Selection::Account { email: "b@x.com".to_string(), throttle_ms: 0 });
        assert_eq!(third, Selection::Account { email: "c@x.com".to_string(), throttle_ms: 0 });
        assert_eq!(fourth, first);
    }

    #[test]
    fn skips_rate_limited_accounts() {
        let strategy = RoundRobinStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let mut limited = account("a@x.com");
        limited.mark_rate_limited("gemini-3-pro", 9999);
        let accounts = vec![limited, account("b@x.com")];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        let selection = strategy.select(&ctx, &mut state);
        assert_eq!(selection, Selection::Account { email: "b@x.com".to_string(), throttle_ms: 0 });
    }

    #[test]
    fn waits_when_pool_fully_exhausted() {
        let strategy = RoundRobinStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let mut limited = account("a@x.com");
        limited.mark_rate_limited("gemini-3-pro", 30);
        let accounts = vec![limited];
        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };

        let selection = strategy.select(&ctx, &mut state);
        assert!(matches!(selection, Selection::Wait { .. }));
    }
}
