use super::{base_eligible, min_wait_ms, SelectContext, Selection, SelectionStrategy, StrategyState};
use crate::pool::config::PoolConfig;

/// Binds a model to its last-used account until that account becomes
/// unavailable for longer than [`PoolConfig::sticky`]'s absorbed-wait
/// ceiling, preserving prompt-cache locality.
pub struct StickyStrategy;

impl SelectionStrategy for StickyStrategy {
    fn select(&self, ctx: &SelectContext<'_>, state: &mut StrategyState) -> Selection {
        if let Some(last_email) = state.sticky_last_used.get(ctx.model).cloned() {
            if let Some(account) = ctx.accounts.iter().find(|a| a.email == last_email) {
                if account.is_selectable() {
                    if !account.is_rate_limited_for(ctx.model, ctx.now) {
                        return Selection::Account { email: account.email.clone(), throttle_ms: 0 };
                    }
                    let wait = account.rate_limit_wait_ms(ctx.model, ctx.now);
                    if wait <= ctx.config.sticky.max_absorbed_wait_ms {
                        return Selection::Wait { wait_ms: wait };
                    }
                }
            }
        }

        let eligible = base_eligible(ctx.accounts, ctx.model, ctx.now);
        if let Some(account) = eligible.first() {
            return Selection::Account { email: account.email.clone(), throttle_ms: 0 };
        }

        Selection::Wait { wait_ms: min_wait_ms(ctx.accounts, ctx.model, ctx.now) }
    }

    fn notify_success(&self, state: &mut StrategyState, email: &str, model: &str, _now: i64, _config: &PoolConfig) {
        state.sticky_last_used.insert(model.to_string(), email.to_string());
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
    fn sticks_to_last_used_account_when_available() {
        let strategy = StickyStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let accounts = vec![account("a@x.com"), account("b@x.com")];
        state.sticky_last_used.insert("gemini-3-pro".to_string(), "b@x.com".to_string());

        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };
        let selection = strategy.select(&ctx, &mut state);
        assert_eq!(selection, Selection::Account { email: "b@x.com".to_string(), throttle_ms: 0 });
    }

    #[test]
    fn absorbs_short_rate_limit_wait_instead_of_switching() {
        let strategy = StickyStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let mut stuck = account("a@x.com");
        stuck.mark_rate_limited("gemini-3-pro", 60);
        let accounts = vec![stuck, account("b@x.com")];
        state.sticky_last_used.insert("gemini-3-pro".to_string(), "a@x.com".to_string());

        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };
        let selection = strategy.select(&ctx, &mut state);
        assert!(matches!(selection, Selection::Wait { .. }));
    }

    #[test]
    fn switches_away_when_wait_exceeds_ceiling() {
        let strategy = StickyStrategy;
        let mut state = StrategyState::new();
        let config = PoolConfig::default();
        let mut stuck = account("a@x.com");
        stuck.mark_rate_limited("gemini-3-pro", 600); // 600s >> 120s ceiling
        let accounts = vec![stuck, account("b@x.com")];
        state.sticky_last_used.insert("gemini-3-pro".to_string(), "a@x.com".to_string());

        let ctx = SelectContext { accounts: &accounts, model: "gemini-3-pro", now: 0, config: &config };
        let selection = strategy.select(&ctx, &mut state);
        assert_eq!(selection, Selection::Account { email: "b@x.com".to_string(), throttle_ms: 0 });
    }
}
