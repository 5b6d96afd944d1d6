//! Shared axum state: the full dispatcher stack, wired once at startup.

use std::sync::Arc;

use antigravity_core::account::AccountStore;
use antigravity_core::config::ConfigStore;
use antigravity_core::dispatch::Dispatcher;
use antigravity_core::pool::AccountPool;
use antigravity_core::resolver::TokenResolver;
use antigravity_core::usage_stats::UsageStatsRecorder;

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub account_store: Arc<AccountStore>,
    pub account_pool: Arc<AccountPool>,
    pub config_store: Arc<ConfigStore>,
    pub usage_stats: Arc<UsageStatsRecorder>,
    pub resolver: Arc<TokenResolver>,
}
