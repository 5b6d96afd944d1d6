//! Headless proxy daemon: loads accounts/config/usage history, builds the
//! dispatcher stack, and serves the Anthropic Messages API surface.
//!
//! No business logic lives here — this binary wires up
//! [`antigravity_core`] and exposes it over HTTP.

mod auth;
mod cli;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use anyhow::Result;
use antigravity_core::account::AccountStore;
use antigravity_core::config::ConfigStore;
use antigravity_core::dispatch::{DispatchConfig, Dispatcher};
use antigravity_core::pool::{AccountPool, PoolConfig};
use antigravity_core::rate_limit::RateLimitDedup;
use antigravity_core::resolver::TokenResolver;
use antigravity_core::translator::Translator;
use antigravity_core::usage_stats::UsageStatsRecorder;
use antigravity_types::models::StrategyKind;
use clap::Parser;
use tracing::info;

use cli::Cli;
use state::AppState;

const OAUTH_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const MAX_ACCOUNTS: usize = 64;

fn data_dir(cli: &Cli) -> std::path::PathBuf {
    if let Some(dir) = &cli.data_dir {
        return dir.clone();
    }
    dirs::home_dir().unwrap_or_else(|| std::path::PathBuf::from(".")).join(".antigravity_tools")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(filter)).init();

    let data_dir = data_dir(&cli);
    tokio::fs::create_dir_all(&data_dir).await?;
    info!(?data_dir, "loading application state");

    let account_store = Arc::new(AccountStore::load(data_dir.join("accounts.json"), MAX_ACCOUNTS).await?);
    let config_store = Arc::new(ConfigStore::load(data_dir.join("config.json")).await?);
    let usage_stats = Arc::new(
        UsageStatsRecorder::load(data_dir.join("usage-history.json"), Some(data_dir.join("token_usage_stats.json")))
            .await?,
    );
    usage_stats.clone().spawn_flush_timer();

    let config = config_store.get().await;
    let http = reqwest::Client::builder().build()?;

    let strategy = config.proxy.scheduling.strategy;
    let pool = Arc::new(AccountPool::from_store(account_store.clone(), strategy, PoolConfig::default()).await);
    let resolver = Arc::new(TokenResolver::new(http.clone(), OAUTH_TOKEN_ENDPOINT));
    let translator = Arc::new(Translator::new());
    let dedup = Arc::new(RateLimitDedup::new());

    let mut dispatch_config = DispatchConfig::default();
    dispatch_config.fallback_enabled = cli.fallback;

    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        resolver.clone(),
        account_store.clone(),
        translator,
        dedup,
        http,
        dispatch_config,
        config.proxy.thinking_budget.clone(),
    ));

    if let Some(api_key) = &cli.api_key {
        let key = api_key.clone();
        config_store.update(|cfg| cfg.proxy.api_key = key).await?;
    }

    let app_state = AppState {
        dispatcher,
        account_store,
        account_pool: pool,
        config_store: config_store.clone(),
        usage_stats,
        resolver,
    };

    let app = routes::build_router(app_state);

    let config = config_store.get().await;
    let bind_host = cli.host.clone().unwrap_or_else(|| config.proxy.get_bind_address());
    let addr = format!("{bind_host}:{}", cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "antigravity-server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
