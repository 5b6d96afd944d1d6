pub mod account_limits;
pub mod health;
pub mod messages;
pub mod models;
pub mod refresh_token;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::auth;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/messages", post(messages::handle_messages))
        .route("/v1/messages/count_tokens", post(messages::handle_count_tokens))
        .route("/v1/models", get(models::handle_list_models))
        .route("/account-limits", get(account_limits::handle_account_limits))
        .route("/refresh-token", post(refresh_token::handle_refresh_token))
        .route("/health", get(health::handle_health))
        .layer(middleware::from_fn_with_state(state.clone(), auth::auth_middleware))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use antigravity_core::account::AccountStore;
    use antigravity_core::config::ConfigStore;
    use antigravity_core::dispatch::{DispatchConfig, Dispatcher};
    use antigravity_core::pool::{AccountPool, PoolConfig};
    use antigravity_core::rate_limit::RateLimitDedup;
    use antigravity_core::resolver::TokenResolver;
    use antigravity_core::translator::Translator;
    use antigravity_core::usage_stats::UsageStatsRecorder;
    use antigravity_types::models::StrategyKind;
    use axum_test::TestServer;

    use super::*;

    async fn test_state() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        let account_store = Arc::new(AccountStore::load(dir.path().join("accounts.json"), 16).await.unwrap());
        let config_store = Arc::new(ConfigStore::load(dir.path().join("config.json")).await.unwrap());
        let usage_stats =
            Arc::new(UsageStatsRecorder::load(dir.path().join("usage-history.json"), None).await.unwrap());
        let pool = Arc::new(AccountPool::from_store(account_store.clone(), StrategyKind::Hybrid, PoolConfig::default()).await);
        let http = reqwest::Client::new();
        let resolver = Arc::new(TokenResolver::new(http.clone(), "https://oauth2.googleapis.com/token"));
        let translator = Arc::new(Translator::new());
        let dedup = Arc::new(RateLimitDedup::new());
        let dispatcher = Arc::new(Dispatcher::new(
            pool.clone(),
            resolver.clone(),
            account_store.clone(),
            translator,
            dedup,
            http,
            DispatchConfig::default(),
            Default::default(),
        ));

        let state = AppState {
            dispatcher,
            account_store,
            account_pool: pool,
            config_store,
            usage_stats,
            resolver,
        };
        (dir, state)
    }

    #[tokio::test]
    async fn health_is_reachable_without_auth() {
        let (_dir, state) = test_state().await;
        let server = TestServer::new(build_router(state)).unwrap();
        let response = server.get("/health").await;
        response.assert_status_ok();
    }

    #[tokio::test]
    async fn models_lists_supported_ids() {
        let (_dir, state) = test_state().await;
        let server = TestServer::new(build_router(state)).unwrap();
        let response = server.get("/v1/models").await;
        response.assert_status_ok();
        let body: serde_json::Value = response.json();
        assert_eq!(body["object"], "list");
        assert!(body["data"].as_array().unwrap().len() > 0);
    }

    #[tokio::test]
    async fn strict_auth_rejects_missing_key() {
        let (_dir, state) = test_state().await;
        state
            .config_store
            .update(|cfg| {
                cfg.proxy.auth_mode = antigravity_types::models::ProxyAuthMode::Strict;
                cfg.proxy.api_key = "secret-key".to_string();
            })
            .await
            .unwrap();
        let server = TestServer::new(build_router(state)).unwrap();
        let response = server.get("/v1/models").await;
        response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn strict_auth_accepts_matching_bearer_key() {
        let (_dir, state) = test_state().await;
        state
            .config_store
            .update(|cfg| {
                cfg.proxy.auth_mode = antigravity_types::models::ProxyAuthMode::Strict;
                cfg.proxy.api_key = "secret-key".to_string();
            })
            .await
            .unwrap();
        let server = TestServer::new(build_router(state)).unwrap();
        let response = server.get("/v1/models").add_header(
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderValue::from_static("Bearer secret-key"),
        ).await;
        response.assert_status_ok();
    }
}
