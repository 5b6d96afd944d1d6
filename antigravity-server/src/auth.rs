//! Bearer/`x-api-key` gating for `/v1/*`, mirroring the teacher's
//! constant-time key comparison so failed attempts don't leak timing.

use antigravity_types::models::ProxyAuthMode;
use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use subtle::ConstantTimeEq;

use crate::state::AppState;

fn is_health_check(path: &str) -> bool {
    path == "/health"
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn extract_key(req: &Request<Body>) -> Option<String> {
    if let Some(value) = req.headers().get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            return Some(value.strip_prefix("Bearer ").unwrap_or(value).to_string());
        }
    }
    if let Some(value) = req.headers().get("x-api-key") {
        if let Ok(value) = value.to_str() {
            return Some(value.to_string());
        }
    }
    if let Some(value) = req.headers().get("x-goog-api-key") {
        if let Ok(value) = value.to_str() {
            return Some(value.to_string());
        }
    }
    None
}

fn unauthorized() -> Response {
    let body = json!({
        "type": "error",
        "error": {
            "type": "authentication_error",
            "message": "Invalid or missing API key",
        }
    });
    (StatusCode::UNAUTHORIZED, Json(body)).into_response()
}

pub async fn auth_middleware(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let config = state.config_store.get().await;
    let mode = config.proxy.auth_mode;

    let required = match mode {
        ProxyAuthMode::Off => false,
        ProxyAuthMode::AllExceptHealth => !is_health_check(&path),
        ProxyAuthMode::Strict | ProxyAuthMode::Auto => true,
    };

    if !required {
        return next.run(req).await;
    }

    let Some(expected) = config.proxy.api_key.as_deref().filter(|key| !key.is_empty()) else {
        return next.run(req).await;
    };

    match extract_key(&req) {
        Some(provided) if constant_time_compare(&provided, expected) => next.run(req).await,
        _ => unauthorized(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_time_compare_matches_equal_strings() {
        assert!(constant_time_compare("secret", "secret"));
        assert!(!constant_time_compare("secret", "wrong"));
        assert!(!constant_time_compare("short", "muchlonger"));
    }

    #[test]
    fn health_check_path_is_recognised() {
        assert!(is_health_check("/health"));
        assert!(!is_health_check("/v1/messages"));
    }
}
