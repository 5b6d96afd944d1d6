//! `POST /refresh-token`: drop cached tokens/project ids so the next
//! dispatch re-authenticates, optionally scoped to one account.

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize, Default)]
pub struct RefreshTokenRequest {
    #[serde(default)]
    email: Option<String>,
}

pub async fn handle_refresh_token(
    State(state): State<AppState>,
    body: Option<Json<RefreshTokenRequest>>,
) -> Result<Response, ApiError> {
    let email = body.and_then(|Json(req)| req.email);

    state.resolver.clear_token_cache(email.as_deref());
    state.resolver.clear_project_cache(email.as_deref());
    state.account_pool.reload().await?;

    Ok(Json(json!({"status": "ok"})).into_response())
}
