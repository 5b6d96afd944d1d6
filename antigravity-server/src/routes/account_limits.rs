//! `GET /account-limits`: per-account quota/rate-limit snapshot, with
//! `?format=table` for a plain-text rendering and `?includeHistory=true`
//! to embed the usage-stats history alongside it.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

const QUOTA_MAX_AGE_SECS: i64 = 3600;

#[derive(Debug, Deserialize, Default)]
pub struct AccountLimitsQuery {
    #[serde(default, rename = "format")]
    format: Option<String>,
    #[serde(default, rename = "includeHistory")]
    include_history: bool,
}

#[derive(Debug, Serialize)]
pub struct AccountLimitRow {
    pub email: String,
    pub enabled: bool,
    pub is_invalid: bool,
    pub consecutive_failures: u32,
    pub min_quota_fraction: Option<f64>,
}

pub async fn handle_account_limits(
    State(state): State<AppState>,
    Query(query): Query<AccountLimitsQuery>,
) -> Response {
    let now = chrono::Utc::now().timestamp();
    let accounts = state.account_store.list().await;

    let rows: Vec<AccountLimitRow> = accounts
        .iter()
        .map(|account| AccountLimitRow {
            email: account.email.clone(),
            enabled: account.enabled,
            is_invalid: account.is_invalid,
            consecutive_failures: account.consecutive_failures,
            min_quota_fraction: account.min_quota_fraction(now, QUOTA_MAX_AGE_SECS),
        })
        .collect();

    if query.format.as_deref() == Some("table") {
        let mut table = format!("{:<32} {:<8} {:<8} {:<10} {:<8}\n", "email", "enabled", "invalid", "failures", "quota");
        for row in &rows {
            table.push_str(&format!(
                "{:<32} {:<8} {:<8} {:<10} {:<8}\n",
                row.email,
                row.enabled,
                row.is_invalid,
                row.consecutive_failures,
                row.min_quota_fraction.map(|f| format!("{f:.2}")).unwrap_or_else(|| "-".to_string()),
            ));
        }
        return table.into_response();
    }

    if query.include_history {
        let history = state.usage_stats.snapshot().await;
        return Json(json!({"accounts": rows, "history": history})).into_response();
    }

    Json(json!({"accounts": rows})).into_response()
}
