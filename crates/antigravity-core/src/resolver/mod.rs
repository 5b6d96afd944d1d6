//! Token & Project Resolver (spec §4.C).
//!
//! Turns an `Account`'s durable credential into a short-lived access token,
//! and discovers/caches the managed Cloud project id that token must be
//! paired with. Grounded in the teacher's
//! `proxy/token_manager/mod.rs` (inline refresh-on-expiry, per-account file
//! lock) and `proxy/project_resolver.rs` (`loadCodeAssist`/`onboardUser`
//! dance, default project id fallback).

mod composite;
mod tier;

pub use composite::CompositeRefresh;
pub use tier::{parse_tier_label, subscription_tier_from_response};

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use antigravity_types::error::AccountError;
use antigravity_types::models::{Account, SubscriptionTier, TokenData};
use dashmap::DashMap;
use serde_json::json;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::account::AccountStore;
use crate::error::{DispatchError, DispatchResult};

/// Fallback project id used when discovery and onboarding both fail, matching
/// the value the upstream assigns to unclaimed Antigravity projects.
pub const DEFAULT_PROJECT_ID: &str = "bamboo-precept-lgxtn";

const TOKEN_CACHE_TTL_SECS: i64 = 300;
const LOAD_CODE_ASSIST_PROD: &str = "https://cloudcode-pa.googleapis.com/v1internal:loadCodeAssist";
const LOAD_CODE_ASSIST_DAILY: &str =
    "https://daily-cloudcode-pa.googleapis.com/v1internal:loadCodeAssist";
const ONBOARD_USER_PROD: &str = "https://cloudcode-pa.googleapis.com/v1internal:onboardUser";
const ONBOARD_POLL_ATTEMPTS: u32 = 10;
const ONBOARD_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Resolves access tokens and managed project ids for accounts, with
/// per-email caches matching the spec's cache table (token: 5 min TTL,
/// project: no TTL until explicitly cleared).
pub struct TokenResolver {
    http: reqwest::Client,
    oauth_token_endpoint: String,
    token_cache: DashMap<String, TokenData>,
    refresh_locks: DashMap<String, Arc<AsyncMutex<()>>>,
    project_cache: DashMap<String, String>,
    local_db_path: Option<PathBuf>,
}

impl TokenResolver {
    pub fn new(http: reqwest::Client, oauth_token_endpoint: impl Into<String>) -> Self {
        Self {
            http,
            oauth_token_endpoint: oauth_token_endpoint.into(),
            token_cache: DashMap::new(),
            refresh_locks: DashMap::new(),
            project_cache: DashMap::new(),
            local_db_path: dirs::data_local_dir().map(|dir| dir.join("antigravity/local.db")),
        }
    }

    fn refresh_lock(&self, email: &str) -> Arc<AsyncMutex<()>> {
        self.refresh_locks.entry(email.to_string()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Resolve a usable bearer token for `account`, refreshing or reading
    /// from the local credential store as its `credential_kind` requires.
    pub async fn get_token_for_account(
        &self,
        account: &Account,
        store: &AccountStore,
    ) -> DispatchResult<String> {
        use antigravity_types::models::CredentialKind;

        match account.credential_kind {
            CredentialKind::ApiKey => Ok(account.credential.clone()),
            CredentialKind::LocalDb => self.fetch_local_db_token(&account.email).await,
            CredentialKind::OauthRefresh => self.get_oauth_token(account, store).await,
        }
    }

    async fn get_oauth_token(
        &self,
        account: &Account,
        store: &AccountStore,
    ) -> DispatchResult<String> {
        let now = chrono::Utc::now().timestamp();

        if let Some(cached) = self.token_cache.get(&account.email) {
            if cached.is_cache_fresh(now, TOKEN_CACHE_TTL_SECS) {
                return Ok(cached.access_token.clone());
            }
        }

        // Single-flight: concurrent callers on a miss coalesce onto one refresh.
        let lock = self.refresh_lock(&account.email);
        let _guard = lock.lock().await;

        if let Some(cached) = self.token_cache.get(&account.email) {
            if cached.is_cache_fresh(now, TOKEN_CACHE_TTL_SECS) {
                return Ok(cached.access_token.clone());
            }
        }

        let composite = CompositeRefresh::parse(&account.credential);
        match self.refresh_oauth_token(&composite.refresh_token).await {
            Ok((access_token, expires_in)) => {
                let entry = TokenData::new(access_token.clone(), expires_in);
                self.token_cache.insert(account.email.clone(), entry);
                Ok(access_token)
            }
            Err(RefreshFailure::Transient(message)) => {
                warn!(email = %account.email, %message, "transient token refresh failure");
                Err(DispatchError::Account(AccountError::TokenRefreshFailed {
                    id: account.email.clone(),
                    message,
                }))
            }
            Err(RefreshFailure::Permanent(message)) => {
                store.set_invalid(&account.email, Some(message.clone())).await.ok();
                Err(DispatchError::Account(AccountError::TokenExpired { id: account.email.clone() }))
            }
        }
    }

    async fn refresh_oauth_token(
        &self,
        refresh_token: &str,
    ) -> Result<(String, i64), RefreshFailure> {
        let response = self
            .http
            .post(&self.oauth_token_endpoint)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", refresh_token)])
            .send()
            .await
            .map_err(|err| RefreshFailure::Transient(err.to_string()))?;

        let status = response.status();
        let body: serde_json::Value =
            response.json().await.map_err(|err| RefreshFailure::Transient(err.to_string()))?;

        if !status.is_success() {
            let error_code = body.get("error").and_then(|v| v.as_str()).unwrap_or("");
            if matches!(error_code, "invalid_grant" | "invalid_client") {
                return Err(RefreshFailure::Permanent(format!("oauth refresh rejected: {error_code}")));
            }
            return Err(RefreshFailure::Transient(format!("oauth refresh http {status}")));
        }

        let access_token = body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RefreshFailure::Transient("missing access_token in response".to_string()))?
            .to_string();
        let expires_in = body.get("expires_in").and_then(|v| v.as_i64()).unwrap_or(3600);

        Ok((access_token, expires_in))
    }

    async fn fetch_local_db_token(&self, email: &str) -> DispatchResult<String> {
        let path = self
            .local_db_path
            .clone()
            .ok_or_else(|| DispatchError::Internal("no local credential db path".to_string()))?;
        let email = email.to_string();

        tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open(&path)
                .map_err(|err| DispatchError::Internal(format!("open local db: {err}")))?;
            conn.query_row(
                "SELECT access_token FROM credentials WHERE email = ?1",
                [&email],
                |row| row.get::<_, String>(0),
            )
            .map_err(|err| DispatchError::Internal(format!("local db lookup for {email}: {err}")))
        })
        .await
        .map_err(|err| DispatchError::Internal(format!("local db task join error: {err}")))?
    }

    /// Clear the cached token for `email`, or all entries if `None`.
    pub fn clear_token_cache(&self, email: Option<&str>) {
        match email {
            Some(email) => {
                self.token_cache.remove(email);
            }
            None => self.token_cache.clear(),
        }
    }

    /// Clear the cached managed project id for `email`, or all entries.
    pub fn clear_project_cache(&self, email: Option<&str>) {
        match email {
            Some(email) => {
                self.project_cache.remove(email);
            }
            None => self.project_cache.clear(),
        }
    }

    /// Resolve the managed Cloud project id for `account`, following the
    /// five-step procedure: cache, composite-carried id (plus a blocking
    /// subscription-tier fetch when the tier is still unknown), discovery,
    /// onboarding, and finally a supplied-or-default fallback.
    pub async fn get_project_for_account(
        &self,
        account: &Account,
        access_token: &str,
        store: &AccountStore,
    ) -> DispatchResult<String> {
        if let Some(cached) = self.project_cache.get(&account.email) {
            return Ok(cached.clone());
        }

        let composite = CompositeRefresh::parse(&account.credential);

        if account.subscription_tier == SubscriptionTier::Unknown {
            self.refresh_subscription_tier(account, access_token, store).await;
        }

        if let Some(managed) = composite.managed_project_id.filter(|id| !id.is_empty()) {
            self.project_cache.insert(account.email.clone(), managed.clone());
            return Ok(managed);
        }

        match self.discover_project(access_token).await {
            Ok(response) => match extract_project_id(&response) {
                Some(project_id) => {
                    self.persist_managed_project(account, &project_id, store).await;
                    Ok(project_id)
                }
                None => {
                    let tier_id = derive_onboard_tier_id(&response)
                        .unwrap_or_else(|| "free-tier".to_string());
                    match self.onboard_user(access_token, &tier_id).await {
                        Ok(project_id) => {
                            self.persist_managed_project(account, &project_id, store).await;
                            Ok(project_id)
                        }
                        Err(message) => {
                            debug!(email = %account.email, %message, "onboarding failed, using fallback project id");
                            Ok(composite
                                .project_id
                                .filter(|id| !id.is_empty())
                                .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()))
                        }
                    }
                }
            },
            Err(message) => {
                debug!(email = %account.email, %message, "project discovery failed, using fallback project id");
                Ok(composite
                    .project_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| DEFAULT_PROJECT_ID.to_string()))
            }
        }
    }

    /// `getSubscriptionTier`: a blocking `loadCodeAssist` fetch, run whenever
    /// an account's tier is still unknown, with the result persisted so
    /// subsequent resolutions skip straight past this step.
    async fn refresh_subscription_tier(&self, account: &Account, access_token: &str, store: &AccountStore) {
        match self.discover_project(access_token).await {
            Ok(response) => {
                let tier = extract_subscription_tier(&response);
                if tier != SubscriptionTier::Unknown {
                    store.set_subscription_tier(&account.email, tier).await.ok();
                }
            }
            Err(message) => debug!(email = %account.email, %message, "subscription tier fetch failed"),
        }
    }

    async fn persist_managed_project(&self, account: &Account, project_id: &str, store: &AccountStore) {
        self.project_cache.insert(account.email.clone(), project_id.to_string());
        let mut composite = CompositeRefresh::parse(&account.credential);
        composite.managed_project_id = Some(project_id.to_string());
        let mut updated = account.clone();
        updated.credential = composite.format();
        updated.managed_project_id = Some(project_id.to_string());
        store.upsert(updated).await.ok();
    }

    async fn discover_project(&self, access_token: &str) -> Result<serde_json::Value, String> {
        for endpoint in [LOAD_CODE_ASSIST_PROD, LOAD_CODE_ASSIST_DAILY] {
            match self.call_load_code_assist(endpoint, access_token).await {
                Ok(response) => return Ok(response),
                Err(message) => debug!(endpoint, %message, "loadCodeAssist endpoint failed"),
            }
        }
        Err("all loadCodeAssist endpoints failed".to_string())
    }

    async fn call_load_code_assist(
        &self,
        endpoint: &str,
        access_token: &str,
    ) -> Result<serde_json::Value, String> {
        let response = self
            .http
            .post(endpoint)
            .bearer_auth(access_token)
            .json(&json!({ "metadata": client_metadata() }))
            .send()
            .await
            .map_err(|err| err.to_string())?;

        if !response.status().is_success() {
            return Err(format!("http {}", response.status()));
        }
        response.json().await.map_err(|err| err.to_string())
    }

    async fn onboard_user(&self, access_token: &str, tier_id: &str) -> Result<String, String> {
        for _ in 0..ONBOARD_POLL_ATTEMPTS {
            let response = self
                .http
                .post(ONBOARD_USER_PROD)
                .bearer_auth(access_token)
                .json(&json!({ "tierId": tier_id, "metadata": client_metadata() }))
                .send()
                .await
                .map_err(|err| err.to_string())?;

            if response.status().is_success() {
                let body: serde_json::Value = response.json().await.map_err(|err| err.to_string())?;
                if let Some(id) = body
                    .pointer("/response/cloudaicompanionProject/id")
                    .and_then(|v| v.as_str())
                {
                    return Ok(id.to_string());
                }
            }
            tokio::time::sleep(ONBOARD_POLL_INTERVAL).await;
        }
        Err("onboarding did not complete within poll budget".to_string())
    }
}

pub(crate) fn client_metadata() -> serde_json::Value {
    json!({ "ideType": "ANTIGRAVITY", "platform": "DARWIN", "pluginType": "GEMINI" })
}

fn extract_project_id(response: &serde_json::Value) -> Option<String> {
    match response.get("cloudaicompanionProject") {
        Some(serde_json::Value::String(id)) => Some(id.clone()),
        Some(serde_json::Value::Object(obj)) => {
            obj.get("id").and_then(|v| v.as_str()).map(str::to_string)
        }
        _ => None,
    }
}

/// Derive the tier id to onboard with from a `loadCodeAssist` response's
/// `allowedTiers`: the entry marked default, else the first entry.
pub fn derive_onboard_tier_id(response: &serde_json::Value) -> Option<String> {
    let tiers = response.get("allowedTiers")?.as_array()?;
    tiers
        .iter()
        .find(|tier| tier.get("isDefault").and_then(|v| v.as_bool()).unwrap_or(false))
        .or_else(|| tiers.first())
        .and_then(|tier| tier.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Extract the current subscription tier, preferring `paidTier.id`, then
/// `currentTier.id`, then the default entry of `allowedTiers` — the
/// documented order (spec §9 notes an observed ambiguity where some code
/// paths treat `currentTier` as authoritative; this resolver keeps the
/// documented order).
pub fn extract_subscription_tier(response: &serde_json::Value) -> SubscriptionTier {
    let label = response
        .pointer("/paidTier/id")
        .and_then(|v| v.as_str())
        .or_else(|| response.pointer("/currentTier/id").and_then(|v| v.as_str()))
        .or_else(|| {
            response.get("allowedTiers").and_then(|v| v.as_array()).and_then(|tiers| {
                tiers
                    .iter()
                    .find(|t| t.get("isDefault").and_then(|v| v.as_bool()).unwrap_or(false))
                    .and_then(|t| t.get("id"))
                    .and_then(|v| v.as_str())
            })
        });

    label.map(parse_tier_label).unwrap_or(SubscriptionTier::Unknown)
}

enum RefreshFailure {
    Transient(String),
    Permanent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_string_project_id() {
        let response = json!({ "cloudaicompanionProject": "proj-123" });
        assert_eq!(extract_project_id(&response), Some("proj-123".to_string()));
    }

    #[test]
    fn extracts_object_project_id() {
        let response = json!({ "cloudaicompanionProject": { "id": "proj-456" } });
        assert_eq!(extract_project_id(&response), Some("proj-456".to_string()));
    }

    #[test]
    fn derives_default_tier_when_marked() {
        let response = json!({
            "allowedTiers": [
                { "id": "free-tier", "isDefault": false },
                { "id": "standard-tier", "isDefault": true },
            ]
        });
        assert_eq!(derive_onboard_tier_id(&response), Some("standard-tier".to_string()));
    }

    #[test]
    fn tier_priority_prefers_paid_over_current() {
        let response = json!({
            "paidTier": { "id": "ultra-tier" },
            "currentTier": { "id": "free-tier" },
        });
        assert_eq!(extract_subscription_tier(&response), SubscriptionTier::Ultra);
    }
}
