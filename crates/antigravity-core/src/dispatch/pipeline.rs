//! Request Dispatch Pipeline (spec §4.G): the `Dispatcher` tries one
//! account at a time, walking both upstream endpoint hosts for each, and
//! switches account, retries, or falls back to the other model family as
//! the classified failure dictates.

use std::sync::Arc;
use std::time::Duration;

use futures::Stream;

use antigravity_types::models::{Account, ThinkingBudgetConfig};
use antigravity_types::protocol::claude::{ClaudeMessagesRequest, ClaudeMessagesResponse, ClaudeStreamEvent};
use antigravity_types::protocol::gemini::GeminiGenerateContentRequest;

use crate::account::AccountStore;
use crate::error::{DispatchError, DispatchResult};
use crate::pool::AccountPool;
use crate::rate_limit::{self, RateLimitDedup};
use crate::resolver::TokenResolver;
use crate::translator::{is_thinking_capable, session_id, Translator};

use super::config::{DispatchConfig, CAPACITY_BACKOFF_TIERS_MS};
use super::fallback;
use super::outcome::EndpointOutcome;
use super::streaming;

const UPSTREAM_HOSTS: [&str; 2] = ["https://cloudcode-pa.googleapis.com", "https://daily-cloudcode-pa.googleapis.com"];

fn default_upstream_hosts() -> Vec<String> {
    UPSTREAM_HOSTS.iter().map(|host| host.to_string()).collect()
}

/// `explicit` (set by callers that know their own endpoint, e.g. tests
/// pointed at a mock server) wins; otherwise an `ANTIGRAVITY_UPSTREAM_URL`
/// override, falling back to the real prod/daily hosts.
fn resolve_upstream_hosts(explicit: Option<Vec<String>>) -> Vec<String> {
    if let Some(hosts) = explicit {
        return hosts;
    }

    match std::env::var("ANTIGRAVITY_UPSTREAM_URL") {
        Ok(raw) => {
            let host = raw.trim().trim_end_matches('/').to_string();
            if host.is_empty() || url::Url::parse(&host).is_err() {
                tracing::warn!("ANTIGRAVITY_UPSTREAM_URL is invalid, using defaults");
                default_upstream_hosts()
            } else {
                vec![host]
            }
        }
        Err(_) => default_upstream_hosts(),
    }
}

fn endpoint_url(host: &str, streaming: bool) -> String {
    if streaming {
        format!("{host}/v1internal:streamGenerateContent?alt=sse")
    } else {
        format!("{host}/v1internal:generateContent")
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Outcome of a whole account attempt (every endpoint host tried).
enum AccountOutcome {
    Success(reqwest::Response),
    SwitchAccount { delay_ms: i64 },
    Fatal(DispatchError),
}

/// Outcome of `run_for_model`: either a ready response, or a signal that
/// this model's accounts are exhausted and the caller may retry under the
/// cross-family fallback model.
enum AttemptFailure {
    NeedsFallback { quota_exhausted: bool },
    Dispatch(DispatchError),
}

pub struct Dispatcher {
    pool: Arc<AccountPool>,
    resolver: Arc<TokenResolver>,
    store: Arc<AccountStore>,
    translator: Arc<Translator>,
    dedup: Arc<RateLimitDedup>,
    http: reqwest::Client,
    config: DispatchConfig,
    thinking_budget: ThinkingBudgetConfig,
    hosts: Vec<String>,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<AccountPool>,
        resolver: Arc<TokenResolver>,
        store: Arc<AccountStore>,
        translator: Arc<Translator>,
        dedup: Arc<RateLimitDedup>,
        http: reqwest::Client,
        config: DispatchConfig,
        thinking_budget: ThinkingBudgetConfig,
    ) -> Self {
        Self::with_upstream_hosts(pool, resolver, store, translator, dedup, http, config, thinking_budget, None)
    }

    /// As [`Dispatcher::new`], but with an explicit endpoint list overriding
    /// both the real upstream hosts and `ANTIGRAVITY_UPSTREAM_URL` — for
    /// tests that point the dispatcher at a mock server.
    #[allow(clippy::too_many_arguments)]
    pub fn with_upstream_hosts(
        pool: Arc<AccountPool>,
        resolver: Arc<TokenResolver>,
        store: Arc<AccountStore>,
        translator: Arc<Translator>,
        dedup: Arc<RateLimitDedup>,
        http: reqwest::Client,
        config: DispatchConfig,
        thinking_budget: ThinkingBudgetConfig,
        upstream_hosts: Option<Vec<String>>,
    ) -> Self {
        let hosts = resolve_upstream_hosts(upstream_hosts);
        Self { pool, resolver, store, translator, dedup, http, config, thinking_budget, hosts }
    }

    /// Serve a non-streaming `/v1/messages` call. Thinking models are
    /// transparently upgraded to the streaming endpoint and the SSE body is
    /// aggregated into one response, since upstream only emits thought text
    /// on that path.
    pub async fn dispatch(&self, mut request: ClaudeMessagesRequest) -> DispatchResult<ClaudeMessagesResponse> {
        request.stream = false;
        let (response, resolved_model, used_streaming) =
            self.run(&request, false, self.config.fallback_enabled).await?;

        let gemini_response = if used_streaming {
            streaming::aggregate_sse(response).await?
        } else {
            response.json().await.map_err(DispatchError::Transport)?
        };

        self.translator.translate_response(&gemini_response, &resolved_model, now_ts())
    }

    /// Serve a streaming `/v1/messages` call, re-emitting upstream's SSE
    /// body as Anthropic-format events as they arrive. Returns the resolved
    /// upstream model name (post-fallback) alongside the event stream so
    /// callers can attribute usage-stats recording correctly.
    ///
    /// Takes `self` by `Arc` rather than by reference: an empty upstream
    /// body is retried transparently from inside the returned stream, which
    /// needs an owned, `'static` handle back onto the dispatcher to resend
    /// the same request.
    pub async fn dispatch_stream(
        self: Arc<Self>,
        mut request: ClaudeMessagesRequest,
    ) -> DispatchResult<(String, impl Stream<Item = DispatchResult<ClaudeStreamEvent>>)> {
        request.stream = true;
        let (response, resolved_model, _) = self.run(&request, true, self.config.fallback_enabled).await?;

        let max_retries = self.config.max_empty_response_retries;
        let retry: streaming::StreamRetry = {
            let dispatcher = self.clone();
            let request = request.clone();
            let model = resolved_model.clone();
            Box::new(move || {
                let dispatcher = dispatcher.clone();
                let request = request.clone();
                let model = model.clone();
                Box::pin(async move { dispatcher.retry_same_model(&request, &model).await })
            })
        };

        let stream = streaming::reemit_sse(response, self.translator.clone(), resolved_model.clone(), max_retries, retry);
        Ok((resolved_model, stream))
    }

    /// Re-send `request` against `model`, used to transparently retry an
    /// empty streaming body. Reuses the same account-selection and
    /// endpoint-walking logic as the original attempt, just without another
    /// round of cross-model fallback.
    async fn retry_same_model(
        &self,
        request: &ClaudeMessagesRequest,
        model: &str,
    ) -> DispatchResult<reqwest::Response> {
        match self.run_for_model(request, model, true).await {
            Ok((response, _)) => Ok(response),
            Err(AttemptFailure::Dispatch(err)) => Err(err),
            Err(AttemptFailure::NeedsFallback { quota_exhausted }) => {
                Err(exhausted_error(model, quota_exhausted, "empty-response retry exhausted accounts"))
            }
        }
    }

    /// Drive `run_for_model`, switching to the mapped fallback model once
    /// (never chaining) when the pool is exhausted beyond the caller's
    /// patience.
    async fn run(
        &self,
        request: &ClaudeMessagesRequest,
        streaming_requested: bool,
        mut fallback_allowed: bool,
    ) -> DispatchResult<(reqwest::Response, String, bool)> {
        let mut model = request.model.clone();
        loop {
            match self.run_for_model(request, &model, streaming_requested).await {
                Ok((response, used_streaming)) => return Ok((response, model, used_streaming)),
                Err(AttemptFailure::NeedsFallback { quota_exhausted }) if fallback_allowed => {
                    match fallback::fallback_model(&model) {
                        Some(next_model) => {
                            tracing::info!(from = %model, to = %next_model, "cross-model fallback");
                            model = next_model.to_string();
                            fallback_allowed = false;
                        }
                        None => {
                            return Err(exhausted_error(&model, quota_exhausted, "no fallback is mapped"));
                        }
                    }
                }
                Err(AttemptFailure::NeedsFallback { quota_exhausted }) => {
                    return Err(exhausted_error(&model, quota_exhausted, "fallback disabled"));
                }
                Err(AttemptFailure::Dispatch(err)) => return Err(err),
            }
        }
    }

    /// The per-attempt retry loop for one model: selects an account, walks
    /// both endpoint hosts, and loops until success, the attempt budget is
    /// spent, or a fatal error surfaces.
    async fn run_for_model(
        &self,
        request: &ClaudeMessagesRequest,
        model: &str,
        streaming_requested: bool,
    ) -> Result<(reqwest::Response, bool), AttemptFailure> {
        let streaming = streaming_requested || is_thinking_capable(model);

        if self.pool.is_all_rate_limited(model) {
            let _ = self.pool.reset_all_rate_limits().await;
        }

        let account_count = self.pool.get_available_accounts(model).len().max(1) as u32;
        let max_attempts = self.config.max_retries.max(account_count + 1);
        let mut attempt = 0u32;

        while attempt < max_attempts {
            attempt += 1;

            if self.pool.is_all_rate_limited(model) {
                let min_wait = self.pool.get_min_wait_time_ms(model);
                if min_wait > self.config.max_wait_before_error_ms {
                    return Err(AttemptFailure::NeedsFallback { quota_exhausted: true });
                }
                // Waiting out a cooldown doesn't count against the attempt budget.
                tokio::time::sleep(Duration::from_millis((min_wait.max(0) + 500) as u64)).await;
                attempt = attempt.saturating_sub(1);
                continue;
            }

            let selection = self.pool.select_account(model).await;
            let account = match selection.account {
                Some(account) => account,
                None => {
                    let Some(wait_ms) = selection.wait_ms else {
                        return Err(AttemptFailure::Dispatch(DispatchError::NoAvailableAccount(format!(
                            "no account configured for {model}"
                        ))));
                    };
                    tokio::time::sleep(Duration::from_millis(wait_ms.max(0) as u64)).await;
                    attempt = attempt.saturating_sub(1);
                    continue;
                }
            };

            if selection.throttle_ms > 0 {
                tokio::time::sleep(Duration::from_millis(selection.throttle_ms as u64)).await;
            }

            match self.try_account(request, model, &account, streaming).await {
                AccountOutcome::Success(response) => return Ok((response, streaming)),
                AccountOutcome::SwitchAccount { delay_ms } => {
                    if delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                    }
                }
                AccountOutcome::Fatal(err) => return Err(AttemptFailure::Dispatch(err)),
            }
        }

        Err(AttemptFailure::NeedsFallback { quota_exhausted: false })
    }

    /// Resolve credentials and a translated request once, then walk both
    /// endpoint hosts for this account.
    async fn try_account(
        &self,
        request: &ClaudeMessagesRequest,
        model: &str,
        account: &Account,
        streaming: bool,
    ) -> AccountOutcome {
        let token = match self.resolver.get_token_for_account(account, &self.store).await {
            Ok(token) => token,
            Err(err) => return AccountOutcome::Fatal(err),
        };
        let project_id = match self.resolver.get_project_for_account(account, &token, &self.store).await {
            Ok(project_id) => project_id,
            Err(err) => return AccountOutcome::Fatal(err),
        };
        let gemini_request = match self.translator.translate_request(request, model, &self.thinking_budget, now_ts()) {
            Ok(req) => req,
            Err(err) => return AccountOutcome::Fatal(err),
        };
        let session = session_id(&request.messages);

        let mut capacity_retry_count = 0u32;
        let mut network_failure_count = 0u32;

        for host in &self.hosts {
            let outcome = self
                .call_endpoint(
                    host,
                    model,
                    &project_id,
                    &token,
                    &gemini_request,
                    &session,
                    streaming,
                    account,
                    &mut capacity_retry_count,
                    &mut network_failure_count,
                )
                .await;

            match outcome {
                EndpointOutcome::Success(response) => {
                    let _ = self.pool.notify_success(&account.email, model).await;
                    return AccountOutcome::Success(response);
                }
                EndpointOutcome::NextEndpoint => continue,
                EndpointOutcome::SwitchAccount { reason, delay_ms } => {
                    tracing::debug!(email = %account.email, %reason, "switching account");
                    self.pool.notify_failure(&account.email, model).await;
                    return AccountOutcome::SwitchAccount { delay_ms };
                }
                EndpointOutcome::Fatal { kind } => return AccountOutcome::Fatal(kind),
            }
        }

        AccountOutcome::SwitchAccount { delay_ms: 0 }
    }

    /// One HTTP call against `host`, classifying the response and looping
    /// in place for same-endpoint capacity or quick-rate-limit retries.
    #[allow(clippy::too_many_arguments)]
    async fn call_endpoint(
        &self,
        host: &str,
        model: &str,
        project_id: &str,
        token: &str,
        body: &GeminiGenerateContentRequest,
        session_id: &str,
        streaming: bool,
        account: &Account,
        capacity_retry_count: &mut u32,
        network_failure_count: &mut u32,
    ) -> EndpointOutcome {
        let url = endpoint_url(host, streaming);
        let wire_body = serde_json::json!({
            "model": model,
            "project": project_id,
            "request": body,
            "sessionId": session_id,
        });
        let email = &account.email;

        loop {
            let send_result = self
                .http
                .post(&url)
                .bearer_auth(token)
                .header(reqwest::header::USER_AGENT, user_agent())
                .header("X-Goog-Api-Client", api_client_header())
                .header("Client-Metadata", client_metadata_header())
                .json(&wire_body)
                .send()
                .await;

            let response = match send_result {
                Ok(response) => response,
                Err(err) => {
                    *network_failure_count += 1;
                    if *network_failure_count >= self.config.consecutive_failure_threshold {
                        let _ = self.pool.mark_rate_limited(email, self.config.extended_cooldown_ms, model).await;
                    }
                    tokio::time::sleep(Duration::from_millis(1_000)).await;
                    return EndpointOutcome::SwitchAccount {
                        reason: format!("transport error: {err}"),
                        delay_ms: 0,
                    };
                }
            };

            if response.status().is_success() {
                return EndpointOutcome::Success(response);
            }

            let status = response.status().as_u16();
            let headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
                .collect();
            let header_refs: Vec<(&str, &str)> = headers.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
            let body_text = response.text().await.unwrap_or_default();
            let classified = rate_limit::classify(status, &header_refs, &body_text);

            if classified.kind == rate_limit::ErrorKind::InvalidRequest {
                return EndpointOutcome::Fatal { kind: DispatchError::InvalidRequest(body_text) };
            }
            if classified.kind == rate_limit::ErrorKind::PermanentAuth {
                let _ = self.pool.mark_invalid(email, "upstream reported invalid_grant/revoked credentials").await;
                return EndpointOutcome::SwitchAccount { reason: "permanent auth failure".to_string(), delay_ms: 0 };
            }
            if status == 401 {
                self.resolver.clear_token_cache(Some(email));
                self.resolver.clear_project_cache(Some(email));
                return EndpointOutcome::NextEndpoint;
            }
            if status == 403 || status == 404 {
                return EndpointOutcome::NextEndpoint;
            }

            match classified.kind {
                rate_limit::ErrorKind::ModelCapacityExhausted => {
                    if *capacity_retry_count < self.config.max_capacity_retries {
                        let tier = (*capacity_retry_count as usize).min(CAPACITY_BACKOFF_TIERS_MS.len() - 1);
                        tokio::time::sleep(Duration::from_millis(CAPACITY_BACKOFF_TIERS_MS[tier] as u64)).await;
                        *capacity_retry_count += 1;
                        self.pool.notify_failure(email, model).await;
                        continue;
                    }
                    return EndpointOutcome::SwitchAccount { reason: "model capacity exhausted".to_string(), delay_ms: 0 };
                }
                rate_limit::ErrorKind::RateLimit | rate_limit::ErrorKind::QuotaExhausted => {
                    let backoff = rate_limit::effective_backoff_ms(&classified, account.consecutive_failures.max(1));
                    if backoff < 1_000 {
                        tokio::time::sleep(Duration::from_millis(backoff as u64)).await;
                        continue;
                    }
                    match self.dedup.record(email, model, backoff, chrono::Utc::now().timestamp_millis()) {
                        rate_limit::RateLimitOutcome::Duplicate { delay_ms } => {
                            let _ = self.pool.mark_rate_limited(email, delay_ms, model).await;
                            return EndpointOutcome::SwitchAccount { reason: "duplicate rate limit".to_string(), delay_ms: 0 };
                        }
                        rate_limit::RateLimitOutcome::Escalated { delay_ms, attempt } => {
                            if attempt <= 1 && delay_ms <= self.config.quick_retry_cooldown_ms {
                                let _ = self.pool.mark_rate_limited(email, delay_ms, model).await;
                                tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
                                continue;
                            }
                            let _ = self.pool.mark_rate_limited(email, delay_ms, model).await;
                            return EndpointOutcome::SwitchAccount {
                                reason: "long-term rate limit/quota".to_string(),
                                delay_ms: self.config.switch_account_delay_ms,
                            };
                        }
                    }
                }
                rate_limit::ErrorKind::ServerError | rate_limit::ErrorKind::Unknown => {
                    tokio::time::sleep(Duration::from_millis(1_000)).await;
                    return EndpointOutcome::NextEndpoint;
                }
                // Handled above; unreachable here.
                rate_limit::ErrorKind::InvalidRequest | rate_limit::ErrorKind::PermanentAuth => {
                    return EndpointOutcome::NextEndpoint;
                }
            }
        }
    }
}

/// `quota_exhausted` distinguishes "every account is past its reset window"
/// (surfaced as 400 so clients don't auto-retry past the reset) from a
/// generic attempt-budget exhaustion (surfaced as 502).
fn exhausted_error(model: &str, quota_exhausted: bool, reason: &str) -> DispatchError {
    if quota_exhausted {
        DispatchError::QuotaExhausted(format!("every account for {model} is quota-exhausted ({reason})"))
    } else {
        DispatchError::UpstreamExhausted { attempts: 0, message: format!("accounts exhausted for {model} ({reason})") }
    }
}

fn user_agent() -> String {
    format!("antigravity/{} {}/{}", env!("CARGO_PKG_VERSION"), std::env::consts::OS, std::env::consts::ARCH)
}

/// `X-Goog-Api-Client` value mimicking the Google Cloud SDK clients the
/// upstream otherwise expects this traffic to come from.
fn api_client_header() -> &'static str {
    "google-cloud-sdk gl-node/20"
}

/// `Client-Metadata` pairs with the `clientMetadata` shape the upstream
/// onboarding/discovery calls already send (see `resolver::client_metadata`).
fn client_metadata_header() -> String {
    crate::resolver::client_metadata().to_string()
}
