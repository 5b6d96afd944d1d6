//! End-to-end `Dispatcher` tests against a mocked upstream, grounded in the
//! teacher's `tests/integration_proxy.rs` wiremock harness.

use std::sync::Arc;

use antigravity_core::account::AccountStore;
use antigravity_core::dispatch::{DispatchConfig, Dispatcher};
use antigravity_core::pool::{AccountPool, PoolConfig};
use antigravity_core::rate_limit::RateLimitDedup;
use antigravity_core::resolver::TokenResolver;
use antigravity_core::translator::Translator;
use antigravity_types::models::{Account, CredentialKind, StrategyKind, SubscriptionTier, ThinkingBudgetConfig};
use antigravity_types::protocol::claude::{ClaudeContentBlock, ClaudeMessage, ClaudeMessagesRequest, ClaudeRole};
use futures::StreamExt;
use wiremock::matchers::{method, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn request(model: &str, stream: bool) -> ClaudeMessagesRequest {
    ClaudeMessagesRequest {
        model: model.to_string(),
        messages: vec![ClaudeMessage {
            role: ClaudeRole::User,
            content: vec![ClaudeContentBlock::Text { text: "hi".to_string(), cache_control: None }],
        }],
        system: None,
        max_tokens: 256,
        stream,
        temperature: None,
        top_p: None,
        top_k: None,
        stop_sequences: None,
        tools: None,
        thinking: None,
        metadata: None,
    }
}

/// An `ApiKey` account (so token resolution never calls out) with a
/// pre-known managed project id and non-`Unknown` tier (so project
/// resolution short-circuits on its composite-carried id instead of
/// reaching out to `loadCodeAssist`). The only network call this leaves
/// live is the one under test: the `generateContent`/`streamGenerateContent`
/// call itself.
async fn mocked_dispatcher(server: &MockServer) -> (tempfile::TempDir, Arc<Dispatcher>) {
    let dir = tempfile::tempdir().unwrap();
    let account_store = Arc::new(AccountStore::load(dir.path().join("accounts.json"), 8).await.unwrap());

    let mut account = Account::new(
        "mock@example.com".to_string(),
        CredentialKind::ApiKey,
        "fake-key||mock-project".to_string(),
    );
    account.subscription_tier = SubscriptionTier::Pro;
    account_store.upsert(account).await.unwrap();

    let pool = Arc::new(AccountPool::from_store(account_store.clone(), StrategyKind::Hybrid, PoolConfig::default()).await);
    let http = reqwest::Client::new();
    let resolver = Arc::new(TokenResolver::new(http.clone(), "https://oauth2.googleapis.com/token"));
    let translator = Arc::new(Translator::new());
    let dedup = Arc::new(RateLimitDedup::new());

    let dispatcher = Arc::new(Dispatcher::with_upstream_hosts(
        pool,
        resolver,
        account_store,
        translator,
        dedup,
        http,
        DispatchConfig::default(),
        ThinkingBudgetConfig::default(),
        Some(vec![server.uri()]),
    ));

    (dir, dispatcher)
}

fn gemini_sse_body(text: &str) -> String {
    let payload = serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP",
        }],
        "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 3, "cachedContentTokenCount": 0},
    });
    format!("data: {payload}\n\n")
}

#[tokio::test]
async fn dispatch_translates_a_mocked_non_streaming_response() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = mocked_dispatcher(&server).await;

    let body = serde_json::json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "hello from mock"}]},
            "finishReason": "STOP",
        }],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 2, "cachedContentTokenCount": 0},
    });

    Mock::given(method("POST"))
        .and(path_regex(r".*:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .expect(1)
        .mount(&server)
        .await;

    let response = dispatcher.dispatch(request("gemini-2.5-pro", false)).await.unwrap();

    let ClaudeContentBlock::Text { text, .. } = &response.content[0] else {
        panic!("expected a text block, got {:?}", response.content[0]);
    };
    assert_eq!(text, "hello from mock");
    assert_eq!(response.usage.output_tokens, 2);
}

#[tokio::test]
async fn dispatch_stream_reemits_a_mocked_sse_body() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = mocked_dispatcher(&server).await;

    Mock::given(method("POST"))
        .and(path_regex(r".*:streamGenerateContent$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(gemini_sse_body("hello streaming")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_model, stream) = dispatcher.dispatch_stream(request("gemini-2.5-pro", true)).await.unwrap();
    let events: Vec<_> = stream.collect().await;
    let events: Vec<_> = events.into_iter().collect::<Result<_, _>>().unwrap();

    assert!(matches!(events.first(), Some(antigravity_types::protocol::claude::ClaudeStreamEvent::MessageStart { .. })));
    assert!(matches!(events.last(), Some(antigravity_types::protocol::claude::ClaudeStreamEvent::MessageStop)));
}

#[tokio::test]
async fn dispatch_stream_transparently_retries_an_empty_body_then_succeeds() {
    let server = MockServer::start().await;
    let (_dir, dispatcher) = mocked_dispatcher(&server).await;

    // First attempt: well-formed SSE framing with no data frame at all.
    Mock::given(method("POST"))
        .and(path_regex(r".*:streamGenerateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_string(""))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;

    // Retry: a real frame.
    Mock::given(method("POST"))
        .and(path_regex(r".*:streamGenerateContent$"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(gemini_sse_body("recovered after retry")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (_model, stream) = dispatcher.dispatch_stream(request("gemini-2.5-pro", true)).await.unwrap();
    let events: Vec<_> = stream.collect().await;
    let events: Vec<_> = events.into_iter().collect::<Result<_, _>>().unwrap();

    let has_recovered_text = events.iter().any(|event| {
        matches!(
            event,
            antigravity_types::protocol::claude::ClaudeStreamEvent::ContentBlockDelta {
                delta: antigravity_types::protocol::claude::ClaudeContentDelta::TextDelta { text },
                ..
            } if text == "recovered after retry"
        )
    });
    assert!(has_recovered_text, "expected the retried response's text to reach the client");
}
