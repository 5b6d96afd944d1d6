//! `POST /v1/messages` and `POST /v1/messages/count_tokens`.

use antigravity_core::translator::model_family;
use antigravity_types::protocol::claude::{ClaudeMessagesRequest, ClaudeStreamEvent};
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;

use crate::error::ApiError;
use crate::state::AppState;

fn event_name(event: &ClaudeStreamEvent) -> &'static str {
    match event {
        ClaudeStreamEvent::MessageStart { .. } => "message_start",
        ClaudeStreamEvent::ContentBlockStart { .. } => "content_block_start",
        ClaudeStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
        ClaudeStreamEvent::ContentBlockStop { .. } => "content_block_stop",
        ClaudeStreamEvent::MessageDelta { .. } => "message_delta",
        ClaudeStreamEvent::MessageStop => "message_stop",
        ClaudeStreamEvent::Ping => "ping",
        ClaudeStreamEvent::Error { .. } => "error",
    }
}

pub async fn handle_messages(
    State(state): State<AppState>,
    Json(request): Json<ClaudeMessagesRequest>,
) -> Result<Response, ApiError> {
    if request.stream {
        let (resolved_model, stream) = state.dispatcher.clone().dispatch_stream(request).await?;
        let family = model_family(&resolved_model);
        state.usage_stats.record(family, &resolved_model, chrono::Utc::now().timestamp()).await;

        let sse_stream = stream.map(move |item| -> Result<Event, std::convert::Infallible> {
            match item {
                Ok(event) => {
                    let name = event_name(&event);
                    let data = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    Ok(Event::default().event(name).data(data))
                }
                Err(err) => {
                    let data = serde_json::json!({"type": "error", "error": {"type": err.anthropic_error_type(), "message": err.to_string()}});
                    Ok(Event::default().event("error").data(data.to_string()))
                }
            }
        });

        Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()).into_response())
    } else {
        let response = state.dispatcher.dispatch(request).await?;
        let family = model_family(&response.model);
        state.usage_stats.record(family, &response.model, chrono::Utc::now().timestamp()).await;
        Ok(Json(response).into_response())
    }
}

pub async fn handle_count_tokens() -> Response {
    let body = serde_json::json!({
        "type": "error",
        "error": {
            "type": "not_found_error",
            "message": "count_tokens is not implemented by this proxy",
        }
    });
    (axum::http::StatusCode::NOT_IMPLEMENTED, Json(body)).into_response()
}
