//! `GET /v1/models`: the fixed set of model ids this proxy accepts on
//! `POST /v1/messages`.

use axum::response::Json;
use serde_json::{json, Value};

const SUPPORTED_MODELS: &[&str] = &[
    "claude-opus-4-6",
    "claude-sonnet-4-6",
    "claude-haiku-4-6",
    "gemini-3-pro-preview",
    "gemini-3-flash-preview",
];

pub async fn handle_list_models() -> Json<Value> {
    let data: Vec<Value> = SUPPORTED_MODELS
        .iter()
        .map(|id| json!({"id": id, "object": "model", "created": 0, "owned_by": "antigravity"}))
        .collect();
    Json(json!({"object": "list", "data": data}))
}
