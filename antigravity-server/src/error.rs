//! Maps [`antigravity_core::DispatchError`] onto the Anthropic-style error
//! envelope spec.md §6 requires: `{"type":"error","error":{type, message}}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub struct ApiError(pub antigravity_core::DispatchError);

impl From<antigravity_core::DispatchError> for ApiError {
    fn from(err: antigravity_core::DispatchError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = json!({
            "type": "error",
            "error": {
                "type": self.0.anthropic_error_type(),
                "message": self.0.to_string(),
            }
        });
        (status, Json(body)).into_response()
    }
}
