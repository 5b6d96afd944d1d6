//! Dispatcher-wide error type.
//!
//! Maps directly onto the taxonomy in the dispatch design: every variant
//! knows its HTTP status and its Anthropic-style `error.type` string so a
//! handler can turn any `DispatchError` into a wire response without a
//! second lookup table.

use antigravity_types::error::{AccountError, ProxyError};
use thiserror::Error;

/// Errors that can surface out of the account pool, dispatch pipeline, or
/// translator.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No account in the pool can currently serve this request.
    #[error("no available account: {0}")]
    NoAvailableAccount(String),

    /// Every endpoint/account combination was exhausted without success.
    #[error("upstream exhausted after {attempts} attempts: {message}")]
    UpstreamExhausted { attempts: u32, message: String },

    /// Upstream returned a rate-limit response that retrying cannot clear
    /// within the caller's patience (propagated to the client as 429).
    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Every account is quota-exhausted well past the reset a client could
    /// usefully wait out. Surfaced as 400 so clients don't auto-retry past
    /// the reset time the way they would for a plain 429.
    #[error("quota exhausted: {0}")]
    QuotaExhausted(String),

    /// The inbound request body failed translation or validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Upstream returned a response this translator cannot represent.
    #[error("translation failed: {0}")]
    TranslationFailed(String),

    /// Streaming connection was interrupted mid-response.
    #[error("stream error: {0}")]
    StreamError(String),

    /// Account credential storage failed.
    #[error(transparent)]
    Account(#[from] AccountError),

    /// Outbound HTTP call failed.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Local file I/O failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other internal failure not worth a dedicated variant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status code to report to the client, matching Anthropic's own
    /// status usage for each error class.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoAvailableAccount(_) => 503,
            Self::UpstreamExhausted { .. } => 502,
            Self::RateLimited { .. } => 429,
            Self::QuotaExhausted(_) => 400,
            Self::InvalidRequest(_) => 400,
            Self::TranslationFailed(_) => 502,
            Self::StreamError(_) => 502,
            Self::Account(err) => account_error_status(err),
            Self::Transport(_) => 502,
            Self::Serialization(_) => 500,
            Self::Io(_) => 500,
            Self::Internal(_) => 500,
        }
    }

    /// Anthropic error envelope `type` field
    /// (<https://docs.anthropic.com/en/api/errors>).
    pub fn anthropic_error_type(&self) -> &'static str {
        match self {
            Self::NoAvailableAccount(_) | Self::UpstreamExhausted { .. } => "api_error",
            Self::RateLimited { .. } => "rate_limit_error",
            Self::QuotaExhausted(_) => "invalid_request_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::TranslationFailed(_) | Self::StreamError(_) => "api_error",
            Self::Account(_) => "api_error",
            Self::Transport(_) => "api_error",
            Self::Serialization(_) | Self::Io(_) | Self::Internal(_) => "api_error",
        }
    }
}

fn account_error_status(err: &AccountError) -> u16 {
    match err {
        AccountError::NotFound { .. } => 404,
        AccountError::Disabled { .. } => 403,
        AccountError::TokenExpired { .. } | AccountError::TokenRefreshFailed { .. } => 401,
        AccountError::PoolExhausted { .. } => 503,
        AccountError::ConcurrentModification { .. } => 409,
        AccountError::ValidationError { .. } => 400,
        AccountError::StorageError { .. } => 500,
    }
}

impl From<ProxyError> for DispatchError {
    fn from(err: ProxyError) -> Self {
        match err {
            ProxyError::RateLimited { retry_after_secs, .. } => {
                Self::RateLimited { retry_after_secs: retry_after_secs.unwrap_or(60) }
            }
            ProxyError::NoAvailableAccounts { reason } => Self::NoAvailableAccount(reason),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Workspace-standard result alias.
pub type DispatchResult<T> = std::result::Result<T, DispatchError>;
