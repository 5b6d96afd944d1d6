//! Per-endpoint attempt result, replacing exception-driven control flow
//! with an ordinary `match` (spec §9 design note).

use crate::error::DispatchError;

/// What happened when one (account, endpoint) combination was tried.
pub enum EndpointOutcome {
    /// 2xx: caller should consume `response` (JSON or SSE, per mode).
    Success(reqwest::Response),
    /// Try the next endpoint host with the same account and request.
    NextEndpoint,
    /// Abandon this account and move to the next one after `delay_ms`.
    SwitchAccount { reason: String, delay_ms: i64 },
    /// Unrecoverable: surface `kind` to the caller immediately.
    Fatal { kind: DispatchError },
}
