//! Rate-limit classification and smart backoff calculation.
//!
//! Pure functions over status code, headers, and body text — no I/O, no
//! shared state. Classification always produces a best-effort answer; it
//! never fails the way a network call can.

mod classifier;
mod dedup;
mod parser;

pub use classifier::{classify, effective_backoff_ms, smart_backoff, ClassifiedError};
pub use dedup::{RateLimitDedup, RateLimitOutcome};
pub use parser::{parse_reset_delay_ms, parse_retry_time_from_body};

use serde::{Deserialize, Serialize};

/// Error kind produced by [`classify`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    RateLimit,
    QuotaExhausted,
    ModelCapacityExhausted,
    ServerError,
    PermanentAuth,
    InvalidRequest,
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_529_is_capacity_exhausted_even_without_wording() {
        let classified = classify(529, &[], "");
        assert_eq!(classified.kind, ErrorKind::ModelCapacityExhausted);
    }

    #[test]
    fn status_500_is_server_error_regardless_of_body() {
        let classified = classify(500, &[], "quota exceeded nonsense");
        assert_eq!(classified.kind, ErrorKind::ServerError);
    }
}
