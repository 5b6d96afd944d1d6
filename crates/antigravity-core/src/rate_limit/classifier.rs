//! Status/body classification and smart-backoff calculation.

use rand::Rng;

use super::parser::{parse_reset_delay_ms, parse_retry_time_from_body};
use super::ErrorKind;

/// Result of classifying one upstream error response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Server-provided reset delay in milliseconds, normalised, if any.
    pub reset_delay_ms: Option<i64>,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    let lower = haystack.to_lowercase();
    needles.iter().any(|needle| lower.contains(needle))
}

fn classify_by_wording(body: &str) -> ErrorKind {
    if contains_any(body, &["quota", "daily limit", "daily-limit"]) {
        ErrorKind::QuotaExhausted
    } else if contains_any(body, &["capacity", "overloaded"]) {
        ErrorKind::ModelCapacityExhausted
    } else if contains_any(body, &["rate limit", "too many", "throttle"]) {
        ErrorKind::RateLimit
    } else if contains_any(body, &["server error", "internal error"]) {
        ErrorKind::ServerError
    } else if contains_any(
        body,
        &["invalid_grant", "token revoked", "invalid_client", "credentials are invalid"],
    ) {
        ErrorKind::PermanentAuth
    } else {
        ErrorKind::Unknown
    }
}

/// Normalise a raw computed delay per the spec's floor/buffer rules:
/// `<= 0` becomes 500ms; `< 500ms` gains a 200ms network-latency buffer;
/// `>= 500ms` passes through unchanged.
fn normalize_delay(raw_ms: i64) -> i64 {
    if raw_ms <= 0 {
        500
    } else if raw_ms < 500 {
        raw_ms + 200
    } else {
        raw_ms
    }
}

/// Classify an upstream error response into an [`ErrorKind`] plus any
/// server-provided reset delay.
pub fn classify(status: u16, headers: &[(&str, &str)], body: &str) -> ClassifiedError {
    let now_ms = chrono::Utc::now().timestamp_millis();
    let raw_delay =
        parse_reset_delay_ms(headers, now_ms).or_else(|| parse_retry_time_from_body(body, now_ms));
    let reset_delay_ms = raw_delay.map(normalize_delay);

    let kind = if status == 500 {
        ErrorKind::ServerError
    } else if status == 529 || (status == 503 && contains_any(body, &["capacity", "overloaded"])) {
        ErrorKind::ModelCapacityExhausted
    } else if status == 400 {
        ErrorKind::InvalidRequest
    } else {
        classify_by_wording(body)
    };

    ClassifiedError { kind, reset_delay_ms }
}

const QUOTA_LOCKOUT_TIERS_MS: [i64; 4] = [60_000, 300_000, 1_800_000, 7_200_000];

/// Smart backoff for the given kind when upstream gave no usable delay.
pub fn smart_backoff(kind: ErrorKind, consecutive_failures: u32) -> i64 {
    match kind {
        ErrorKind::QuotaExhausted => {
            let tier_index = consecutive_failures.saturating_sub(1).min(3) as usize;
            QUOTA_LOCKOUT_TIERS_MS[tier_index]
        }
        ErrorKind::ModelCapacityExhausted => {
            let jitter = rand::thread_rng().gen_range(-5_000..=5_000);
            (15_000 + jitter).max(0)
        }
        ErrorKind::RateLimit => 30_000,
        ErrorKind::ServerError => 20_000,
        ErrorKind::Unknown => 60_000,
        ErrorKind::PermanentAuth | ErrorKind::InvalidRequest => 0,
    }
}

/// Effective backoff: server-provided delay (floored at 2s) overrides the
/// smart-backoff table entirely.
pub fn effective_backoff_ms(classified: &ClassifiedError, consecutive_failures: u32) -> i64 {
    match classified.reset_delay_ms {
        Some(ms) => ms.max(2_000),
        None => smart_backoff(classified.kind, consecutive_failures),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_backoff_escalates_by_tier() {
        assert_eq!(smart_backoff(ErrorKind::QuotaExhausted, 1), 60_000);
        assert_eq!(smart_backoff(ErrorKind::QuotaExhausted, 2), 300_000);
        assert_eq!(smart_backoff(ErrorKind::QuotaExhausted, 3), 1_800_000);
        assert_eq!(smart_backoff(ErrorKind::QuotaExhausted, 10), 7_200_000);
    }

    #[test]
    fn capacity_jitter_stays_within_window() {
        for _ in 0..50 {
            let delay = smart_backoff(ErrorKind::ModelCapacityExhausted, 1);
            assert!((10_000..=20_000).contains(&delay));
        }
    }

    #[test]
    fn server_provided_delay_has_a_two_second_floor() {
        let classified = ClassifiedError { kind: ErrorKind::RateLimit, reset_delay_ms: Some(500) };
        assert_eq!(effective_backoff_ms(&classified, 1), 2_000);
    }

    #[test]
    fn status_400_classifies_as_invalid_request() {
        let classified = classify(400, &[], "token limit exceeded");
        assert_eq!(classified.kind, ErrorKind::InvalidRequest);
    }

    #[test]
    fn permanent_auth_wording_is_detected() {
        let classified = classify(401, &[], r#"{"error":"invalid_grant"}"#);
        assert_eq!(classified.kind, ErrorKind::PermanentAuth);
    }
}
