//! Header- and body-driven reset-delay parsing.
//!
//! Grounded in the upstream's own rate-limit responses: a `Retry-After`
//! header when present, otherwise one of several JSON/free-text shapes the
//! body may carry. Every parser here is infallible — a miss just falls
//! through to the next candidate.

use chrono::DateTime;
use regex::Regex;
use std::sync::OnceLock;

fn duration_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:(\d+)h)?\s*(?:(\d+)m)?\s*(?:(\d+(?:\.\d+)?)s)?\s*(?:(\d+)ms)?").unwrap()
    })
}

fn retry_m_s_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)try again in\s*(\d+)m\s*(\d+(?:\.\d+)?)s").unwrap())
}

fn retry_s_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:try again in|backoff for|wait)\s*(\d+(?:\.\d+)?)\s*s(?:econds)?")
            .unwrap()
    })
}

fn quota_reset_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)quota will reset in\s*(\d+)\s*second").unwrap())
}

fn retry_after_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)retry after\s*(\d+)\s*second").unwrap())
}

fn wait_paren_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\(wait\s*(\d+(?:\.\d+)?)s\)").unwrap())
}

fn reset_iso_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)reset:\s*([0-9T:\.\-Z+]+)").unwrap())
}

/// Parse a duration expression like `1h23m45s` or `250ms` into milliseconds.
/// Every group in `duration_regex()` is optional, so a naive single
/// `.captures()` call matches the empty string at the very start of
/// anything (a JSON body starting with `{`, for instance) before ever
/// reaching a real duration literal later in the text. Scan every match
/// `captures_iter` finds and skip the all-zero ones instead.
pub fn parse_duration_string(text: &str) -> Option<i64> {
    for captures in duration_regex().captures_iter(text) {
        let hours: i64 = captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let minutes: i64 = captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let seconds: f64 = captures.get(3).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
        let millis: i64 = captures.get(4).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);

        if hours == 0 && minutes == 0 && seconds == 0.0 && millis == 0 {
            continue;
        }

        return Some(hours * 3_600_000 + minutes * 60_000 + (seconds * 1000.0) as i64 + millis);
    }
    None
}

/// A JSON number, or a numeric string, with no unit assumption.
fn json_number(value: &serde_json::Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// A JSON number (assumed seconds) or a `"12s"`-style string.
fn json_seconds(value: &serde_json::Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_str().and_then(|s| s.trim().strip_suffix('s').unwrap_or(s.trim()).parse().ok()))
}

fn parse_iso_to_delay_ms(iso: &str, now_ms: i64) -> Option<i64> {
    let parsed = DateTime::parse_from_rfc3339(iso).ok()?;
    Some(parsed.timestamp_millis() - now_ms)
}

/// Header precedence: `Retry-After` (seconds or HTTP-date) →
/// `x-ratelimit-reset` (unix seconds) → `x-ratelimit-reset-after` (seconds).
pub fn parse_reset_delay_ms(headers: &[(&str, &str)], now_ms: i64) -> Option<i64> {
    let get = |name: &str| {
        headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, value)| *value)
    };

    if let Some(value) = get("retry-after") {
        if let Ok(seconds) = value.trim().parse::<f64>() {
            return Some((seconds * 1000.0) as i64);
        }
        if let Ok(date) = DateTime::parse_from_rfc2822(value) {
            return Some(date.timestamp_millis() - now_ms);
        }
    }

    if let Some(value) = get("x-ratelimit-reset") {
        if let Ok(unix_secs) = value.trim().parse::<i64>() {
            return Some(unix_secs * 1000 - now_ms);
        }
    }

    if let Some(value) = get("x-ratelimit-reset-after") {
        if let Ok(seconds) = value.trim().parse::<f64>() {
            return Some((seconds * 1000.0) as i64);
        }
    }

    None
}

/// Body-driven fallback cascade, tried in the order the spec documents.
pub fn parse_retry_time_from_body(body: &str, now_ms: i64) -> Option<i64> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let Some(delay) = value.pointer("/error/quotaResetDelay").and_then(|v| v.as_str()) {
            if let Some(ms) = parse_duration_string(delay) {
                return Some(ms);
            }
        }
        if let Some(stamp) = value.pointer("/error/quotaResetTimeStamp").and_then(|v| v.as_str()) {
            if let Some(ms) = parse_iso_to_delay_ms(stamp, now_ms) {
                return Some(ms);
            }
        }
        // `retry-after-ms` is already milliseconds; `retryDelay` is seconds,
        // either bare ("12") or suffixed ("12s").
        if let Some(ms) = value.pointer("/error/retry-after-ms").and_then(json_number) {
            return Some(ms as i64);
        }
        if let Some(secs) = value.pointer("/error/retryDelay").and_then(json_seconds) {
            return Some((secs * 1000.0) as i64);
        }
    }

    if let Some(captures) = retry_m_s_regex().captures(body) {
        let minutes: f64 = captures.get(1).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
        let seconds: f64 = captures.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0.0);
        return Some(((minutes * 60.0 + seconds) * 1000.0) as i64);
    }

    if let Some(captures) = retry_s_regex().captures(body) {
        let seconds: f64 = captures.get(1).and_then(|m| m.as_str().parse().ok())?;
        return Some((seconds * 1000.0) as i64);
    }

    if let Some(captures) = quota_reset_regex().captures(body) {
        let seconds: f64 = captures.get(1).and_then(|m| m.as_str().parse().ok())?;
        return Some((seconds * 1000.0) as i64);
    }

    if let Some(captures) = retry_after_regex().captures(body) {
        let seconds: f64 = captures.get(1).and_then(|m| m.as_str().parse().ok())?;
        return Some((seconds * 1000.0) as i64);
    }

    if let Some(ms) = parse_duration_string(body) {
        return Some(ms);
    }

    if let Some(captures) = wait_paren_regex().captures(body) {
        let seconds: f64 = captures.get(1).and_then(|m| m.as_str().parse().ok())?;
        return Some((seconds * 1000.0) as i64);
    }

    if let Some(captures) = reset_iso_regex().captures(body) {
        let iso = captures.get(1)?.as_str();
        if let Some(ms) = parse_iso_to_delay_ms(iso, now_ms) {
            return Some(ms);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_header_wins_over_body() {
        let headers = [("Retry-After", "5")];
        let delay = parse_reset_delay_ms(&headers, 0);
        assert_eq!(delay, Some(5000));
    }

    #[test]
    fn x_ratelimit_reset_is_unix_seconds() {
        let headers = [("x-ratelimit-reset", "10")];
        let delay = parse_reset_delay_ms(&headers, 0);
        assert_eq!(delay, Some(10_000));
    }

    #[test]
    fn body_quota_reset_delay_string() {
        let body = r#"{"error":{"quotaResetDelay":"2m30s"}}"#;
        assert_eq!(parse_retry_time_from_body(body, 0), Some(150_000));
    }

    #[test]
    fn body_try_again_in_minutes_seconds() {
        let body = "rate limited, try again in 1m30s please";
        assert_eq!(parse_retry_time_from_body(body, 0), Some(90_000));
    }

    #[test]
    fn body_quota_will_reset_phrase() {
        let body = "quota will reset in 45 seconds";
        assert_eq!(parse_retry_time_from_body(body, 0), Some(45_000));
    }

    #[test]
    fn duration_expression_parses_hours_minutes_seconds() {
        assert_eq!(parse_duration_string("1h23m45s"), Some(5_025_000));
    }

    #[test]
    fn no_match_returns_none() {
        assert_eq!(parse_retry_time_from_body("no timing information here", 0), None);
    }

    #[test]
    fn retry_after_ms_is_not_rescaled() {
        let body = r#"{"error":{"retry-after-ms":5000}}"#;
        assert_eq!(parse_retry_time_from_body(body, 0), Some(5_000));
    }

    #[test]
    fn retry_delay_numeric_seconds_is_scaled_to_ms() {
        let body = r#"{"error":{"retryDelay":5}}"#;
        assert_eq!(parse_retry_time_from_body(body, 0), Some(5_000));
    }

    #[test]
    fn retry_delay_seconds_string_is_parsed() {
        let body = r#"{"error":{"retryDelay":"12s"}}"#;
        assert_eq!(parse_retry_time_from_body(body, 0), Some(12_000));
    }

    #[test]
    fn duration_expression_embedded_in_json_body_is_found() {
        let body = r#"{"error":{"message":"backoff 1h23m45s before retrying"}}"#;
        assert_eq!(parse_duration_string(body), Some(5_025_000));
    }
}
