//! Cached OAuth access token entry.
//!
//! This is the resolver's per-email cache entry (spec §5: "Token cache:
//! per-email, TTL 5 min"), not the durable credential — the durable
//! credential is `Account::credential` (the composite refresh token, API
//! key, or local-db marker).

use serde::{Deserialize, Serialize};

/// A resolved, short-lived access token plus the bookkeeping needed to
/// decide whether it can still be served from cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenData {
    /// Bearer access token presented to upstream.
    pub access_token: String,
    /// Token type, always "Bearer" in practice.
    pub token_type: String,
    /// Absolute instant the access token itself expires (per OAuth `expires_in`).
    pub expiry_timestamp: i64,
    /// Absolute instant this cache entry was populated.
    pub fetched_at: i64,
}

impl TokenData {
    /// Build a cache entry for a token valid for `expires_in` seconds from now.
    pub fn new(access_token: String, expires_in: i64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expiry_timestamp: now.saturating_add(expires_in),
            fetched_at: now,
        }
    }

    /// Whether the underlying OAuth token has expired.
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expiry_timestamp
    }

    /// Whether this cache entry is still within the resolver's freshness
    /// window (default 5 minutes) and therefore reusable without a refresh.
    pub fn is_cache_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        now.saturating_sub(self.fetched_at) <= ttl_secs && !self.is_expired(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_entry_expires_after_ttl() {
        let token = TokenData {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expiry_timestamp: 10_000,
            fetched_at: 0,
        };
        assert!(token.is_cache_fresh(200, 300));
        assert!(!token.is_cache_fresh(400, 300));
    }

    #[test]
    fn expired_token_is_never_cache_fresh() {
        let token = TokenData {
            access_token: "tok".to_string(),
            token_type: "Bearer".to_string(),
            expiry_timestamp: 100,
            fetched_at: 0,
        };
        assert!(!token.is_cache_fresh(50, 300));
    }
}
