//! Bounded, TTL-expiring cache mapping an opaque thinking-block signature to
//! the model family that issued it. Claude and Gemini signature spaces are
//! incompatible; this is how the translator tells them apart on replay.

use dashmap::DashMap;

use super::thinking::ModelFamily;

const SIGNATURE_TTL_SECS: i64 = 2 * 60 * 60;
const MAX_ENTRIES: usize = 10_000;

pub struct SignatureCache {
    entries: DashMap<String, (ModelFamily, i64)>,
}

impl SignatureCache {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    /// Record that `signature` was issued by `family` at `now` (unix
    /// seconds).
    pub fn insert(&self, signature: &str, family: ModelFamily, now: i64) {
        if self.entries.len() >= MAX_ENTRIES && !self.entries.contains_key(signature) {
            self.evict_oldest();
        }
        self.entries.insert(signature.to_string(), (family, now));
    }

    /// The family that issued `signature`, if it is cached and not expired.
    pub fn family_of(&self, signature: &str, now: i64) -> Option<ModelFamily> {
        let entry = self.entries.get(signature)?;
        let (family, issued_at) = *entry;
        if now - issued_at > SIGNATURE_TTL_SECS {
            drop(entry);
            self.entries.remove(signature);
            return None;
        }
        Some(family)
    }

    /// Drop every entry older than the TTL. Call periodically, not on every
    /// lookup, to keep this off the hot path.
    pub fn sweep(&self, now: i64) {
        self.entries.retain(|_, (_, issued_at)| now - *issued_at <= SIGNATURE_TTL_SECS);
    }

    fn evict_oldest(&self) {
        if let Some(oldest_key) = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().1)
            .map(|entry| entry.key().clone())
        {
            self.entries.remove(&oldest_key);
        }
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_recalls_family() {
        let cache = SignatureCache::new();
        cache.insert("sig-1", ModelFamily::Claude, 1_000);
        assert_eq!(cache.family_of("sig-1", 1_000), Some(ModelFamily::Claude));
    }

    #[test]
    fn expires_after_ttl() {
        let cache = SignatureCache::new();
        cache.insert("sig-1", ModelFamily::Gemini, 1_000);
        assert_eq!(cache.family_of("sig-1", 1_000 + SIGNATURE_TTL_SECS + 1), None);
    }

    #[test]
    fn unknown_signature_returns_none() {
        let cache = SignatureCache::new();
        assert_eq!(cache.family_of("missing", 1_000), None);
    }
}
