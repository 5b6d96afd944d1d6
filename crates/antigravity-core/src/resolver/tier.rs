//! Subscription-tier label parsing, shared by the resolver and the dashboard
//! stats model.

use antigravity_types::models::SubscriptionTier;

/// Parse a tier label string (e.g. `"standard-tier"`, `"ultra-tier"`,
/// `"free-tier"`) into a [`SubscriptionTier`], per spec §4.C's precedence:
/// contains "ultra" → ultra; exact "standard-tier" → pro; "pro"/"premium"
/// substring → pro; "free-tier" or contains "free" → free; else unknown.
pub fn parse_tier_label(label: &str) -> SubscriptionTier {
    let lower = label.to_lowercase();
    if lower.contains("ultra") {
        SubscriptionTier::Ultra
    } else if lower == "standard-tier" {
        SubscriptionTier::Pro
    } else if lower.contains("pro") || lower.contains("premium") {
        SubscriptionTier::Pro
    } else if lower == "free-tier" || lower.contains("free") {
        SubscriptionTier::Free
    } else {
        SubscriptionTier::Unknown
    }
}

/// Convenience wrapper over [`super::extract_subscription_tier`] for callers
/// that already hold a raw `loadCodeAssist`-shaped JSON response.
pub fn subscription_tier_from_response(response: &serde_json::Value) -> SubscriptionTier {
    super::extract_subscription_tier(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ultra_wins_over_other_substrings() {
        assert_eq!(parse_tier_label("gemini-ultra-tier"), SubscriptionTier::Ultra);
    }

    #[test]
    fn standard_tier_maps_to_pro() {
        assert_eq!(parse_tier_label("standard-tier"), SubscriptionTier::Pro);
    }

    #[test]
    fn free_tier_maps_to_free() {
        assert_eq!(parse_tier_label("free-tier"), SubscriptionTier::Free);
    }

    #[test]
    fn unrecognised_label_is_unknown() {
        assert_eq!(parse_tier_label("enterprise-custom"), SubscriptionTier::Unknown);
    }
}
