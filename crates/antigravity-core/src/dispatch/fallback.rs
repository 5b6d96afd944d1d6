//! Static cross-family model fallback map (spec §4.G "Cross-model
//! fallback"). A thinking Claude model falls back to a thinking Gemini
//! model and vice versa, so a caller stuck on an exhausted family can still
//! get an answer.

/// The model to retry with, in the other family, when every account for
/// `model` is exhausted beyond the wait threshold.
pub fn fallback_model(model: &str) -> Option<&'static str> {
    match model {
        "claude-opus-4-6-thinking" | "claude-sonnet-4-6-thinking" => Some("gemini-3-pro-thinking"),
        "claude-opus-4-6" | "claude-sonnet-4-6" => Some("gemini-3-pro"),
        "claude-haiku-4-6" => Some("gemini-2.5-flash"),
        "gemini-3-pro-thinking" => Some("claude-opus-4-6-thinking"),
        "gemini-3-pro" => Some("claude-opus-4-6"),
        "gemini-2.5-flash" => Some("claude-haiku-4-6"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thinking_claude_falls_back_to_thinking_gemini() {
        assert_eq!(fallback_model("claude-opus-4-6-thinking"), Some("gemini-3-pro-thinking"));
    }

    #[test]
    fn unmapped_model_has_no_fallback() {
        assert_eq!(fallback_model("some-unlisted-model"), None);
    }
}
