//! Model-family and thinking-capability detection.

/// Which upstream family a model name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelFamily {
    Claude,
    Gemini,
    Unknown,
}

impl ModelFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Claude => "claude",
            Self::Gemini => "gemini",
            Self::Unknown => "unknown",
        }
    }
}

/// Determine family by name substring.
pub fn model_family(model: &str) -> ModelFamily {
    let lower = model.to_lowercase();
    if lower.contains("claude") {
        ModelFamily::Claude
    } else if lower.contains("gemini") {
        ModelFamily::Gemini
    } else {
        ModelFamily::Unknown
    }
}

/// First integer found immediately after the `gemini` token, e.g.
/// `gemini-3-pro-preview` -> `Some(3)`.
fn gemini_version(model: &str) -> Option<u32> {
    let lower = model.to_lowercase();
    let after = lower.split("gemini").nth(1)?;
    let digits: String = after
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Whether this model emits thinking/reasoning content.
pub fn is_thinking_capable(model: &str) -> bool {
    let lower = model.to_lowercase();
    match model_family(model) {
        ModelFamily::Claude => lower.contains("thinking"),
        ModelFamily::Gemini => lower.contains("thinking") || gemini_version(model).map_or(false, |v| v >= 3),
        ModelFamily::Unknown => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_family_by_substring() {
        assert_eq!(model_family("claude-opus-4-6"), ModelFamily::Claude);
        assert_eq!(model_family("gemini-2.5-pro"), ModelFamily::Gemini);
        assert_eq!(model_family("some-other-model"), ModelFamily::Unknown);
    }

    #[test]
    fn claude_thinking_capability_requires_name_substring() {
        assert!(is_thinking_capable("claude-opus-4-6-thinking"));
        assert!(!is_thinking_capable("claude-opus-4-6"));
    }

    #[test]
    fn gemini_thinking_capability_by_name_or_version() {
        assert!(is_thinking_capable("gemini-thinking-pro"));
        assert!(is_thinking_capable("gemini-3-pro-preview"));
        assert!(!is_thinking_capable("gemini-2.5-flash"));
    }
}
