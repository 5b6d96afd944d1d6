//! Stable session-id derivation for upstream prompt-cache locality.

use sha2::{Digest, Sha256};

use antigravity_types::protocol::claude::{ClaudeContentBlock, ClaudeMessage, ClaudeRole};

/// Hash the first user message's textual content into a stable id, sent to
/// upstream unchanged across every turn of the same conversation so its
/// prompt cache stays warm.
pub fn session_id(messages: &[ClaudeMessage]) -> String {
    let first_user_text = messages
        .iter()
        .find(|m| m.role == ClaudeRole::User)
        .map(|m| {
            m.content
                .iter()
                .filter_map(|block| match block {
                    ClaudeContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(first_user_text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_message(role: ClaudeRole, text: &str) -> ClaudeMessage {
        ClaudeMessage { role, content: vec![ClaudeContentBlock::Text { text: text.to_string(), cache_control: None }] }
    }

    #[test]
    fn identical_first_user_message_yields_equal_session_ids() {
        let a = vec![text_message(ClaudeRole::User, "hello there")];
        let b = vec![
            text_message(ClaudeRole::User, "hello there"),
            text_message(ClaudeRole::Assistant, "hi"),
        ];
        assert_eq!(session_id(&a), session_id(&b));
    }

    #[test]
    fn different_first_user_message_yields_different_session_ids() {
        let a = vec![text_message(ClaudeRole::User, "hello there")];
        let b = vec![text_message(ClaudeRole::User, "goodbye")];
        assert_ne!(session_id(&a), session_id(&b));
    }
}
