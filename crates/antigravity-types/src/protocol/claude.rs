//! Anthropic Messages API wire types (inbound surface and outbound SSE).

use serde::{Deserialize, Serialize};

/// Claude message role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClaudeRole {
    User,
    Assistant,
}

/// `cache_control` marker. Upstream rejects this field outright; the
/// translator strips it from every content block before forwarding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaudeCacheControl {
    #[serde(rename = "type")]
    pub cache_type: String,
}

/// A single content block within a Claude message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<ClaudeCacheControl>,
    },
    #[serde(rename = "image")]
    Image {
        source: ClaudeImageSource,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<ClaudeCacheControl>,
    },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<ClaudeCacheControl>,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cache_control: Option<ClaudeCacheControl>,
    },
    /// Model reasoning, carried with an opaque upstream signature that must
    /// be replayed verbatim on the next turn for the same model family.
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// A thinking block upstream declined to return in full.
    #[serde(rename = "redacted_thinking")]
    RedactedThinking { data: String },
}

impl ClaudeContentBlock {
    /// Remove the `cache_control` marker, if present. No-op for variants
    /// that never carry one.
    pub fn strip_cache_control(&mut self) {
        let slot = match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => cache_control,
            Self::Thinking { .. } | Self::RedactedThinking { .. } => return,
        };
        *slot = None;
    }
}

/// Claude image source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeImageSource {
    #[serde(rename = "type")]
    pub source_type: String,
    pub media_type: String,
    pub data: String,
}

/// Claude usage statistics.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct ClaudeUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    #[serde(default)]
    pub cache_creation_input_tokens: u32,
    #[serde(default)]
    pub cache_read_input_tokens: u32,
}

/// One turn in a Claude conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessage {
    pub role: ClaudeRole,
    pub content: Vec<ClaudeContentBlock>,
}

/// The `system` field: either a bare string or a list of cacheable blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaudeSystemPrompt {
    Text(String),
    Blocks(Vec<ClaudeContentBlock>),
}

impl ClaudeSystemPrompt {
    /// Flatten to plain text, concatenating block text in order.
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ClaudeContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A tool definition in Claude's JSON-schema-ish shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeTool {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// `thinking` request field: enables/disables reasoning and bounds its
/// token budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeThinkingConfig {
    #[serde(rename = "type")]
    pub thinking_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_tokens: Option<u32>,
}

/// Inbound `POST /v1/messages` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesRequest {
    pub model: String,
    pub messages: Vec<ClaudeMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<ClaudeSystemPrompt>,
    pub max_tokens: u32,
    #[serde(default)]
    pub stream: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ClaudeTool>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ClaudeThinkingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Non-streaming `POST /v1/messages` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeMessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub response_type: String,
    pub role: ClaudeRole,
    pub content: Vec<ClaudeContentBlock>,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

impl ClaudeMessagesResponse {
    pub fn new(id: String, model: String, content: Vec<ClaudeContentBlock>, usage: ClaudeUsage) -> Self {
        Self {
            id,
            response_type: "message".to_string(),
            role: ClaudeRole::Assistant,
            content,
            model,
            stop_reason: Some("end_turn".to_string()),
            stop_sequence: None,
            usage,
        }
    }
}

/// A delta emitted inside a `content_block_delta` SSE event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { thinking: String },
    #[serde(rename = "signature_delta")]
    SignatureDelta { signature: String },
}

/// One Anthropic-style SSE event, re-emitted by the dispatch pipeline as it
/// translates upstream's streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClaudeStreamEvent {
    #[serde(rename = "message_start")]
    MessageStart { message: ClaudeMessagesResponse },
    #[serde(rename = "content_block_start")]
    ContentBlockStart { index: u32, content_block: ClaudeContentBlock },
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { index: u32, delta: ClaudeContentDelta },
    #[serde(rename = "content_block_stop")]
    ContentBlockStop { index: u32 },
    #[serde(rename = "message_delta")]
    MessageDelta { delta: serde_json::Value, usage: ClaudeUsage },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "error")]
    Error { error: serde_json::Value },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_cache_control_clears_text_block() {
        let mut block = ClaudeContentBlock::Text {
            text: "hi".to_string(),
            cache_control: Some(ClaudeCacheControl { cache_type: "ephemeral".to_string() }),
        };
        block.strip_cache_control();
        match block {
            ClaudeContentBlock::Text { cache_control, .. } => assert!(cache_control.is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn system_prompt_blocks_flatten_to_joined_text() {
        let system = ClaudeSystemPrompt::Blocks(vec![
            ClaudeContentBlock::Text { text: "a".to_string(), cache_control: None },
            ClaudeContentBlock::Text { text: "b".to_string(), cache_control: None },
        ]);
        assert_eq!(system.as_text(), "a\nb");
    }
}
