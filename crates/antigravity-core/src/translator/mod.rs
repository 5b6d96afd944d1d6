//! Format Translator (spec §4.F): bidirectional conversion between the
//! Anthropic Messages wire format and the upstream `generateContent` format,
//! with thinking-block signature handling, tool-use recovery, schema
//! sanitisation and usage accounting.
//!
//! Mirrors the teacher's split between wire-format structs
//! (`antigravity-types::protocol`) and conversion logic (here).

mod schema;
mod session;
mod signature_cache;
mod thinking;

pub use session::session_id;
pub use signature_cache::SignatureCache;
pub use thinking::{is_thinking_capable, model_family, ModelFamily};

use std::collections::HashMap;

use antigravity_types::models::{ThinkingBudgetConfig, ThinkingBudgetMode};
use antigravity_types::protocol::claude::{
    ClaudeContentBlock, ClaudeMessage, ClaudeMessagesRequest, ClaudeMessagesResponse, ClaudeRole, ClaudeUsage,
};
use antigravity_types::protocol::gemini::{
    GeminiContent, GeminiGenerateContentRequest, GeminiGenerateContentResponse, GeminiGenerationConfig, GeminiPart,
    GeminiRole, GeminiThinkingConfig, GeminiTool, GeminiFunctionDeclaration,
};

use crate::error::{DispatchError, DispatchResult};

/// Sentinel substituted for a thinking-signature slot the translator cannot
/// fill with a valid Gemini signature, so the conversation keeps its
/// Gemini-side thought-part shape without replaying a foreign signature.
const SKIP_THOUGHT_SIGNATURE: &str = "skip_thought_signature_validator";

/// Strip every `cache_control` marker from a request's messages and system
/// blocks in place. Upstream rejects the field outright.
pub fn clean_cache_control(messages: &mut [ClaudeMessage]) {
    for message in messages {
        for block in &mut message.content {
            block.strip_cache_control();
        }
    }
}

/// If the conversation ends on an assistant turn containing unanswered
/// `tool_use` blocks, append a synthetic user turn with matching
/// `tool_result` blocks so the upstream receives a well-formed exchange.
pub fn recover_unclosed_tool_use(messages: &mut Vec<ClaudeMessage>) {
    let Some(last) = messages.last() else { return };
    if last.role != ClaudeRole::Assistant {
        return;
    }
    let pending_ids: Vec<String> = last
        .content
        .iter()
        .filter_map(|block| match block {
            ClaudeContentBlock::ToolUse { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect();
    if pending_ids.is_empty() {
        return;
    }
    let synthetic = ClaudeMessage {
        role: ClaudeRole::User,
        content: pending_ids
            .into_iter()
            .map(|tool_use_id| ClaudeContentBlock::ToolResult {
                tool_use_id,
                content: "Tool execution was interrupted; tool loop closed.".to_string(),
                is_error: Some(true),
                cache_control: None,
            })
            .collect(),
    };
    messages.push(synthetic);
}

/// Build a tool_use id -> tool name map across the whole history, needed to
/// fill Gemini's `functionResponse.name` when converting `tool_result`
/// blocks, which only carry the id on the Claude side.
fn tool_name_index(messages: &[ClaudeMessage]) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for message in messages {
        for block in &message.content {
            if let ClaudeContentBlock::ToolUse { id, name, .. } = block {
                index.insert(id.clone(), name.clone());
            }
        }
    }
    index
}

pub struct Translator {
    signatures: SignatureCache,
}

impl Translator {
    pub fn new() -> Self {
        Self { signatures: SignatureCache::new() }
    }

    pub fn signature_cache(&self) -> &SignatureCache {
        &self.signatures
    }

    /// Convert an inbound Anthropic request into an upstream `generateContent`
    /// body targeting `upstream_model`.
    pub fn translate_request(
        &self,
        request: &ClaudeMessagesRequest,
        upstream_model: &str,
        thinking_cfg: &ThinkingBudgetConfig,
        now: i64,
    ) -> DispatchResult<GeminiGenerateContentRequest> {
        let mut messages = request.messages.clone();
        clean_cache_control(&mut messages);
        recover_unclosed_tool_use(&mut messages);

        let target_family = model_family(upstream_model);
        let tool_names = tool_name_index(&messages);

        let mut contents = Vec::with_capacity(messages.len());
        for message in &messages {
            let parts: Vec<GeminiPart> = message
                .content
                .iter()
                .filter_map(|block| self.block_to_part(block, target_family, &tool_names, now))
                .collect();
            if parts.is_empty() {
                continue;
            }
            contents.push(GeminiContent { role: Some(claude_role_to_gemini(message.role)), parts });
        }

        let system_instruction = request
            .system
            .as_ref()
            .map(|system| GeminiContent { role: None, parts: vec![GeminiPart::text(system.as_text())] });

        let tools = request.tools.as_ref().map(|tools| {
            vec![GeminiTool {
                function_declarations: tools
                    .iter()
                    .map(|tool| GeminiFunctionDeclaration {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: Some(schema::sanitize_schema(&tool.input_schema)),
                    })
                    .collect(),
            }]
        });

        let thinking_config = resolve_thinking_config(request, upstream_model, thinking_cfg);

        let generation_config = GeminiGenerationConfig {
            temperature: request.temperature,
            top_p: request.top_p,
            top_k: request.top_k,
            max_output_tokens: Some(request.max_tokens),
            stop_sequences: request.stop_sequences.clone(),
            thinking_config,
        };

        Ok(GeminiGenerateContentRequest {
            contents,
            system_instruction,
            tools,
            generation_config: Some(generation_config),
        })
    }

    fn block_to_part(
        &self,
        block: &ClaudeContentBlock,
        target_family: ModelFamily,
        tool_names: &HashMap<String, String>,
        now: i64,
    ) -> Option<GeminiPart> {
        match block {
            ClaudeContentBlock::Text { text, .. } => Some(GeminiPart::text(text.clone())),
            ClaudeContentBlock::Image { source, .. } => Some(GeminiPart {
                inline_data: Some(antigravity_types::protocol::gemini::GeminiInlineData {
                    mime_type: source.media_type.clone(),
                    data: source.data.clone(),
                }),
                ..Default::default()
            }),
            ClaudeContentBlock::ToolUse { name, input, .. } => Some(GeminiPart::function_call(name.clone(), input.clone())),
            ClaudeContentBlock::ToolResult { tool_use_id, content, .. } => {
                let name = tool_names.get(tool_use_id).cloned().unwrap_or_else(|| tool_use_id.clone());
                Some(GeminiPart::function_response(name, serde_json::json!({ "output": content })))
            }
            ClaudeContentBlock::Thinking { thinking, signature } => {
                self.thinking_block_to_part(thinking, signature.as_deref(), target_family, now)
            }
            // No Gemini analog for a redacted thinking block; only ever
            // replayed back to Claude, where it is handled upstream of this
            // conversion path.
            ClaudeContentBlock::RedactedThinking { .. } => None,
        }
    }

    fn thinking_block_to_part(
        &self,
        thinking: &str,
        signature: Option<&str>,
        target_family: ModelFamily,
        now: i64,
    ) -> Option<GeminiPart> {
        if target_family != ModelFamily::Gemini {
            // Claude targets tolerate unknown signatures; Claude validates
            // its own history.
            return Some(GeminiPart {
                thought: Some(true),
                text: Some(thinking.to_string()),
                thought_signature: signature.map(str::to_string),
                ..Default::default()
            });
        }

        let signature_family = signature.and_then(|sig| self.signatures.family_of(sig, now));
        let resolved_signature = match signature_family {
            Some(ModelFamily::Gemini) => signature.map(str::to_string),
            _ => Some(SKIP_THOUGHT_SIGNATURE.to_string()),
        };

        Some(GeminiPart {
            thought: Some(true),
            text: Some(thinking.to_string()),
            thought_signature: resolved_signature,
            ..Default::default()
        })
    }

    /// Convert an upstream response into an Anthropic Messages response,
    /// caching any thinking signatures it carries.
    pub fn translate_response(
        &self,
        response: &GeminiGenerateContentResponse,
        model: &str,
        now: i64,
    ) -> DispatchResult<ClaudeMessagesResponse> {
        let family = model_family(model);
        let candidate = response
            .candidates
            .first()
            .ok_or_else(|| DispatchError::TranslationFailed("upstream returned no candidates".to_string()))?;

        let mut content = Vec::with_capacity(candidate.content.parts.len());
        for part in &candidate.content.parts {
            if let Some(signature) = &part.thought_signature {
                self.signatures.insert(signature, family, now);
            }
            if let Some(block) = self.part_to_block(part) {
                content.push(block);
            }
        }

        let usage = response.usage_metadata.map(gemini_usage_to_claude).unwrap_or_default();

        let mut result = ClaudeMessagesResponse::new(format!("msg_{}", uuid::Uuid::new_v4()), model.to_string(), content, usage);
        result.stop_reason = candidate.finish_reason.as_deref().map(map_finish_reason).map(str::to_string);
        Ok(result)
    }

    fn part_to_block(&self, part: &GeminiPart) -> Option<ClaudeContentBlock> {
        if part.thought == Some(true) {
            return Some(ClaudeContentBlock::Thinking {
                thinking: part.text.clone().unwrap_or_default(),
                signature: part.thought_signature.clone(),
            });
        }
        if let Some(call) = &part.function_call {
            return Some(ClaudeContentBlock::ToolUse {
                id: format!("toolu_{}", uuid::Uuid::new_v4()),
                name: call.name.clone(),
                input: call.args.clone(),
                cache_control: None,
            });
        }
        part.text.clone().map(|text| ClaudeContentBlock::Text { text, cache_control: None })
    }
}

impl Default for Translator {
    fn default() -> Self {
        Self::new()
    }
}

fn claude_role_to_gemini(role: ClaudeRole) -> GeminiRole {
    match role {
        ClaudeRole::User => GeminiRole::User,
        ClaudeRole::Assistant => GeminiRole::Model,
    }
}

fn map_finish_reason(reason: &str) -> &'static str {
    match reason {
        "MAX_TOKENS" => "max_tokens",
        "STOP" => "end_turn",
        _ => "end_turn",
    }
}

fn gemini_usage_to_claude(usage: antigravity_types::protocol::gemini::GeminiUsageMetadata) -> ClaudeUsage {
    ClaudeUsage {
        input_tokens: usage.prompt_token_count.saturating_sub(usage.cached_content_token_count),
        output_tokens: usage.candidates_token_count,
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: usage.cached_content_token_count,
    }
}

/// Resolve the outbound `thinkingConfig` per mode. `Auto` caps Gemini Flash
/// at 24576; `Passthrough` forwards the client's value unchanged; `Custom`
/// uses the fixed configured value; `Adaptive` omits a numeric budget and
/// relies on the upstream's own effort-based default.
fn resolve_thinking_config(
    request: &ClaudeMessagesRequest,
    upstream_model: &str,
    config: &ThinkingBudgetConfig,
) -> Option<GeminiThinkingConfig> {
    if !thinking::is_thinking_capable(upstream_model) && request.thinking.is_none() {
        return None;
    }
    let client_budget = request.thinking.as_ref().and_then(|t| t.budget_tokens);

    let budget = match config.mode {
        ThinkingBudgetMode::Passthrough => client_budget,
        ThinkingBudgetMode::Custom => Some(config.custom_value),
        ThinkingBudgetMode::Auto => {
            let budget = client_budget.unwrap_or(config.custom_value);
            if upstream_model.to_lowercase().contains("flash") {
                Some(budget.min(24576))
            } else {
                Some(budget)
            }
        }
        ThinkingBudgetMode::Adaptive => None,
    };

    Some(GeminiThinkingConfig { thinking_budget: budget.map(|b| b as i32), include_thoughts: Some(true) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_types::protocol::claude::{ClaudeCacheControl, ClaudeThinkingConfig};

    fn request(messages: Vec<ClaudeMessage>) -> ClaudeMessagesRequest {
        ClaudeMessagesRequest {
            model: "claude-opus-4-6".to_string(),
            messages,
            system: None,
            max_tokens: 1024,
            stream: false,
            temperature: None,
            top_p: None,
            top_k: None,
            stop_sequences: None,
            tools: None,
            thinking: None,
            metadata: None,
        }
    }

    #[test]
    fn clean_cache_control_strips_all_blocks() {
        let mut messages = vec![ClaudeMessage {
            role: ClaudeRole::User,
            content: vec![ClaudeContentBlock::Text {
                text: "hi".to_string(),
                cache_control: Some(ClaudeCacheControl { cache_type: "ephemeral".to_string() }),
            }],
        }];
        clean_cache_control(&mut messages);
        match &messages[0].content[0] {
            ClaudeContentBlock::Text { cache_control, .. } => assert!(cache_control.is_none()),
            _ => unreachable!(),
        }
    }

    #[test]
    fn recovers_unclosed_tool_use_with_synthetic_message() {
        let mut messages = vec![ClaudeMessage {
            role: ClaudeRole::Assistant,
            content: vec![ClaudeContentBlock::ToolUse {
                id: "tool_1".to_string(),
                name: "search".to_string(),
                input: serde_json::json!({}),
                cache_control: None,
            }],
        }];
        recover_unclosed_tool_use(&mut messages);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, ClaudeRole::User);
        matches!(messages[1].content[0], ClaudeContentBlock::ToolResult { .. });
    }

    #[test]
    fn leaves_closed_tool_use_alone() {
        let mut messages = vec![
            ClaudeMessage {
                role: ClaudeRole::Assistant,
                content: vec![ClaudeContentBlock::ToolUse {
                    id: "tool_1".to_string(),
                    name: "search".to_string(),
                    input: serde_json::json!({}),
                    cache_control: None,
                }],
            },
            ClaudeMessage {
                role: ClaudeRole::User,
                content: vec![ClaudeContentBlock::ToolResult {
                    tool_use_id: "tool_1".to_string(),
                    content: "done".to_string(),
                    is_error: None,
                    cache_control: None,
                }],
            },
        ];
        recover_unclosed_tool_use(&mut messages);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn translate_request_converts_simple_text_message() {
        let translator = Translator::new();
        let req = request(vec![ClaudeMessage {
            role: ClaudeRole::User,
            content: vec![ClaudeContentBlock::Text { text: "hello".to_string(), cache_control: None }],
        }]);
        let out = translator
            .translate_request(&req, "gemini-2.5-pro", &ThinkingBudgetConfig::default(), 1_000)
            .unwrap();
        assert_eq!(out.contents.len(), 1);
        assert_eq!(out.contents[0].parts[0].text.as_deref(), Some("hello"));
    }

    #[test]
    fn unknown_signature_is_replaced_with_sentinel_for_gemini_target() {
        let translator = Translator::new();
        let req = request(vec![ClaudeMessage {
            role: ClaudeRole::Assistant,
            content: vec![ClaudeContentBlock::Thinking { thinking: "reasoning".to_string(), signature: Some("claude-sig".to_string()) }],
        }]);
        let out = translator
            .translate_request(&req, "gemini-3-pro", &ThinkingBudgetConfig::default(), 1_000)
            .unwrap();
        assert_eq!(out.contents[0].parts[0].thought_signature.as_deref(), Some(SKIP_THOUGHT_SIGNATURE));
    }

    #[test]
    fn known_gemini_signature_is_preserved_for_gemini_target() {
        let translator = Translator::new();
        translator.signatures.insert("gem-sig", ModelFamily::Gemini, 1_000);
        let req = request(vec![ClaudeMessage {
            role: ClaudeRole::Assistant,
            content: vec![ClaudeContentBlock::Thinking { thinking: "reasoning".to_string(), signature: Some("gem-sig".to_string()) }],
        }]);
        let out = translator
            .translate_request(&req, "gemini-3-pro", &ThinkingBudgetConfig::default(), 1_000)
            .unwrap();
        assert_eq!(out.contents[0].parts[0].thought_signature.as_deref(), Some("gem-sig"));
    }

    #[test]
    fn translate_response_computes_usage_from_prompt_minus_cached() {
        let translator = Translator::new();
        let response = GeminiGenerateContentResponse {
            candidates: vec![antigravity_types::protocol::gemini::GeminiCandidate {
                content: GeminiContent { role: Some(GeminiRole::Model), parts: vec![GeminiPart::text("hi")] },
                finish_reason: Some("STOP".to_string()),
                index: Some(0),
            }],
            usage_metadata: Some(antigravity_types::protocol::gemini::GeminiUsageMetadata {
                prompt_token_count: 100,
                candidates_token_count: 20,
                total_token_count: 120,
                cached_content_token_count: 30,
            }),
            model_version: None,
        };
        let out = translator.translate_response(&response, "gemini-2.5-pro", 1_000).unwrap();
        assert_eq!(out.usage.input_tokens, 70);
        assert_eq!(out.usage.cache_read_input_tokens, 30);
        assert_eq!(out.usage.output_tokens, 20);
    }

    #[test]
    fn passthrough_thinking_config_forwards_client_budget() {
        let translator = Translator::new();
        let mut req = request(vec![ClaudeMessage {
            role: ClaudeRole::User,
            content: vec![ClaudeContentBlock::Text { text: "hi".to_string(), cache_control: None }],
        }]);
        req.thinking = Some(ClaudeThinkingConfig { thinking_type: "enabled".to_string(), budget_tokens: Some(4096) });
        let cfg = ThinkingBudgetConfig { mode: ThinkingBudgetMode::Passthrough, ..Default::default() };
        let out = translator.translate_request(&req, "gemini-thinking-pro", &cfg, 1_000).unwrap();
        assert_eq!(out.generation_config.unwrap().thinking_config.unwrap().thinking_budget, Some(4096));
    }
}
