//! SSE consumption: re-emitting the upstream `streamGenerateContent` body
//! as Anthropic-style events, and aggregating it into one final response
//! for the non-streaming-thinking-model transparent-upgrade path.

use async_stream::stream;
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};

use antigravity_types::protocol::claude::{
    ClaudeContentBlock, ClaudeContentDelta, ClaudeMessagesResponse, ClaudeStreamEvent, ClaudeUsage,
};
use antigravity_types::protocol::gemini::{
    GeminiCandidate, GeminiContent, GeminiGenerateContentResponse, GeminiPart, GeminiRole,
};

use crate::error::{DispatchError, DispatchResult};
use crate::translator::{model_family, Translator};

use super::config::EMPTY_RESPONSE_RETRY_DELAYS_MS;

/// Re-issues the same request against a (possibly different) account; used
/// by `reemit_sse` to transparently retry an empty upstream body without the
/// caller ever seeing the first, empty attempt.
pub type StreamRetry = Box<dyn Fn() -> BoxFuture<'static, DispatchResult<reqwest::Response>> + Send>;

const EMPTY_RESPONSE_TEXT: &str = "[No response after retries - please try again]";

fn has_data_frame(text: &str) -> bool {
    text.split("\n\n").any(|frame| {
        frame
            .lines()
            .any(|line| line.strip_prefix("data:").map(str::trim).is_some_and(|d| !d.is_empty() && d != "[DONE]"))
    })
}

/// Read the whole SSE body and fold every candidate's parts into one
/// response, for callers that asked for a non-streaming reply from a
/// thinking model (upstream only emits thinking text on the streaming
/// path).
pub async fn aggregate_sse(response: reqwest::Response) -> DispatchResult<GeminiGenerateContentResponse> {
    let bytes = response.bytes().await.map_err(DispatchError::Transport)?;
    let text = String::from_utf8_lossy(&bytes);
    let events = parse_sse_frames(&text)?;
    if events.is_empty() {
        return Err(DispatchError::StreamError("no response after retries".to_string()));
    }

    let mut parts: Vec<GeminiPart> = Vec::new();
    let mut finish_reason = None;
    let mut usage = None;
    let mut model_version = None;
    for event in events {
        if let Some(candidate) = event.candidates.into_iter().next() {
            parts.extend(candidate.content.parts);
            if candidate.finish_reason.is_some() {
                finish_reason = candidate.finish_reason;
            }
        }
        if event.usage_metadata.is_some() {
            usage = event.usage_metadata;
        }
        if event.model_version.is_some() {
            model_version = event.model_version;
        }
    }

    Ok(GeminiGenerateContentResponse {
        candidates: vec![GeminiCandidate {
            content: GeminiContent { role: Some(GeminiRole::Model), parts },
            finish_reason,
            index: Some(0),
        }],
        usage_metadata: usage,
        model_version,
    })
}

fn parse_sse_frames(text: &str) -> DispatchResult<Vec<GeminiGenerateContentResponse>> {
    let mut events = Vec::new();
    for frame in text.split("\n\n") {
        for line in frame.lines() {
            let Some(data) = line.strip_prefix("data:").map(str::trim) else { continue };
            if data.is_empty() || data == "[DONE]" {
                continue;
            }
            let parsed = serde_json::from_str(data)
                .map_err(|err| DispatchError::StreamError(format!("malformed SSE payload: {err}")))?;
            events.push(parsed);
        }
    }
    Ok(events)
}

enum OpenBlock {
    Text,
    Thinking,
    ToolUse,
}

/// Incrementally translate the upstream SSE body into Anthropic-format
/// stream events as each frame arrives.
///
/// Upstream occasionally answers a streaming call with a body that carries
/// no `data:` frame at all. Before emitting anything to the caller, the
/// whole body is buffered and checked for this; an empty body is retried
/// (via `retry`) up to `max_empty_response_retries` times, tiered by
/// `EMPTY_RESPONSE_RETRY_DELAYS_MS`, and only once a real frame arrives (or
/// the retry budget is spent) does translation begin. This keeps the retry
/// invisible to the client — no `MessageStart` goes out until there's
/// something to start.
pub fn reemit_sse(
    response: reqwest::Response,
    translator: std::sync::Arc<Translator>,
    model: String,
    max_empty_response_retries: u32,
    retry: StreamRetry,
) -> impl Stream<Item = DispatchResult<ClaudeStreamEvent>> {
    stream! {
        let mut response = response;
        let mut attempt = 0u32;
        let body_text = loop {
            let bytes = match response.bytes().await {
                Ok(bytes) => bytes,
                Err(err) => {
                    yield Err(DispatchError::StreamError(err.to_string()));
                    return;
                }
            };
            let text = String::from_utf8_lossy(&bytes).into_owned();
            if has_data_frame(&text) || attempt >= max_empty_response_retries {
                break text;
            }

            let tier = (attempt as usize).min(EMPTY_RESPONSE_RETRY_DELAYS_MS.len() - 1);
            tokio::time::sleep(std::time::Duration::from_millis(EMPTY_RESPONSE_RETRY_DELAYS_MS[tier] as u64)).await;
            attempt += 1;
            response = match retry().await {
                Ok(next) => next,
                Err(err) => {
                    yield Err(err);
                    return;
                }
            };
        };

        let message_id = format!("msg_{}", uuid::Uuid::new_v4());
        yield Ok(ClaudeStreamEvent::MessageStart {
            message: ClaudeMessagesResponse::new(message_id, model.clone(), Vec::new(), ClaudeUsage::default()),
        });

        if !has_data_frame(&body_text) {
            yield Ok(ClaudeStreamEvent::ContentBlockStart {
                index: 0,
                content_block: ClaudeContentBlock::Text { text: String::new(), cache_control: None },
            });
            yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                index: 0,
                delta: ClaudeContentDelta::TextDelta { text: EMPTY_RESPONSE_TEXT.to_string() },
            });
            yield Ok(ClaudeStreamEvent::ContentBlockStop { index: 0 });
            yield Ok(ClaudeStreamEvent::MessageDelta {
                delta: serde_json::json!({ "stop_reason": "end_turn" }),
                usage: ClaudeUsage::default(),
            });
            yield Ok(ClaudeStreamEvent::MessageStop);
            return;
        }

        let family = model_family(&model);
        let now = chrono::Utc::now().timestamp();
        let mut index: u32 = 0;
        let mut open_block: Option<OpenBlock> = None;
        let mut finished = false;

        'frames: for frame in body_text.split("\n\n") {
            for line in frame.lines() {
                let Some(data) = line.strip_prefix("data:").map(str::trim) else { continue };
                if data.is_empty() || data == "[DONE]" {
                    continue;
                }

                let parsed: GeminiGenerateContentResponse = match serde_json::from_str(data) {
                    Ok(parsed) => parsed,
                    Err(err) => {
                        yield Err(DispatchError::StreamError(format!("malformed SSE payload: {err}")));
                        return;
                    }
                };

                let Some(candidate) = parsed.candidates.into_iter().next() else { continue };

                for part in candidate.content.parts {
                    if let Some(signature) = &part.thought_signature {
                        translator.signature_cache().insert(signature, family, now);
                    }

                    let is_thinking = part.thought == Some(true);
                    let is_tool = part.function_call.is_some();

                    let continues_current = matches!(
                        (&open_block, is_thinking, is_tool),
                        (Some(OpenBlock::Text), false, false)
                            | (Some(OpenBlock::Thinking), true, _)
                    );

                    if continues_current {
                        if is_thinking {
                            yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                                index,
                                delta: ClaudeContentDelta::ThinkingDelta { thinking: part.text.clone().unwrap_or_default() },
                            });
                            if let Some(signature) = part.thought_signature.clone() {
                                yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                                    index,
                                    delta: ClaudeContentDelta::SignatureDelta { signature },
                                });
                            }
                        } else {
                            yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                                index,
                                delta: ClaudeContentDelta::TextDelta { text: part.text.clone().unwrap_or_default() },
                            });
                        }
                        continue;
                    }

                    if open_block.is_some() {
                        yield Ok(ClaudeStreamEvent::ContentBlockStop { index });
                        index += 1;
                    }

                    if is_thinking {
                        yield Ok(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ClaudeContentBlock::Thinking { thinking: String::new(), signature: None },
                        });
                        yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                            index,
                            delta: ClaudeContentDelta::ThinkingDelta { thinking: part.text.clone().unwrap_or_default() },
                        });
                        if let Some(signature) = part.thought_signature.clone() {
                            yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                                index,
                                delta: ClaudeContentDelta::SignatureDelta { signature },
                            });
                        }
                        open_block = Some(OpenBlock::Thinking);
                    } else if let Some(call) = &part.function_call {
                        yield Ok(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ClaudeContentBlock::ToolUse {
                                id: format!("toolu_{}", uuid::Uuid::new_v4()),
                                name: call.name.clone(),
                                input: serde_json::json!({}),
                                cache_control: None,
                            },
                        });
                        yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                            index,
                            delta: ClaudeContentDelta::InputJsonDelta { partial_json: call.args.to_string() },
                        });
                        open_block = Some(OpenBlock::ToolUse);
                    } else {
                        yield Ok(ClaudeStreamEvent::ContentBlockStart {
                            index,
                            content_block: ClaudeContentBlock::Text { text: String::new(), cache_control: None },
                        });
                        yield Ok(ClaudeStreamEvent::ContentBlockDelta {
                            index,
                            delta: ClaudeContentDelta::TextDelta { text: part.text.clone().unwrap_or_default() },
                        });
                        open_block = Some(OpenBlock::Text);
                    }
                }

                if candidate.finish_reason.is_some() {
                    if open_block.is_some() {
                        yield Ok(ClaudeStreamEvent::ContentBlockStop { index });
                        open_block = None;
                    }
                    let usage = parsed
                        .usage_metadata
                        .map(|metadata| ClaudeUsage {
                            input_tokens: metadata.prompt_token_count.saturating_sub(metadata.cached_content_token_count),
                            output_tokens: metadata.candidates_token_count,
                            cache_creation_input_tokens: 0,
                            cache_read_input_tokens: metadata.cached_content_token_count,
                        })
                        .unwrap_or_default();
                    yield Ok(ClaudeStreamEvent::MessageDelta {
                        delta: serde_json::json!({ "stop_reason": "end_turn" }),
                        usage,
                    });
                    yield Ok(ClaudeStreamEvent::MessageStop);
                    finished = true;
                    break 'frames;
                }
            }
        }

        if finished {
            return;
        }

        if open_block.is_some() {
            yield Ok(ClaudeStreamEvent::ContentBlockStop { index });
        }
        yield Ok(ClaudeStreamEvent::MessageStop);
    }
}
