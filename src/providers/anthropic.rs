// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Anthropic dialect (C3): typed content-block messages, a separate
//! `system` block, tool-result blocks merged into the adjacent user
//! message, prompt-cache markers, and the named SSE event state machine.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde_json::{json, Value};

use crate::providers::{
    AvailableTool, Backend, BackendError, CompletionRequest, CompletionResponse, ModelConfig,
    ThinkingConfig, ThinkingLevel,
};
use crate::types::{Content, ContentBlock, FunctionCall, LlmChunk, LlmUsage, Message, Role, ToolCall, ToolChoice};

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicBackend {
    model: ModelConfig,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl AnthropicBackend {
    pub fn new(model: ModelConfig, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
    }

    fn request_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl Backend for AnthropicBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let body = build_request_body(&self.model, &request, false);
        let response = self
            .auth_headers(self.http.post(self.request_url("/v1/messages")))
            .json(&body)
            .send()
            .await?;
        let response = raise_for_status(response, &self.model).await?;
        let payload: Value = response.json().await?;
        parse_non_streaming_response(&payload, &self.model)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<LlmChunk, BackendError>>, BackendError> {
        let body = build_request_body(&self.model, &request, true);
        let builder = self.auth_headers(self.http.post(self.request_url("/v1/messages"))).json(&body);
        let mut source = EventSource::new(builder).map_err(|err| BackendError::Request {
            provider: self.model.provider.to_string(),
            model: self.model.name.clone(),
            message: err.to_string(),
        })?;

        Ok(Box::pin(stream! {
            let mut state = StreamState::default();
            while let Some(event) = source.next().await {
                match event {
                    Ok(SseEvent::Open) => continue,
                    Ok(SseEvent::Message(message)) => {
                        match apply_sse_event(&mut state, &message.event, &message.data) {
                            Ok(Some(chunk)) => yield Ok(chunk),
                            Ok(None) => {}
                            Err(err) => {
                                yield Err(err);
                                return;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(err) => {
                        yield Err(BackendError::Request {
                            provider: "Anthropic".to_string(),
                            model: String::new(),
                            message: err.to_string(),
                        });
                        return;
                    }
                }
            }
        }))
    }

    async fn count_tokens(&self, messages: &[Message]) -> Result<u64, BackendError> {
        let (system, wire_messages) = to_wire_messages(messages, false);
        let mut body = json!({
            "model": self.model.name,
            "messages": wire_messages,
        });
        if let Some(system) = system {
            body["system"] = system;
        }
        let response = self
            .auth_headers(self.http.post(self.request_url("/v1/messages/count_tokens")))
            .json(&body)
            .send()
            .await?;
        let response = raise_for_status(response, &self.model).await?;
        let payload: Value = response.json().await?;
        payload
            .get("input_tokens")
            .and_then(Value::as_u64)
            .ok_or_else(|| BackendError::MissingUsage {
                provider: self.model.provider.to_string(),
                model: self.model.name.clone(),
                detail: "count_tokens response missing input_tokens".to_string(),
            })
    }

    fn model(&self) -> &ModelConfig {
        &self.model
    }
}

pub(crate) async fn raise_for_status(
    response: reqwest::Response,
    model: &ModelConfig,
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(BackendError::RateLimit);
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(BackendError::Request {
            provider: model.provider.to_string(),
            model: model.name.clone(),
            message: format!("HTTP {status}: {message}"),
        });
    }
    Ok(response)
}

/// Map a [`ThinkingConfig`] to the body field Anthropic expects: adaptive
/// models report effort, fixed models report a token budget.
fn thinking_field(model: &ModelConfig, thinking: &Option<ThinkingConfig>) -> Option<Value> {
    let thinking = thinking.as_ref()?;
    if thinking.level == ThinkingLevel::Off {
        return None;
    }
    if model.adaptive {
        let effort = match thinking.level {
            ThinkingLevel::Low => "low",
            ThinkingLevel::Medium => "medium",
            ThinkingLevel::High => "high",
            ThinkingLevel::Off => unreachable!(),
        };
        Some(json!({"type": "adaptive", "effort": effort}))
    } else {
        let budget_tokens = match thinking.level {
            ThinkingLevel::Low => 4_096,
            ThinkingLevel::Medium => 16_384,
            ThinkingLevel::High => 32_768,
            ThinkingLevel::Off => unreachable!(),
        };
        Some(json!({"type": "enabled", "budget_tokens": budget_tokens}))
    }
}

fn tool_choice_field(choice: ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!({"type": "auto"}),
        ToolChoice::Any => json!({"type": "any"}),
        ToolChoice::None => json!({"type": "none"}),
    }
}

fn available_tool_field(tool: &AvailableTool) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

pub(crate) fn build_request_body(model: &ModelConfig, request: &CompletionRequest, stream: bool) -> Value {
    let (system, messages) = to_wire_messages(&request.messages, true);
    let mut body = json!({
        "model": model.name,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(4_096),
        "temperature": request.temperature,
        "stream": stream,
    });
    if let Some(system) = system {
        body["system"] = system;
    }
    if let Some((tools, choice)) = &request.tools {
        body["tools"] = Value::Array(tools.iter().map(available_tool_field).collect());
        body["tool_choice"] = tool_choice_field(*choice);
    }
    if let Some(thinking) = thinking_field(model, &request.thinking) {
        body["thinking"] = thinking;
    }
    body
}

/// Map our message list to Anthropic's `(system, messages)` shape. Tool
/// result blocks live on the `tool` role in our model but must be merged
/// into the adjacent `user` message on the wire; cache-control markers are
/// attached to the system block and the last user content block when
/// `with_cache_control` is set (skipped for `count_tokens` calls, which
/// don't bill for cache writes).
pub(crate) fn to_wire_messages(
    messages: &[Message],
    with_cache_control: bool,
) -> (Option<Value>, Vec<Value>) {
    let mut system = None;
    let mut wire_messages: Vec<Value> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                let text = message.text().unwrap_or_default().to_string();
                let mut block = json!({"type": "text", "text": text});
                if with_cache_control {
                    block["cache_control"] = json!({"type": "ephemeral"});
                }
                system = Some(Value::Array(vec![block]));
            }
            Role::Tool => {
                let block = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id,
                    "content": message.text().unwrap_or_default(),
                });
                match wire_messages.last_mut() {
                    Some(last) if last["role"] == "user" => {
                        last["content"].as_array_mut().unwrap().push(block);
                    }
                    _ => {
                        wire_messages.push(json!({"role": "user", "content": [block]}));
                    }
                }
            }
            Role::User | Role::Assistant => {
                let role = if message.role == Role::User { "user" } else { "assistant" };
                let mut blocks = message_content_blocks(message);
                if message.role == Role::Assistant {
                    if let Some(reasoning) = &message.reasoning_content {
                        blocks.insert(
                            0,
                            json!({
                                "type": "thinking",
                                "thinking": reasoning,
                                "signature": message.reasoning_signature,
                            }),
                        );
                    }
                }
                wire_messages.push(json!({"role": role, "content": blocks}));
            }
        }
    }

    if with_cache_control {
        if let Some(last_user) = wire_messages.iter_mut().rev().find(|m| m["role"] == "user") {
            if let Some(blocks) = last_user["content"].as_array_mut() {
                if let Some(last_block) = blocks.last_mut() {
                    last_block["cache_control"] = json!({"type": "ephemeral"});
                }
            }
        }
    }

    (system, wire_messages)
}

fn message_content_blocks(message: &Message) -> Vec<Value> {
    let mut blocks = Vec::new();
    match &message.content {
        Some(Content::Text(text)) if !text.is_empty() => {
            blocks.push(json!({"type": "text", "text": text}));
        }
        Some(Content::Blocks(content_blocks)) => {
            for block in content_blocks {
                blocks.push(match block {
                    ContentBlock::Text { text } => json!({"type": "text", "text": text}),
                    ContentBlock::Image { source_type, data } => json!({
                        "type": "image",
                        "source": {"type": source_type, "data": data},
                    }),
                    ContentBlock::ToolUse { id, name, input } => {
                        json!({"type": "tool_use", "id": id, "name": name, "input": input})
                    }
                    ContentBlock::ToolResult { tool_call_id, content, is_error } => json!({
                        "type": "tool_result",
                        "tool_use_id": tool_call_id,
                        "content": content,
                        "is_error": is_error,
                    }),
                });
            }
        }
        _ => {}
    }
    for (index, call) in message.tool_calls.iter().flatten().enumerate() {
        blocks.push(json!({
            "type": "tool_use",
            "id": call.id,
            "name": call.function.name,
            "input": serde_json::from_str::<Value>(&call.function.arguments).unwrap_or(json!({})),
            "index": index,
        }));
    }
    blocks
}

pub(crate) fn parse_non_streaming_response(
    payload: &Value,
    model: &ModelConfig,
) -> Result<CompletionResponse, BackendError> {
    let mut message = Message::empty_delta(Role::Assistant);
    let mut tool_index = 0usize;
    for (i, block) in payload["content"].as_array().cloned().unwrap_or_default().iter().enumerate() {
        match block["type"].as_str() {
            Some("text") => {
                let text = block["text"].as_str().unwrap_or_default();
                message.content = Some(Content::Text(
                    message.text().unwrap_or_default().to_string() + text,
                ));
            }
            Some("thinking") => {
                message.reasoning_content = Some(block["thinking"].as_str().unwrap_or_default().to_string());
                message.reasoning_signature =
                    block["signature"].as_str().map(str::to_string);
            }
            Some("tool_use") => {
                let call = ToolCall {
                    id: block["id"].as_str().unwrap_or_default().to_string(),
                    index: tool_index,
                    function: FunctionCall {
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: block["input"].to_string(),
                    },
                };
                tool_index += 1;
                message.tool_calls.get_or_insert_with(Vec::new).push(call);
            }
            _ => {
                let _ = i;
            }
        }
    }

    let usage_json = &payload["usage"];
    let usage = LlmUsage {
        prompt_tokens: usage_json["input_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage_json["output_tokens"].as_u64().unwrap_or(0),
        cache_creation_input_tokens: usage_json["cache_creation_input_tokens"].as_u64().unwrap_or(0),
        cache_read_input_tokens: usage_json["cache_read_input_tokens"].as_u64().unwrap_or(0),
    };
    if payload.get("usage").is_none() {
        return Err(BackendError::MissingUsage {
            provider: model.provider.to_string(),
            model: model.name.clone(),
            detail: "response had no usage field".to_string(),
        });
    }

    Ok(CompletionResponse { message, usage })
}

#[derive(Default)]
pub(crate) struct StreamState {
    content_block_types: std::collections::HashMap<usize, String>,
    usage: Option<LlmUsage>,
}

/// Update `state` from one named SSE event and return the [`LlmChunk`] delta
/// it represents, if any. Each event type touches exactly the fields the
/// spec assigns it (§4.2): `message_start` seeds prompt usage,
/// `content_block_start` records a block's type (and, for `tool_use`,
/// announces the call), `content_block_delta` carries the actual text/
/// argument fragments, `message_delta` carries completion usage, `ping`/
/// `content_block_stop`/`message_stop` carry nothing new.
pub(crate) fn apply_sse_event(
    state: &mut StreamState,
    event: &str,
    data: &str,
) -> Result<Option<LlmChunk>, BackendError> {
    if data == "[DONE]" {
        return Ok(None);
    }
    let payload: Value = match serde_json::from_str(data) {
        Ok(value) => value,
        Err(_) if event == "ping" => return Ok(None),
        Err(err) => return Err(BackendError::Decode(err)),
    };

    match event {
        "message_start" => {
            let usage_json = &payload["message"]["usage"];
            state.usage = Some(LlmUsage {
                prompt_tokens: usage_json["input_tokens"].as_u64().unwrap_or(0),
                completion_tokens: 0,
                cache_creation_input_tokens: usage_json["cache_creation_input_tokens"]
                    .as_u64()
                    .unwrap_or(0),
                cache_read_input_tokens: usage_json["cache_read_input_tokens"].as_u64().unwrap_or(0),
            });
            Ok(None)
        }
        "content_block_start" => {
            let index = payload["index"].as_u64().unwrap_or(0) as usize;
            let block_type = payload["content_block"]["type"].as_str().unwrap_or_default().to_string();
            let chunk = if block_type == "tool_use" {
                let mut message = Message::empty_delta(Role::Assistant);
                message.tool_calls = Some(vec![ToolCall {
                    id: payload["content_block"]["id"].as_str().unwrap_or_default().to_string(),
                    index,
                    function: FunctionCall {
                        name: payload["content_block"]["name"].as_str().unwrap_or_default().to_string(),
                        arguments: String::new(),
                    },
                }]);
                Some(LlmChunk { message, usage: None })
            } else {
                None
            };
            state.content_block_types.insert(index, block_type);
            Ok(chunk)
        }
        "content_block_delta" => {
            let index = payload["index"].as_u64().unwrap_or(0) as usize;
            let block_type = state.content_block_types.get(&index).cloned().unwrap_or_default();
            let delta = &payload["delta"];
            let mut message = Message::empty_delta(Role::Assistant);
            match delta["type"].as_str() {
                Some("text_delta") => {
                    message.content = Some(Content::Text(delta["text"].as_str().unwrap_or_default().to_string()));
                }
                Some("thinking_delta") => {
                    message.reasoning_content = Some(delta["thinking"].as_str().unwrap_or_default().to_string());
                }
                Some("signature_delta") => {
                    message.reasoning_signature = Some(delta["signature"].as_str().unwrap_or_default().to_string());
                }
                Some("input_json_delta") if block_type == "tool_use" => {
                    message.tool_calls = Some(vec![ToolCall {
                        id: String::new(),
                        index,
                        function: FunctionCall {
                            name: String::new(),
                            arguments: delta["partial_json"].as_str().unwrap_or_default().to_string(),
                        },
                    }]);
                }
                _ => {}
            }
            Ok(Some(LlmChunk { message, usage: None }))
        }
        "message_delta" => {
            let output_tokens = payload["usage"]["output_tokens"].as_u64().unwrap_or(0);
            let usage = LlmUsage { prompt_tokens: 0, completion_tokens: output_tokens, ..Default::default() };
            Ok(Some(LlmChunk { message: Message::empty_delta(Role::Assistant), usage: Some(usage) }))
        }
        "content_block_stop" | "message_stop" | "ping" => Ok(None),
        "error" => Err(BackendError::Request {
            provider: "Anthropic".to_string(),
            model: String::new(),
            message: payload["error"]["message"].as_str().unwrap_or("unknown stream error").to_string(),
        }),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    fn model() -> ModelConfig {
        ModelConfig {
            name: "claude-sonnet-4-5".into(),
            provider: ProviderKind::Anthropic,
            default_temperature: 1.0,
            max_context_tokens: 200_000,
            adaptive: false,
            input_cost_per_million: 3.0,
            output_cost_per_million: 15.0,
            cache_write_cost_per_million: 3.75,
            cache_read_cost_per_million: 0.3,
        }
    }

    #[test]
    fn tool_result_merges_into_adjacent_user_message() {
        let mut tool_message = Message::new(Role::Tool, "42");
        tool_message.tool_call_id = Some("call_1".to_string());
        let messages = vec![Message::new(Role::User, "what is 6*7?"), tool_message];
        let (_, wire) = to_wire_messages(&messages, false);
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[1]["content"][0]["type"], "tool_result");
    }

    #[test]
    fn fixed_model_uses_budget_tokens_adaptive_uses_effort() {
        let fixed = model();
        let mut adaptive = model();
        adaptive.adaptive = true;
        let thinking = Some(ThinkingConfig { level: ThinkingLevel::High });

        let fixed_field = thinking_field(&fixed, &thinking).unwrap();
        assert_eq!(fixed_field["type"], "enabled");
        assert!(fixed_field["budget_tokens"].is_number());

        let adaptive_field = thinking_field(&adaptive, &thinking).unwrap();
        assert_eq!(adaptive_field["type"], "adaptive");
        assert_eq!(adaptive_field["effort"], "high");
    }

    #[test]
    fn content_block_delta_before_tool_use_start_is_text() {
        let mut state = StreamState::default();
        let start = r#"{"index":0,"content_block":{"type":"text"}}"#;
        apply_sse_event(&mut state, "content_block_start", start).unwrap();
        let delta = r#"{"index":0,"delta":{"type":"text_delta","text":"hi"}}"#;
        let chunk = apply_sse_event(&mut state, "content_block_delta", delta).unwrap().unwrap();
        assert_eq!(chunk.message.text(), Some("hi"));
    }
}
