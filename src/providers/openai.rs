// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The OpenAI-compatible chat-completions dialect (C3): flat
//! `role`/`content`/`tool_calls`/`tool_call_id` messages and per-index
//! streaming deltas, rather than Anthropic's typed content blocks.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde_json::{json, Value};

use crate::providers::{
    AvailableTool, Backend, BackendError, CompletionRequest, CompletionResponse, ModelConfig,
    ThinkingConfig, ThinkingLevel,
};
use crate::types::{FunctionCall, LlmChunk, LlmUsage, Message, Role, ToolCall, ToolChoice};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

pub struct OpenAiBackend {
    model: ModelConfig,
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl OpenAiBackend {
    pub fn new(model: ModelConfig, api_key: String, base_url: Option<String>) -> Self {
        Self {
            model,
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.bearer_auth(&self.api_key).header("content-type", "application/json")
    }

    fn request_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

fn role_field(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn to_wire_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|message| {
            let mut wire = json!({
                "role": role_field(message.role),
                "content": message.text().unwrap_or_default(),
            });
            if let Some(tool_call_id) = &message.tool_call_id {
                wire["tool_call_id"] = json!(tool_call_id);
            }
            if let Some(name) = &message.name {
                wire["name"] = json!(name);
            }
            if let Some(calls) = &message.tool_calls {
                wire["tool_calls"] = Value::Array(
                    calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {"name": call.function.name, "arguments": call.function.arguments},
                            })
                        })
                        .collect(),
                );
            }
            wire
        })
        .collect()
}

fn available_tool_field(tool: &AvailableTool) -> Value {
    json!({
        "type": "function",
        "function": {"name": tool.name, "description": tool.description, "parameters": tool.parameters},
    })
}

fn tool_choice_field(choice: ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::Any => json!("required"),
        ToolChoice::None => json!("none"),
    }
}

/// OpenAI models expose reasoning effort directly; there is no separate
/// fixed-token-budget mode, so `adaptive` is irrelevant here and every model
/// gets the effort string.
fn reasoning_effort_field(thinking: &Option<ThinkingConfig>) -> Option<Value> {
    let thinking = thinking.as_ref()?;
    let effort = match thinking.level {
        ThinkingLevel::Off => return None,
        ThinkingLevel::Low => "low",
        ThinkingLevel::Medium => "medium",
        ThinkingLevel::High => "high",
    };
    Some(json!(effort))
}

fn build_request_body(model: &ModelConfig, request: &CompletionRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": model.name,
        "messages": to_wire_messages(&request.messages),
        "temperature": request.temperature,
        "stream": stream,
    });
    if let Some(max_tokens) = request.max_tokens {
        body["max_completion_tokens"] = json!(max_tokens);
    }
    if let Some((tools, choice)) = &request.tools {
        body["tools"] = Value::Array(tools.iter().map(available_tool_field).collect());
        body["tool_choice"] = tool_choice_field(*choice);
    }
    if let Some(effort) = reasoning_effort_field(&request.thinking) {
        body["reasoning_effort"] = effort;
    }
    if stream {
        body["stream_options"] = json!({"include_usage": true});
    }
    body
}

fn parse_usage(usage_json: &Value) -> LlmUsage {
    LlmUsage {
        prompt_tokens: usage_json["prompt_tokens"].as_u64().unwrap_or(0),
        completion_tokens: usage_json["completion_tokens"].as_u64().unwrap_or(0),
        cache_creation_input_tokens: 0,
        cache_read_input_tokens: usage_json["prompt_tokens_details"]["cached_tokens"].as_u64().unwrap_or(0),
    }
}

fn parse_non_streaming_response(payload: &Value, model: &ModelConfig) -> Result<CompletionResponse, BackendError> {
    let choice = &payload["choices"][0]["message"];
    let mut message = Message::new(Role::Assistant, choice["content"].as_str().unwrap_or_default());
    if let Some(calls) = choice["tool_calls"].as_array() {
        message.tool_calls = Some(
            calls
                .iter()
                .enumerate()
                .map(|(index, call)| ToolCall {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    index,
                    function: FunctionCall {
                        name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                        arguments: call["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                    },
                })
                .collect(),
        );
    }
    if payload.get("usage").is_none() {
        return Err(BackendError::MissingUsage {
            provider: model.provider.to_string(),
            model: model.name.clone(),
            detail: "response had no usage field".to_string(),
        });
    }
    Ok(CompletionResponse { message, usage: parse_usage(&payload["usage"]) })
}

async fn raise_for_status(response: reqwest::Response, model: &ModelConfig) -> Result<reqwest::Response, BackendError> {
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

/// Fold one `chat.completion.chunk` payload into an [`LlmChunk`] delta. Each
/// choice delta carries at most a content fragment, a reasoning fragment, or
/// one streamed tool-call-argument fragment tagged by its array index; the
/// final chunk (an empty `choices` array) carries only usage.
fn parse_stream_chunk(payload: &Value) -> Option<LlmChunk> {
    let usage = payload.get("usage").filter(|u| !u.is_null()).map(parse_usage);
    let choices = payload["choices"].as_array();
    let Some(delta) = choices.and_then(|c| c.first()).map(|c| &c["delta"]) else {
        return usage.map(|usage| LlmChunk { message: Message::empty_delta(Role::Assistant), usage: Some(usage) });
    };

    let mut message = Message::empty_delta(Role::Assistant);
    if let Some(text) = delta["content"].as_str() {
        message.content = Some(crate::types::Content::Text(text.to_string()));
    }
    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        message.reasoning_content = Some(reasoning.to_string());
    }
    if let Some(calls) = delta["tool_calls"].as_array() {
        message.tool_calls = Some(
            calls
                .iter()
                .map(|call| ToolCall {
                    id: call["id"].as_str().unwrap_or_default().to_string(),
                    index: call["index"].as_u64().unwrap_or(0) as usize,
                    function: FunctionCall {
                        name: call["function"]["name"].as_str().unwrap_or_default().to_string(),
                        arguments: call["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                    },
                })
                .collect(),
        );
    }
    Some(LlmChunk { message, usage })
}

#[async_trait::async_trait]
impl Backend for OpenAiBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let body = build_request_body(&self.model, &request, false);
        let response = self.auth_headers(self.http.post(self.request_url("/v1/chat/completions"))).json(&body).send().await?;
        let response = raise_for_status(response, &self.model).await?;
        let payload: Value = response.json().await?;
        parse_non_streaming_response(&payload, &self.model)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<LlmChunk, BackendError>>, BackendError> {
        let body = build_request_body(&self.model, &request, true);
        let builder = self.auth_headers(self.http.post(self.request_url("/v1/chat/completions"))).json(&body);
        let mut source = EventSource::new(builder).map_err(|err| BackendError::Request {
            provider: "OpenAI".to_string(),
            model: self.model.name.clone(),
            message: err.to_string(),
        })?;

        Ok(Box::pin(stream! {
            while let Some(event) = source.next().await {
                match event {
                    Ok(SseEvent::Open) => continue,
                    Ok(SseEvent::Message(message)) => {
                        if message.data == "[DONE]" {
                            break;
                        }
                        match serde_json::from_str::<Value>(&message.data) {
                            Ok(payload) => {
                                if let Some(chunk) = parse_stream_chunk(&payload) {
                                    yield Ok(chunk);
                                }
                            }
                            Err(err) => {
                                yield Err(BackendError::Decode(err));
                                return;
                            }
                        }
                    }
                    Err(reqwest_eventsource::Error::StreamEnded) => break,
                    Err(err) => {
                        yield Err(BackendError::Request {
                            provider: "OpenAI".to_string(),
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
        // OpenAI's chat-completions API exposes no dedicated token-counting
        // endpoint; approximate with a fixed divisor over rendered text,
        // same as the ambient estimate other callers fall back to.
        let chars: usize = messages.iter().filter_map(Message::text).map(str::len).sum();
        Ok((chars / 4) as u64)
    }

    fn model(&self) -> &ModelConfig {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;

    #[test]
    fn final_usage_only_chunk_has_no_tool_calls() {
        let payload = json!({"choices": [], "usage": {"prompt_tokens": 10, "completion_tokens": 2}});
        let chunk = parse_stream_chunk(&payload).unwrap();
        assert!(chunk.message.tool_calls.is_none());
        assert_eq!(chunk.usage.unwrap().prompt_tokens, 10);
    }

    #[test]
    fn tool_call_delta_carries_index() {
        let payload = json!({
            "choices": [{"delta": {"tool_calls": [{"index": 2, "id": "call_1", "function": {"name": "grep", "arguments": "{}"}}]}}],
        });
        let chunk = parse_stream_chunk(&payload).unwrap();
        let calls = chunk.message.tool_calls.unwrap();
        assert_eq!(calls[0].index, 2);
    }

    #[test]
    fn count_tokens_approximates_from_text_length() {
        let backend = OpenAiBackend::new(
            ModelConfig {
                name: "gpt-5".into(),
                provider: ProviderKind::OpenAi,
                default_temperature: 1.0,
                max_context_tokens: 128_000,
                adaptive: true,
                input_cost_per_million: 2.5,
                output_cost_per_million: 10.0,
                cache_write_cost_per_million: 0.0,
                cache_read_cost_per_million: 1.25,
            },
            "sk-test".to_string(),
            None,
        );
        let messages = vec![Message::new(Role::User, "12345678")];
        let count = futures::executor::block_on(backend.count_tokens(&messages)).unwrap();
        assert_eq!(count, 2);
    }
}
