// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The Vertex AI dialect (C3): Claude's wire protocol reached through
//! Google's hosting, differing from [`crate::providers::anthropic`] only in
//! URL shape and bearer-token auth -- no beta flags, no `x-api-key` header.
//! Message building, response parsing and SSE event handling are reused
//! verbatim from the Anthropic dialect.

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest_eventsource::{Event as SseEvent, EventSource};
use serde_json::{json, Value};

use crate::providers::anthropic::{apply_sse_event, parse_non_streaming_response, raise_for_status, to_wire_messages, StreamState};
use crate::providers::{
    AvailableTool, Backend, BackendError, CompletionRequest, CompletionResponse, ModelConfig,
};
use crate::types::{LlmChunk, Message, ToolChoice};

const DEFAULT_BASE_URL: &str = "https://us-east5-aiplatform.googleapis.com";

pub struct VertexBackend {
    model: ModelConfig,
    /// An OAuth2 bearer token for the Vertex endpoint, not an Anthropic API
    /// key -- `create_backend` passes whatever ambient credential the host
    /// resolved, unchanged.
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl VertexBackend {
    pub fn new(model: ModelConfig, access_token: String, base_url: Option<String>) -> Self {
        Self {
            model,
            access_token,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            http: reqwest::Client::new(),
        }
    }

    fn request_url(&self, stream: bool) -> String {
        let action = if stream { "streamRawPredict" } else { "rawPredict" };
        format!(
            "{}/v1/publishers/anthropic/models/{}:{}",
            self.base_url.trim_end_matches('/'),
            self.model.name,
            action
        )
    }

    fn auth_headers(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .bearer_auth(&self.access_token)
            .header("content-type", "application/json")
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
    json!({"name": tool.name, "description": tool.description, "input_schema": tool.parameters})
}

/// Vertex's `rawPredict` body drops the `model` field (it's in the URL path)
/// and the `thinking`/beta machinery the public API exposes; everything else
/// matches the Anthropic message shape.
fn build_request_body(request: &CompletionRequest, stream: bool) -> Value {
    let (system, messages) = to_wire_messages(&request.messages, true);
    let mut body = json!({
        "anthropic_version": "vertex-2023-10-16",
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
    body
}

#[async_trait::async_trait]
impl Backend for VertexBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let body = build_request_body(&request, false);
        let response = self.auth_headers(self.http.post(self.request_url(false))).json(&body).send().await?;
        let response = raise_for_status(response, &self.model).await?;
        let payload: Value = response.json().await?;
        parse_non_streaming_response(&payload, &self.model)
    }

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<LlmChunk, BackendError>>, BackendError> {
        let body = build_request_body(&request, true);
        let builder = self.auth_headers(self.http.post(self.request_url(true))).json(&body);
        let mut source = EventSource::new(builder).map_err(|err| BackendError::Request {
            provider: "Vertex".to_string(),
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
                            provider: "Vertex".to_string(),
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
        let mut body = json!({"anthropic_version": "vertex-2023-10-16", "messages": wire_messages});
        if let Some(system) = system {
            body["system"] = system;
        }
        let url = format!(
            "{}/v1/publishers/anthropic/models/{}:countTokens",
            self.base_url.trim_end_matches('/'),
            self.model.name
        );
        let response = self.auth_headers(self.http.post(url)).json(&body).send().await?;
        let response = raise_for_status(response, &self.model).await?;
        let payload: Value = response.json().await?;
        payload.get("input_tokens").and_then(Value::as_u64).ok_or_else(|| BackendError::MissingUsage {
            provider: "Vertex".to_string(),
            model: self.model.name.clone(),
            detail: "count_tokens response missing input_tokens".to_string(),
        })
    }

    fn model(&self) -> &ModelConfig {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderKind;
    use crate::types::Role;

    #[test]
    fn request_url_switches_action_for_streaming() {
        let backend = VertexBackend::new(
            ModelConfig {
                name: "claude-sonnet-4-5".into(),
                provider: ProviderKind::Vertex,
                default_temperature: 1.0,
                max_context_tokens: 200_000,
                adaptive: false,
                input_cost_per_million: 3.0,
                output_cost_per_million: 15.0,
                cache_write_cost_per_million: 3.75,
                cache_read_cost_per_million: 0.3,
            },
            "token".to_string(),
            None,
        );
        assert!(backend.request_url(false).ends_with(":rawPredict"));
        assert!(backend.request_url(true).ends_with(":streamRawPredict"));
    }

    #[test]
    fn build_request_body_omits_model_field() {
        let request = CompletionRequest {
            messages: vec![Message::new(Role::User, "hi")],
            tools: None,
            temperature: 1.0,
            max_tokens: Some(1024),
            thinking: None,
        };
        let body = build_request_body(&request, false);
        assert!(body.get("model").is_none());
        assert_eq!(body["anthropic_version"], "vertex-2023-10-16");
    }
}
