// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Black-box tests against the Anthropic dialect's HTTP surface (C3),
//! exercising `Backend::complete` and `Backend::count_tokens` over a mock
//! server instead of the real API.

use codi::providers::{create_backend, CompletionRequest, ModelConfig, ProviderKind};
use codi::types::{Message, Role};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn model() -> ModelConfig {
    ModelConfig {
        name: "claude-sonnet-4-5".to_string(),
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

fn request() -> CompletionRequest {
    CompletionRequest {
        messages: vec![Message::new(Role::User, "hello")],
        tools: None,
        temperature: 1.0,
        max_tokens: Some(1024),
        thinking: None,
    }
}

#[tokio::test]
async fn complete_parses_text_and_usage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": [{"type": "text", "text": "hi there"}],
            "usage": {"input_tokens": 12, "output_tokens": 4},
        })))
        .mount(&server)
        .await;

    let backend = create_backend(model(), "sk-test".to_string(), Some(server.uri())).unwrap();
    let response = backend.complete(request()).await.unwrap();

    assert_eq!(response.message.text(), Some("hi there"));
    assert_eq!(response.usage.prompt_tokens, 12);
    assert_eq!(response.usage.completion_tokens, 4);
}

#[tokio::test]
async fn complete_surfaces_rate_limit_as_backend_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let backend = create_backend(model(), "sk-test".to_string(), Some(server.uri())).unwrap();
    let err = backend.complete(request()).await.unwrap_err();

    assert!(matches!(err, codi::providers::BackendError::RateLimit));
}

#[tokio::test]
async fn count_tokens_reads_input_tokens_field() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages/count_tokens"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"input_tokens": 42})))
        .mount(&server)
        .await;

    let backend = create_backend(model(), "sk-test".to_string(), Some(server.uri())).unwrap();
    let count = backend.count_tokens(&[Message::new(Role::User, "hi")]).await.unwrap();

    assert_eq!(count, 42);
}
