// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backend adapters (C3): the [`Backend`] trait plus its concrete dialects.
//!
//! - [`anthropic::AnthropicBackend`] -- Claude models via the Anthropic API.
//! - [`vertex::VertexBackend`] -- the same wire protocol reached through
//!   Google Vertex AI, differing only in URL/auth.
//! - [`openai::OpenAiBackend`] -- OpenAI-compatible chat-completions dialect.
//!
//! Each backend turns [`CompletionRequest`]s into provider-specific HTTP
//! requests and parses both the non-streaming and SSE-streaming response
//! shapes back into the shared [`crate::types::Message`]/[`crate::types::
//! LlmChunk`] model.

pub mod anthropic;
pub mod openai;
pub mod vertex;

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{LlmChunk, LlmUsage, Message, ToolChoice};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("rate limited, please retry shortly")]
    RateLimit,
    #[error("{provider} ({model}) request failed: {message}")]
    Request { provider: String, model: String, message: String },
    #[error("{provider} ({model}) response was missing usage information: {detail}")]
    MissingUsage { provider: String, model: String, detail: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThinkingLevel {
    Off,
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone)]
pub struct ThinkingConfig {
    pub level: ThinkingLevel,
}

#[derive(Debug, Clone)]
pub struct AvailableTool {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Option<(Vec<AvailableTool>, ToolChoice)>,
    pub temperature: f64,
    pub max_tokens: Option<u64>,
    pub thinking: Option<ThinkingConfig>,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: Message,
    pub usage: LlmUsage,
}

/// Static, per-model configuration. `adaptive` models report a reasoning
/// *effort* instead of a fixed thinking-token budget; this is carried here
/// as an explicit flag rather than inferred by matching on the model name,
/// so adding a new adaptive model is a config change, not a code change.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub name: String,
    pub provider: ProviderKind,
    pub default_temperature: f64,
    pub max_context_tokens: u64,
    pub adaptive: bool,
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub cache_write_cost_per_million: f64,
    pub cache_read_cost_per_million: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    Vertex,
    OpenAi,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Anthropic => write!(f, "Anthropic"),
            ProviderKind::Vertex => write!(f, "Vertex"),
            ProviderKind::OpenAi => write!(f, "OpenAI"),
        }
    }
}

/// Error parsing a [`ProviderKind`] from a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseProviderKindError;

impl std::fmt::Display for ParseProviderKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid provider kind")
    }
}

impl std::error::Error for ParseProviderKindError {}

impl FromStr for ProviderKind {
    type Err = ParseProviderKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "vertex" => Ok(Self::Vertex),
            "openai" | "gpt" => Ok(Self::OpenAi),
            _ => Err(ParseProviderKindError),
        }
    }
}

#[async_trait]
pub trait Backend: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError>;

    async fn complete_streaming(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, Result<LlmChunk, BackendError>>, BackendError>;

    async fn count_tokens(&self, messages: &[Message]) -> Result<u64, BackendError>;

    fn model(&self) -> &ModelConfig;
}

pub type BoxedBackend = Arc<dyn Backend>;

/// Build the concrete backend for a model's configured provider.
pub fn create_backend(
    model: ModelConfig,
    api_key: String,
    base_url: Option<String>,
) -> Result<BoxedBackend, BackendError> {
    match model.provider {
        ProviderKind::Anthropic => {
            Ok(Arc::new(anthropic::AnthropicBackend::new(model, api_key, base_url)))
        }
        ProviderKind::Vertex => Ok(Arc::new(vertex::VertexBackend::new(model, api_key, base_url))),
        ProviderKind::OpenAi => Ok(Arc::new(openai::OpenAiBackend::new(model, api_key, base_url))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parses_case_insensitively_and_aliases() {
        assert_eq!(ProviderKind::from_str("Anthropic").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_str("claude").unwrap(), ProviderKind::Anthropic);
        assert_eq!(ProviderKind::from_str("gpt").unwrap(), ProviderKind::OpenAi);
        assert!(ProviderKind::from_str("bogus").is_err());
    }
}
