// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! MCP sampling adapter (C14): lets an external MCP tool server request a
//! completion from whichever backend the host agent is using.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::providers::{Backend, CompletionRequest};
use crate::types::{Message, Role};

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingMessage {
    pub role: String,
    pub content: Vec<SamplingContentBlock>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingContentBlock {
    #[serde(rename = "type")]
    pub block_type: String,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SamplingRequest {
    pub messages: Vec<SamplingMessage>,
    pub system_prompt: Option<String>,
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SamplingResponse {
    pub role: String,
    pub content: String,
    pub model: String,
    #[serde(rename = "stopReason")]
    pub stop_reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SamplingError {
    pub code: i32,
    pub message: String,
}

pub struct McpSamplingHandler {
    backend: Arc<dyn Backend>,
    active_model_name: String,
    default_temperature: f64,
}

impl McpSamplingHandler {
    pub fn new(backend: Arc<dyn Backend>, active_model_name: String, default_temperature: f64) -> Self {
        Self { backend, active_model_name, default_temperature }
    }

    /// Map an MCP role to ours, defensively treating anything unrecognized
    /// as `assistant` rather than rejecting the whole request.
    fn map_role(role: &str) -> Role {
        match role {
            "user" => Role::User,
            "assistant" => Role::Assistant,
            other => {
                warn!(role = other, "unrecognized MCP sampling role, treating as assistant");
                Role::Assistant
            }
        }
    }

    pub async fn handle(&self, request: SamplingRequest) -> Result<SamplingResponse, SamplingError> {
        let mut messages = Vec::new();
        if let Some(system_prompt) = &request.system_prompt {
            messages.push(Message::new(Role::System, system_prompt.clone()));
        }
        for message in &request.messages {
            let text = message
                .content
                .iter()
                .filter_map(|block| block.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n");
            messages.push(Message::new(Self::map_role(&message.role), text));
        }

        let completion_request = CompletionRequest {
            messages,
            tools: None,
            temperature: request.temperature.unwrap_or(self.default_temperature),
            max_tokens: None,
            thinking: None,
        };

        match self.backend.complete(completion_request).await {
            Ok(response) => Ok(SamplingResponse {
                role: "assistant".to_string(),
                content: response.message.text().unwrap_or_default().to_string(),
                model: self.active_model_name.clone(),
                stop_reason: "endTurn".to_string(),
            }),
            Err(err) => Err(SamplingError { code: -1, message: format!("Sampling failed: {err}") }),
        }
    }
}
