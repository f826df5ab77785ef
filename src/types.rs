// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The message model (C1): [`Message`], [`ToolCall`], [`Content`], and the
//! non-commutative merge law used to fold streamed response chunks into a
//! single message.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Role of a message in the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single content block within a message's content list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { source_type: String, data: String },
    ToolUse { id: String, name: String, input: serde_json::Value },
    ToolResult { tool_call_id: String, content: String, is_error: bool },
}

/// A message's content: either a plain string or a list of typed blocks.
///
/// Mirrors the original's loose `str | list[dict]` content field, coerced at
/// construction time into one of these two shapes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl Content {
    /// True if this content carries no text and no blocks.
    pub fn is_empty(&self) -> bool {
        match self {
            Content::Text(s) => s.is_empty(),
            Content::Blocks(b) => b.is_empty(),
        }
    }

    fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Blocks(_) => None,
        }
    }
}

/// A function call's name and accumulated (possibly partial) JSON argument
/// string. Streamed tool-call argument fragments are concatenated in order
/// before the whole string is parsed as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool call as it appears on an assistant message, or as accumulated from
/// streamed deltas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// Position in the assistant message's tool_calls list. Required to
    /// merge streamed deltas that arrive tagged only by index, not id.
    pub index: usize,
    pub function: FunctionCall,
}

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("cannot merge messages with different roles: {0:?} vs {1:?}")]
    RoleMismatch(Role, Role),
    #[error("cannot merge messages with different tool names: {0:?} vs {1:?}")]
    NameMismatch(Option<String>, Option<String>),
    #[error("cannot merge messages with different tool_call_id: {0:?} vs {1:?}")]
    ToolCallIdMismatch(Option<String>, Option<String>),
    #[error("cannot merge tool call deltas with different names at index {index}: {a:?} vs {b:?}")]
    ToolCallNameMismatch { index: usize, a: String, b: String },
}

/// A single turn's message. Role `tool` messages always carry a fixed
/// `message_id`-less identity (the underlying `tool_call_id` already
/// identifies them); every other role gets an auto-generated UUID unless one
/// is supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    pub role: Role,
    pub content: Option<Content>,
    pub reasoning_content: Option<String>,
    pub reasoning_signature: Option<String>,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            content: Some(Content::Text(content.into())),
            reasoning_content: None,
            reasoning_signature: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn empty_delta(role: Role) -> Self {
        Self {
            message_id: Uuid::new_v4().to_string(),
            role,
            content: None,
            reasoning_content: None,
            reasoning_signature: None,
            tool_calls: None,
            tool_call_id: None,
            name: None,
        }
    }

    /// Plain-text content, if any (content-block messages return `None`).
    pub fn text(&self) -> Option<&str> {
        self.content.as_ref().and_then(Content::as_text)
    }

    /// Fold `other` into `self`, following the non-commutative chunk-merge
    /// law (I-M1..I-M4): role/name/tool_call_id must agree; content,
    /// reasoning_content and reasoning_signature concatenate (an empty
    /// string on either side is treated as absent); tool_calls merge by
    /// index, requiring name agreement once a name has been seen, and
    /// concatenating argument-string fragments in arrival order.
    pub fn merge(mut self, other: Message) -> Result<Message, MergeError> {
        if self.role != other.role {
            return Err(MergeError::RoleMismatch(self.role, other.role));
        }
        if self.name.is_some() && other.name.is_some() && self.name != other.name {
            return Err(MergeError::NameMismatch(self.name, other.name));
        }
        if self.tool_call_id.is_some()
            && other.tool_call_id.is_some()
            && self.tool_call_id != other.tool_call_id
        {
            return Err(MergeError::ToolCallIdMismatch(
                self.tool_call_id,
                other.tool_call_id,
            ));
        }

        self.name = self.name.or(other.name);
        self.tool_call_id = self.tool_call_id.or(other.tool_call_id);
        self.content = merge_text_field(
            self.content.as_ref().and_then(Content::as_text),
            other.content.as_ref().and_then(Content::as_text),
        )
        .map(Content::Text)
        .or(self.content)
        .or(other.content);
        self.reasoning_content = merge_opt_str(self.reasoning_content, other.reasoning_content);
        self.reasoning_signature =
            merge_opt_str(self.reasoning_signature, other.reasoning_signature);

        self.tool_calls = merge_tool_calls(self.tool_calls, other.tool_calls)?;

        Ok(self)
    }
}

fn merge_text_field(a: Option<&str>, b: Option<&str>) -> Option<String> {
    match (a.filter(|s| !s.is_empty()), b.filter(|s| !s.is_empty())) {
        (None, None) => None,
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (Some(a), Some(b)) => Some(format!("{a}{b}")),
    }
}

fn merge_opt_str(a: Option<String>, b: Option<String>) -> Option<String> {
    merge_text_field(a.as_deref(), b.as_deref())
}

fn merge_tool_calls(
    a: Option<Vec<ToolCall>>,
    b: Option<Vec<ToolCall>>,
) -> Result<Option<Vec<ToolCall>>, MergeError> {
    if a.is_none() && b.is_none() {
        return Ok(None);
    }
    let mut by_index: Vec<ToolCall> = a.unwrap_or_default();

    for incoming in b.unwrap_or_default() {
        match by_index.iter_mut().find(|tc| tc.index == incoming.index) {
            Some(existing) => {
                if !existing.function.name.is_empty()
                    && !incoming.function.name.is_empty()
                    && existing.function.name != incoming.function.name
                {
                    return Err(MergeError::ToolCallNameMismatch {
                        index: incoming.index,
                        a: existing.function.name.clone(),
                        b: incoming.function.name.clone(),
                    });
                }
                if existing.function.name.is_empty() {
                    existing.function.name = incoming.function.name;
                }
                if !incoming.id.is_empty() {
                    existing.id = incoming.id;
                }
                existing.function.arguments.push_str(&incoming.function.arguments);
            }
            None => by_index.push(incoming),
        }
    }
    by_index.sort_by_key(|tc| tc.index);
    Ok(Some(by_index))
}

/// Token/cost usage for a single completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub cache_creation_input_tokens: u64,
    pub cache_read_input_tokens: u64,
}

impl LlmUsage {
    /// Prompt-side token count as billed: base prompt tokens plus both cache
    /// creation and cache read tokens.
    pub fn total_prompt_tokens(&self) -> u64 {
        self.prompt_tokens + self.cache_creation_input_tokens + self.cache_read_input_tokens
    }

    pub fn merge(self, other: Option<LlmUsage>) -> LlmUsage {
        let Some(other) = other else { return self };
        LlmUsage {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            cache_creation_input_tokens: self.cache_creation_input_tokens
                + other.cache_creation_input_tokens,
            cache_read_input_tokens: self.cache_read_input_tokens
                + other.cache_read_input_tokens,
        }
    }
}

/// One streamed delta from a backend: a partial [`Message`] plus whatever
/// usage info arrived with it (usually only on the first and last chunks).
#[derive(Debug, Clone)]
pub struct LlmChunk {
    pub message: Message,
    pub usage: Option<LlmUsage>,
}

impl LlmChunk {
    pub fn merge(self, other: LlmChunk) -> Result<LlmChunk, MergeError> {
        Ok(LlmChunk {
            message: self.message.merge(other.message)?,
            usage: match (self.usage, other.usage) {
                (None, None) => None,
                (a, b) => Some(a.unwrap_or_default().merge(b)),
            },
        })
    }
}

/// How the caller wants tool selection constrained for one completion
/// request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolChoice {
    Auto,
    Any,
    None,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_concatenates_text_content() {
        let a = Message::new(Role::Assistant, "Hello, ");
        let mut b = Message::empty_delta(Role::Assistant);
        b.content = Some(Content::Text("world!".to_string()));
        let merged = a.merge(b).unwrap();
        assert_eq!(merged.text(), Some("Hello, world!"));
    }

    #[test]
    fn merge_rejects_role_mismatch() {
        let a = Message::new(Role::Assistant, "hi");
        let b = Message::new(Role::User, "there");
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn merge_tool_calls_by_index_concatenates_arguments() {
        let mut a = Message::empty_delta(Role::Assistant);
        a.tool_calls = Some(vec![ToolCall {
            id: "call_1".into(),
            index: 0,
            function: FunctionCall { name: "grep".into(), arguments: "{\"pat".into() },
        }]);
        let mut b = Message::empty_delta(Role::Assistant);
        b.tool_calls = Some(vec![ToolCall {
            id: String::new(),
            index: 0,
            function: FunctionCall { name: String::new(), arguments: "tern\":\"x\"}".into() },
        }]);
        let merged = a.merge(b).unwrap();
        let calls = merged.tool_calls.unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].function.arguments, "{\"pattern\":\"x\"}");
        assert_eq!(calls[0].id, "call_1");
    }

    #[test]
    fn merge_tool_calls_rejects_name_disagreement() {
        let mut a = Message::empty_delta(Role::Assistant);
        a.tool_calls = Some(vec![ToolCall {
            id: "1".into(),
            index: 0,
            function: FunctionCall { name: "grep".into(), arguments: String::new() },
        }]);
        let mut b = Message::empty_delta(Role::Assistant);
        b.tool_calls = Some(vec![ToolCall {
            id: "1".into(),
            index: 0,
            function: FunctionCall { name: "glob".into(), arguments: String::new() },
        }]);
        assert!(a.merge(b).is_err());
    }

    #[test]
    fn usage_merge_treats_none_as_absorbing_identity() {
        let usage = LlmUsage { prompt_tokens: 10, ..Default::default() };
        assert_eq!(usage.merge(None).prompt_tokens, 10);
        let merged = usage.merge(Some(LlmUsage { completion_tokens: 5, ..Default::default() }));
        assert_eq!(merged.prompt_tokens, 10);
        assert_eq!(merged.completion_tokens, 5);
    }
}
