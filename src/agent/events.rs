// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Streaming UI events emitted by the agent loop (C5).
//!
//! One [`AgentEvent`] per user-visible update: a user message landing in
//! history, assistant text/reasoning arriving, a tool call being announced,
//! streamed, or resolved, and the start/end of a compaction pass.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessageEvent {
    pub message_id: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantEvent {
    pub message_id: Option<String>,
    pub content: String,
    pub stopped_by_middleware: bool,
}

impl AssistantEvent {
    /// Combine two partial assistant events the way the agent loop folds a
    /// middleware-stop signal into whatever text had already streamed.
    pub fn merge(mut self, other: AssistantEvent) -> AssistantEvent {
        self.content.push_str(&other.content);
        self.stopped_by_middleware = self.stopped_by_middleware || other.stopped_by_middleware;
        self.message_id = self.message_id.or(other.message_id);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningEvent {
    pub message_id: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToolResultOutcome {
    Result { content: String },
    Error { message: String },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEvent {
    pub call_id: String,
    pub tool_name: String,
    #[serde(flatten)]
    pub outcome: ToolResultOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolStreamEvent {
    pub call_id: String,
    pub chunk: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactStartEvent {
    pub compaction_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactEndEvent {
    pub compaction_id: String,
    pub old_tokens: u64,
    pub new_tokens: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AgentEvent {
    UserMessage(UserMessageEvent),
    Assistant(AssistantEvent),
    Reasoning(ReasoningEvent),
    ToolCall(ToolCallEvent),
    ToolResult(ToolResultEvent),
    ToolStream(ToolStreamEvent),
    CompactStart(CompactStartEvent),
    CompactEnd(CompactEndEvent),
}

/// Three reasons a tool invocation can be cut short without ever producing
/// a real result. Wording here is authored directly against these three
/// call sites (not carried from any upstream source — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancellationReason {
    /// The user (or a denylist) rejected the approval prompt.
    Skipped,
    /// The turn was interrupted (Ctrl-C, middleware STOP) mid-invocation.
    Interrupted,
    /// The approval callback never returned a decision.
    NoResponse,
}

impl CancellationReason {
    pub fn message(self) -> &'static str {
        match self {
            CancellationReason::Skipped => "Tool call skipped by user.",
            CancellationReason::Interrupted => "Tool call interrupted before it could complete.",
            CancellationReason::NoResponse => {
                "No approval response was received for this tool call."
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assistant_event_merge_ors_stopped_flag_and_concatenates_text() {
        let a = AssistantEvent {
            message_id: Some("m1".into()),
            content: "Hello".into(),
            stopped_by_middleware: false,
        };
        let b = AssistantEvent { message_id: None, content: ", world".into(), stopped_by_middleware: true };
        let merged = a.merge(b);
        assert_eq!(merged.content, "Hello, world");
        assert!(merged.stopped_by_middleware);
        assert_eq!(merged.message_id.as_deref(), Some("m1"));
    }
}
