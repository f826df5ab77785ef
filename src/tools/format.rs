// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Wire-format plumbing between the raw backend response and the typed
//! message/tool-call model (C4).

use crate::tools::base::ToolOutcome;
use crate::types::{Content, ContentBlock, FunctionCall, Message, Role, ToolCall};

/// Render a tool's structured result as the flat text the backend expects
/// in a `tool` role message: one `key: value` line per field, in field
/// order.
pub fn render_result_text(fields: &[(&str, String)]) -> String {
    fields.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join("\n")
}

/// Build the `tool` role message carrying a successful or failed result for
/// one call.
pub fn tool_response_message(call_id: &str, outcome: &ToolOutcome) -> Message {
    let text = match outcome {
        ToolOutcome::Result(text) => text.clone(),
        ToolOutcome::Error(message) => format!("Error: {message}"),
        ToolOutcome::PermissionDenied(message) => format!("Error: {message}"),
    };
    let mut message = Message::new(Role::Tool, text);
    message.tool_call_id = Some(call_id.to_string());
    message
}

pub fn skipped_tool_response_message(call_id: &str, reason: &str) -> Message {
    let mut message = Message::new(Role::Tool, format!("Skipped: {reason}"));
    message.tool_call_id = Some(call_id.to_string());
    message
}

/// Parse an assistant message's tool calls into `(id, name, parsed_args)`,
/// surfacing a per-call error instead of failing the whole batch when one
/// call's accumulated argument string isn't valid JSON.
pub fn resolve_tool_calls(
    message: &Message,
) -> Vec<(String, String, Result<serde_json::Value, serde_json::Error>)> {
    message
        .tool_calls
        .iter()
        .flatten()
        .map(|call: &ToolCall| {
            let parsed = serde_json::from_str(&call.function.arguments);
            (call.id.clone(), call.function.name.clone(), parsed)
        })
        .collect()
}

/// Collapse a content-block list's text blocks into one plain string, the
/// way the loop reads image-tool results and subagent outputs.
pub fn flatten_text(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Blocks(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join(""),
    }
}

/// Build an assistant-role delta carrying one tool-call placeholder, used
/// while streaming to announce a call before its arguments have fully
/// arrived.
pub fn tool_call_placeholder(index: usize, id: &str, name: &str) -> Message {
    let mut message = Message::empty_delta(Role::Assistant);
    message.tool_calls = Some(vec![ToolCall {
        id: id.to_string(),
        index,
        function: FunctionCall { name: name.to_string(), arguments: String::new() },
    }]);
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_result_text_joins_key_value_lines() {
        let text = render_result_text(&[("path", "a.rs".into()), ("lines", "12".into())]);
        assert_eq!(text, "path: a.rs\nlines: 12");
    }

    #[test]
    fn tool_response_message_carries_call_id() {
        let message = tool_response_message("call_1", &ToolOutcome::Result("ok".into()));
        assert_eq!(message.tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(message.text(), Some("ok"));
    }
}
