// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `todo`: the per-session TODO list tool. State lives on the tool instance
//! (one per session) rather than in the conversation; `save`/`restore`
//! persist it to a session-relative JSON file so it survives a reload.

use std::sync::Mutex;

use async_stream::stream;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::agent::approval::Permission;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoItem {
    pub content: String,
    pub status: TodoStatus,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum TodoArgs {
    Read,
    Write { items: Vec<TodoItem> },
    Save,
    Restore,
}

const TODO_FILE_NAME: &str = "todo.json";

pub struct TodoHandler {
    items: Mutex<Vec<TodoItem>>,
}

impl Default for TodoHandler {
    fn default() -> Self {
        Self { items: Mutex::new(Vec::new()) }
    }
}

#[async_trait::async_trait]
impl Tool for TodoHandler {
    fn name(&self) -> &str {
        "todo"
    }

    fn description(&self) -> &str {
        "Read or replace the session's TODO list; save/restore it to disk."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["read", "write", "save", "restore"]},
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "content": {"type": "string"},
                            "status": {"type": "string", "enum": ["pending", "in_progress", "completed"]}
                        },
                        "required": ["content", "status"]
                    }
                }
            },
            "required": ["action"]
        })
    }

    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        Some(Permission::Always)
    }

    async fn invoke(&self, ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        let outcome = match serde_json::from_value::<TodoArgs>(args) {
            Ok(TodoArgs::Read) => ToolOutcome::Result(self.render()),
            Ok(TodoArgs::Write { items }) => {
                *self.items.lock().expect("todo lock poisoned") = items;
                ToolOutcome::Result(self.render())
            }
            Ok(TodoArgs::Save) => self.save(&ctx.session_dir),
            Ok(TodoArgs::Restore) => self.restore(&ctx.session_dir),
            Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
        };
        Box::pin(stream! { yield ToolYield::Terminal(outcome); })
    }
}

impl TodoHandler {
    fn render(&self) -> String {
        let items = self.items.lock().expect("todo lock poisoned");
        let lines: Vec<String> = items
            .iter()
            .map(|item| format!("[{:?}] {}", item.status, item.content))
            .collect();
        render_result_text(&[("count", items.len().to_string()), ("items", lines.join("\n"))])
    }

    fn save(&self, session_dir: &std::path::Path) -> ToolOutcome {
        let items = self.items.lock().expect("todo lock poisoned");
        match serde_json::to_string_pretty(&*items) {
            Ok(json) => match std::fs::write(session_dir.join(TODO_FILE_NAME), json) {
                Ok(()) => ToolOutcome::Result(render_result_text(&[("saved", items.len().to_string())])),
                Err(err) => ToolOutcome::Error(format!("failed to save todo list: {err}")),
            },
            Err(err) => ToolOutcome::Error(format!("failed to serialize todo list: {err}")),
        }
    }

    fn restore(&self, session_dir: &std::path::Path) -> ToolOutcome {
        let path = session_dir.join(TODO_FILE_NAME);
        match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<Vec<TodoItem>>(&contents) {
                Ok(items) => {
                    let count = items.len();
                    *self.items.lock().expect("todo lock poisoned") = items;
                    ToolOutcome::Result(render_result_text(&[("restored", count.to_string())]))
                }
                Err(err) => ToolOutcome::Error(format!("failed to parse saved todo list: {err}")),
            },
            Err(err) => ToolOutcome::Error(format!("no saved todo list: {err}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_then_restore_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let handler = TodoHandler::default();
        *handler.items.lock().unwrap() =
            vec![TodoItem { content: "write tests".into(), status: TodoStatus::Pending }];
        assert!(matches!(handler.save(dir.path()), ToolOutcome::Result(_)));

        let restored = TodoHandler::default();
        assert!(matches!(restored.restore(dir.path()), ToolOutcome::Result(_)));
        assert_eq!(restored.items.lock().unwrap().len(), 1);
    }
}
