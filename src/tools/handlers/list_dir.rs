// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `list_dir`: list the immediate entries of a directory.

use async_stream::stream;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::agent::approval::Permission;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct ListDirArgs {
    path: String,
}

pub struct ListDirHandler;

#[async_trait::async_trait]
impl Tool for ListDirHandler {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "List the immediate entries of a directory."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        Some(Permission::Always)
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<ListDirArgs>(args) {
                Ok(args) => match std::fs::read_dir(&args.path) {
                    Ok(entries) => {
                        let mut names: Vec<String> = entries
                            .filter_map(Result::ok)
                            .map(|entry| {
                                let suffix = if entry.path().is_dir() { "/" } else { "" };
                                format!("{}{}", entry.file_name().to_string_lossy(), suffix)
                            })
                            .collect();
                        names.sort();
                        ToolOutcome::Result(render_result_text(&[
                            ("path", args.path),
                            ("entries", names.join("\n")),
                        ]))
                    }
                    Err(err) => ToolOutcome::Error(format!("failed to list {}: {err}", args.path)),
                },
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}
