// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `read_file`: read a file (optionally a line range) from disk.

use async_stream::stream;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::agent::approval::Permission;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
    start_line: Option<usize>,
    end_line: Option<usize>,
}

pub struct ReadFileHandler;

#[async_trait::async_trait]
impl Tool for ReadFileHandler {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a file from disk, optionally restricted to a 1-indexed line range."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "start_line": {"type": "integer"},
                "end_line": {"type": "integer"}
            },
            "required": ["path"]
        })
    }

    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        Some(Permission::Always)
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<ReadFileArgs>(args) {
                Ok(args) => match std::fs::read_to_string(&args.path) {
                    Ok(contents) => {
                        let selected = match (args.start_line, args.end_line) {
                            (None, None) => contents,
                            (start, end) => contents
                                .lines()
                                .skip(start.unwrap_or(1).saturating_sub(1))
                                .take(end.unwrap_or(usize::MAX).saturating_sub(start.unwrap_or(1)) + 1)
                                .collect::<Vec<_>>()
                                .join("\n"),
                        };
                        ToolOutcome::Result(render_result_text(&[
                            ("path", args.path),
                            ("content", selected),
                        ]))
                    }
                    Err(err) => ToolOutcome::Error(format!("failed to read {}: {err}", args.path)),
                },
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}
