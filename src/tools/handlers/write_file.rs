// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `write_file`: create or overwrite a file, creating parent directories as
//! needed.

use async_stream::stream;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

pub struct WriteFileHandler;

#[async_trait::async_trait]
impl Tool for WriteFileHandler {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories and overwriting any existing file."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "content": {"type": "string"}
            },
            "required": ["path", "content"]
        })
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<WriteFileArgs>(args) {
                Ok(args) => {
                    let path = std::path::Path::new(&args.path);
                    let write_result = path
                        .parent()
                        .map(std::fs::create_dir_all)
                        .unwrap_or(Ok(()))
                        .and_then(|_| std::fs::write(path, &args.content));
                    match write_result {
                        Ok(()) => ToolOutcome::Result(render_result_text(&[
                            ("path", args.path),
                            ("bytes_written", args.content.len().to_string()),
                        ])),
                        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
                            ToolOutcome::PermissionDenied(format!(
                                "permission denied writing {}: {err}",
                                args.path
                            ))
                        }
                        Err(err) => ToolOutcome::Error(format!("failed to write {}: {err}", args.path)),
                    }
                }
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}
