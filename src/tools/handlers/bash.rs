// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `bash`: run a shell command, streaming its combined output line by line
//! before yielding the terminal result.

use async_stream::stream;
use futures::stream::BoxStream;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct BashArgs {
    command: String,
    #[serde(default)]
    working_dir: Option<String>,
}

pub struct BashHandler;

#[async_trait::async_trait]
impl Tool for BashHandler {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined stdout/stderr."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string"},
                "working_dir": {"type": "string"}
            },
            "required": ["command"]
        })
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let args = match serde_json::from_value::<BashArgs>(args) {
                Ok(args) => args,
                Err(err) => {
                    yield ToolYield::Terminal(ToolOutcome::Error(format!("invalid arguments: {err}")));
                    return;
                }
            };

            let mut command = Command::new("sh");
            command.arg("-c").arg(&args.command);
            if let Some(dir) = &args.working_dir {
                command.current_dir(dir);
            }
            command.stdout(std::process::Stdio::piped());
            command.stderr(std::process::Stdio::piped());

            let mut child = match command.spawn() {
                Ok(child) => child,
                Err(err) => {
                    yield ToolYield::Terminal(ToolOutcome::Error(format!("failed to spawn: {err}")));
                    return;
                }
            };

            let stdout = child.stdout.take().expect("piped stdout");
            let mut lines = BufReader::new(stdout).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
                yield ToolYield::Stream(line);
            }

            let outcome = match child.wait().await {
                Ok(status) if status.success() => {
                    ToolOutcome::Result(render_result_text(&[("output", collected)]))
                }
                Ok(status) => ToolOutcome::Error(format!(
                    "command exited with {status}\n{collected}"
                )),
                Err(err) => ToolOutcome::Error(format!("failed to wait on command: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}
