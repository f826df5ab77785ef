// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `glob`: find files under a root directory matching a glob pattern.

use async_stream::stream;
use futures::stream::BoxStream;
use globset::Glob;
use serde::Deserialize;

use crate::agent::approval::Permission;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct GlobArgs {
    pattern: String,
    #[serde(default = "default_root")]
    root: String,
}

fn default_root() -> String {
    ".".to_string()
}

pub struct GlobHandler;

#[async_trait::async_trait]
impl Tool for GlobHandler {
    fn name(&self) -> &str {
        "glob"
    }

    fn description(&self) -> &str {
        "Find files under root whose relative path matches a glob pattern."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "root": {"type": "string"}
            },
            "required": ["pattern"]
        })
    }

    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        Some(Permission::Always)
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<GlobArgs>(args) {
                Ok(args) => match Glob::new(&args.pattern) {
                    Ok(glob) => {
                        let matcher = glob.compile_matcher();
                        let matches: Vec<String> = walkdir::WalkDir::new(&args.root)
                            .into_iter()
                            .filter_map(Result::ok)
                            .filter(|entry| entry.file_type().is_file())
                            .filter(|entry| matcher.is_match(entry.path()))
                            .map(|entry| entry.path().display().to_string())
                            .collect();
                        ToolOutcome::Result(render_result_text(&[
                            ("count", matches.len().to_string()),
                            ("matches", matches.join("\n")),
                        ]))
                    }
                    Err(err) => ToolOutcome::Error(format!("invalid glob pattern: {err}")),
                },
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}
