// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `grep`: regex search across files under a root directory.

use async_stream::stream;
use futures::stream::BoxStream;
use regex::Regex;
use serde::Deserialize;

use crate::agent::approval::Permission;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct GrepArgs {
    pattern: String,
    #[serde(default = "default_root")]
    root: String,
    #[serde(default = "default_max_matches")]
    max_matches: usize,
}

fn default_root() -> String {
    ".".to_string()
}

fn default_max_matches() -> usize {
    200
}

pub struct GrepHandler;

#[async_trait::async_trait]
impl Tool for GrepHandler {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Search files under root for lines matching a regular expression."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {"type": "string"},
                "root": {"type": "string"},
                "max_matches": {"type": "integer"}
            },
            "required": ["pattern"]
        })
    }

    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        Some(Permission::Always)
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<GrepArgs>(args) {
                Ok(args) => match Regex::new(&args.pattern) {
                    Ok(regex) => ToolOutcome::Result(search(&regex, &args.root, args.max_matches)),
                    Err(err) => ToolOutcome::Error(format!("invalid regex: {err}")),
                },
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}

fn search(regex: &Regex, root: &str, max_matches: usize) -> String {
    let mut lines = Vec::new();
    'walk: for entry in walkdir::WalkDir::new(root).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(contents) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        for (number, line) in contents.lines().enumerate() {
            if regex.is_match(line) {
                lines.push(format!("{}:{}: {}", entry.path().display(), number + 1, line));
                if lines.len() >= max_matches {
                    break 'walk;
                }
            }
        }
    }
    render_result_text(&[("count", lines.len().to_string()), ("matches", lines.join("\n"))])
}
