// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `search_replace` (exposed as tool name `edit_file`): replace one exact
//! occurrence of `old_string` with `new_string` in a file.

use async_stream::stream;
use futures::stream::BoxStream;
use serde::Deserialize;

use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct EditFileArgs {
    path: String,
    old_string: String,
    new_string: String,
}

pub struct EditFileHandler;

#[async_trait::async_trait]
impl Tool for EditFileHandler {
    fn name(&self) -> &str {
        "edit_file"
    }

    fn description(&self) -> &str {
        "Replace one exact, unique occurrence of old_string with new_string in a file."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_string": {"type": "string"},
                "new_string": {"type": "string"}
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<EditFileArgs>(args) {
                Ok(args) => apply_edit(&args),
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}

fn apply_edit(args: &EditFileArgs) -> ToolOutcome {
    let contents = match std::fs::read_to_string(&args.path) {
        Ok(c) => c,
        Err(err) => return ToolOutcome::Error(format!("failed to read {}: {err}", args.path)),
    };

    let occurrences = contents.matches(args.old_string.as_str()).count();
    if occurrences == 0 {
        return ToolOutcome::Error(format!("old_string not found in {}", args.path));
    }
    if occurrences > 1 {
        return ToolOutcome::Error(format!(
            "old_string is not unique in {} ({occurrences} matches)",
            args.path
        ));
    }

    let updated = contents.replacen(&args.old_string, &args.new_string, 1);
    match std::fs::write(&args.path, updated) {
        Ok(()) => ToolOutcome::Result(render_result_text(&[("path", args.path.clone())])),
        Err(err) => ToolOutcome::Error(format!("failed to write {}: {err}", args.path)),
    }
}
