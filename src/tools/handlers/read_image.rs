// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `read_image`: resolve an image reference into the `image_url` shape the
//! agent loop's image special-case (§4.4.2) looks for. `http(s)://` URLs
//! pass through verbatim; `file://` URLs (and bare paths) are read off disk
//! and base64-encoded into a `data:` URL.

use async_stream::stream;
use base64::Engine;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;

#[derive(Debug, Deserialize)]
struct ReadImageArgs {
    path: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
enum SourceType {
    Http,
    File,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Http => write!(f, "http"),
            SourceType::File => write!(f, "file"),
        }
    }
}

pub struct ReadImageHandler;

#[async_trait::async_trait]
impl Tool for ReadImageHandler {
    fn name(&self) -> &str {
        "read_image"
    }

    fn description(&self) -> &str {
        "Resolve an image URL or local file path into an image_url the vision model can see."
    }

    fn args_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {"path": {"type": "string"}},
            "required": ["path"]
        })
    }

    async fn invoke(&self, _ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        Box::pin(stream! {
            let outcome = match serde_json::from_value::<ReadImageArgs>(args) {
                Ok(args) => resolve(&args.path),
                Err(err) => ToolOutcome::Error(format!("invalid arguments: {err}")),
            };
            yield ToolYield::Terminal(outcome);
        })
    }
}

fn resolve(path: &str) -> ToolOutcome {
    if let Some(url) = path.strip_prefix("http://").map(|_| path).or_else(|| {
        path.strip_prefix("https://").map(|_| path)
    }) {
        return ToolOutcome::Result(render_result_text(&[
            ("image_url", url.to_string()),
            ("source_type", SourceType::Http.to_string()),
            ("source_path", path.to_string()),
        ]));
    }

    let fs_path = path.strip_prefix("file://").unwrap_or(path);
    match std::fs::read(fs_path) {
        Ok(bytes) => {
            let mime = guess_mime(fs_path);
            let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
            ToolOutcome::Result(render_result_text(&[
                ("image_url", format!("data:{mime};base64,{encoded}")),
                ("source_type", SourceType::File.to_string()),
                ("source_path", fs_path.to_string()),
            ]))
        }
        Err(err) if err.kind() == std::io::ErrorKind::PermissionDenied => {
            ToolOutcome::PermissionDenied(format!("permission denied reading image {fs_path}: {err}"))
        }
        Err(err) => ToolOutcome::Error(format!("failed to read image {fs_path}: {err}")),
    }
}

fn guess_mime(path: &str) -> &'static str {
    match std::path::Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_urls_pass_through_verbatim() {
        let outcome = resolve("https://example.com/a.png");
        match outcome {
            ToolOutcome::Result(text) => assert!(text.contains("image_url: https://example.com/a.png")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
