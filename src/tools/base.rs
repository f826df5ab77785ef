// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The tool contract (C2): [`Tool`], [`InvokeContext`], and the registry
//! tools are looked up from.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::agent::approval::Permission;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    NotFound(String),
    #[error("tool '{0}' is already registered")]
    AlreadyRegistered(String),
    #[error("invalid arguments for tool '{tool}': {message}")]
    InvalidArgs { tool: String, message: String },
    #[error("tool '{tool}' failed: {message}")]
    Execution { tool: String, message: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// One chunk of output from a running tool invocation, or its single
/// terminal outcome. Exactly one terminal item is ever produced per
/// invocation; the registry enforces this at the call site rather than
/// trusting each tool implementation to get it right.
#[derive(Debug, Clone)]
pub enum ToolYield {
    Stream(String),
    Terminal(ToolOutcome),
}

#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Result(String),
    /// A tool-level failure (bad input, nonzero exit, network error, ...).
    Error(String),
    /// The tool could not run because of an OS-level permission denial
    /// discovered at invocation time (e.g. a file or directory the process
    /// isn't allowed to touch) rather than a policy decision. Carried
    /// separately from [`ToolOutcome::Error`] so the agent loop can
    /// re-classify an approved call as rejected instead of failed.
    PermissionDenied(String),
}

/// The host UI's answer to an `AskUser` approval prompt: mirrors the
/// original `ToolDecision`'s `(YES|NO, feedback?)` shape. `feedback` carries
/// the rejection reason (or cancellation marker) verbatim through to the
/// skipped tool response; a `None` feedback on rejection falls back to a
/// generic cancellation message.
#[derive(Debug, Clone)]
pub struct ApprovalDecision {
    pub approved: bool,
    pub feedback: Option<String>,
}

impl ApprovalDecision {
    pub fn approved() -> Self {
        Self { approved: true, feedback: None }
    }

    pub fn rejected(feedback: impl Into<String>) -> Self {
        Self { approved: false, feedback: Some(feedback.into()) }
    }
}

pub type ApprovalCallback = Arc<
    dyn Fn(
            String,
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = ApprovalDecision> + Send>>
        + Send
        + Sync,
>;

pub type UserInputCallback =
    Arc<dyn Fn(String) -> Pin<Box<dyn Future<Output = String> + Send>> + Send + Sync>;

pub type SamplingCallback = Arc<
    dyn Fn(
            serde_json::Value,
        ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, ToolError>> + Send>>
        + Send
        + Sync,
>;

/// Everything a tool invocation needs that isn't part of its own typed
/// arguments: identity for correlating stream events, where to read/write
/// on disk, and the callbacks that reach back into the host (approval
/// prompts, free-form user input, and MCP sampling).
#[derive(Clone)]
pub struct InvokeContext {
    pub tool_call_id: String,
    pub session_dir: PathBuf,
    pub entrypoint_metadata: serde_json::Value,
    pub approval_callback: Option<ApprovalCallback>,
    pub user_input_callback: Option<UserInputCallback>,
    pub sampling_callback: Option<SamplingCallback>,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn args_schema(&self) -> serde_json::Value;
    fn result_schema(&self) -> serde_json::Value {
        serde_json::json!({"type": "object"})
    }

    /// Let a tool override the policy-resolved permission for one specific
    /// call, e.g. `task` pre-approving a narrow allowlist of subagent
    /// targets. Returning `None` leaves the caller's policy resolution in
    /// effect.
    fn resolve_permission(&self, _args: &serde_json::Value) -> Option<Permission> {
        None
    }

    async fn invoke(&self, ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield>;
}

pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Restrict the registry to exactly the names in `enabled`, preserving
    /// instances.
    pub fn filtered(&self, enabled: &[String]) -> ToolRegistry {
        let mut tools = HashMap::new();
        for name in enabled {
            if let Some(tool) = self.tools.get(name) {
                tools.insert(name.clone(), tool.clone());
            }
        }
        ToolRegistry { tools }
    }
}
