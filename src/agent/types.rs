// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration and error types for the agent loop (C5).

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::agent::approval::ApprovalPolicy;
use crate::agent::profiles::AgentProfileManager;
use crate::providers::{BackendError, BoxedBackend, ThinkingLevel};
use crate::session::SessionError;
use crate::telemetry::TelemetrySink;
use crate::tools::{ApprovalCallback, SamplingCallback, ToolError, ToolRegistry, UserInputCallback};
use crate::types::MergeError;

#[derive(Debug, Error)]
pub enum AgentLoopError {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Merge(#[from] MergeError),
    #[error("an act() call is already in progress for this session")]
    AlreadyRunning,
    #[error("invariant violation: {0}")]
    InvalidState(String),
    #[error("operation was cancelled")]
    Cancelled,
    #[error("malformed backend response: {0}")]
    MalformedResponse(String),
    #[error(transparent)]
    Profile(#[from] crate::agent::profiles::ProfileError),
}

/// Tunables for one agent loop instance; distinct from [`crate::config::
/// ResolvedConfig`], which covers the whole process -- this is the slice of
/// it one [`super::Agent`] actually needs once a profile has been applied.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_turns: u64,
    pub max_price: f64,
    pub auto_compact_threshold: u64,
    pub context_warning_percent: f64,
    pub use_streaming: bool,
    pub loop_detection_threshold: u32,
    pub thinking_level: Option<ThinkingLevel>,
    pub max_response_tokens: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_turns: 100,
            max_price: 10.0,
            auto_compact_threshold: 150_000,
            context_warning_percent: 0.5,
            use_streaming: true,
            loop_detection_threshold: 3,
            thinking_level: None,
            max_response_tokens: None,
        }
    }
}

/// Everything needed to construct one [`super::Agent`]. `profile_manager` is
/// optional: a bare agent loop (e.g. a one-off subagent spawned by `task`)
/// doesn't need to support `switch_agent`.
pub struct AgentOptions {
    pub backend: BoxedBackend,
    pub tool_registry: Arc<ToolRegistry>,
    pub approval_policy: ApprovalPolicy,
    pub system_prompt: String,
    pub config: AgentConfig,
    pub session_save_dir: PathBuf,
    pub session_prefix: String,
    pub working_directory: PathBuf,
    pub telemetry: Arc<dyn TelemetrySink>,
    pub profile_manager: Option<AgentProfileManager>,
    pub active_profile: String,
    pub max_context_tokens: Option<u64>,
    pub approval_callback: Option<ApprovalCallback>,
    pub user_input_callback: Option<UserInputCallback>,
    pub sampling_callback: Option<SamplingCallback>,
}
