// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crate-wide error types.
//!
//! Each subsystem owns a narrow `thiserror` enum at its boundary; [`CoreError`]
//! is the umbrella type returned by the top-level agent loop APIs so callers
//! don't need to match on every subsystem's error type individually.

use thiserror::Error;

use crate::agent::AgentLoopError;
use crate::config::ConfigError;
use crate::providers::BackendError;
use crate::session::SessionError;
use crate::tools::ToolError;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    AgentLoop(#[from] AgentLoopError),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
