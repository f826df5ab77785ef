// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The tool registry and contract (C2), wire-format plumbing (C4), the MCP
//! sampling adapter (C14), and the concrete builtin tool implementations.

pub mod base;
pub mod format;
pub mod handlers;
pub mod mcp_sampling;

pub use base::{
    ApprovalCallback, ApprovalDecision, InvokeContext, SamplingCallback, Tool, ToolError,
    ToolOutcome, ToolRegistry, ToolYield, UserInputCallback,
};
