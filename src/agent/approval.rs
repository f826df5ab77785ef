// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Permission resolution and interactive approval (C6).
//!
//! Precedence, highest to lowest: a matching denylist glob always skips the
//! tool; otherwise a matching allowlist glob always allows it; otherwise the
//! tool's configured [`Permission`] governs; only once a tool is left at
//! `ask` does the session-wide `auto_approve` flag get a say. This resolves
//! a tension in the upstream design between its literal check order (which
//! tests `auto_approve` first, unconditionally) and its own stated
//! invariant that a `never` permission must dominate even when
//! `auto_approve` is set — see DESIGN.md §6.

use globset::Glob;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Always,
    Ask,
    Never,
}

#[derive(Debug, Clone, Default)]
pub struct ApprovalPolicy {
    pub auto_approve: bool,
    /// Per-tool base permission; tools absent here default to `Ask`.
    pub tool_permissions: std::collections::HashMap<String, Permission>,
    /// Glob patterns matched against `"{tool_name} {arg_summary}"` or just
    /// `tool_name` when no summary applies; a match always skips the tool.
    pub denylist: Vec<String>,
    /// Glob patterns that, absent a denylist match, always allow the tool.
    pub allowlist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolDecision {
    Execute,
    AskUser,
    Skip,
}

impl ApprovalPolicy {
    fn matches_any(patterns: &[String], subject: &str) -> bool {
        patterns.iter().any(|pattern| {
            Glob::new(pattern)
                .map(|g| g.compile_matcher().is_match(subject))
                .unwrap_or(false)
        })
    }

    /// Resolve what should happen for `tool_name` given an optional
    /// glob-match subject (usually `tool_name` itself, or
    /// `"{tool_name} {first_arg}"` for tools like `task` that key allowlist
    /// entries off their target subagent).
    pub fn resolve(&self, tool_name: &str, match_subject: &str) -> ToolDecision {
        if Self::matches_any(&self.denylist, match_subject)
            || Self::matches_any(&self.denylist, tool_name)
        {
            return ToolDecision::Skip;
        }
        if Self::matches_any(&self.allowlist, match_subject)
            || Self::matches_any(&self.allowlist, tool_name)
        {
            return ToolDecision::Execute;
        }

        let permission = self
            .tool_permissions
            .get(tool_name)
            .copied()
            .unwrap_or(Permission::Ask);

        match permission {
            Permission::Never => ToolDecision::Skip,
            Permission::Always => ToolDecision::Execute,
            Permission::Ask => {
                if self.auto_approve {
                    ToolDecision::Execute
                } else {
                    ToolDecision::AskUser
                }
            }
        }
    }
}

/// A tool may override the policy's decision for its own call (e.g. `task`
/// pre-approving a narrow allowlist of subagent targets).
pub trait PermissionOverride {
    fn resolve_permission(&self, args: &serde_json::Value) -> Option<Permission>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(auto_approve: bool, permission: Permission) -> ApprovalPolicy {
        let mut tool_permissions = std::collections::HashMap::new();
        tool_permissions.insert("write_file".to_string(), permission);
        ApprovalPolicy { auto_approve, tool_permissions, denylist: vec![], allowlist: vec![] }
    }

    #[test]
    fn never_permission_dominates_auto_approve() {
        let p = policy(true, Permission::Never);
        assert_eq!(p.resolve("write_file", "write_file"), ToolDecision::Skip);
    }

    #[test]
    fn ask_permission_short_circuited_by_auto_approve() {
        let p = policy(true, Permission::Ask);
        assert_eq!(p.resolve("write_file", "write_file"), ToolDecision::Execute);
    }

    #[test]
    fn ask_permission_without_auto_approve_prompts() {
        let p = policy(false, Permission::Ask);
        assert_eq!(p.resolve("write_file", "write_file"), ToolDecision::AskUser);
    }

    #[test]
    fn denylist_dominates_allowlist_and_always_permission() {
        let mut p = policy(false, Permission::Always);
        p.denylist.push("write_file".to_string());
        p.allowlist.push("write_file".to_string());
        assert_eq!(p.resolve("write_file", "write_file"), ToolDecision::Skip);
    }

    #[test]
    fn allowlist_executes_even_for_never_base_permission_tool() {
        let mut p = policy(false, Permission::Never);
        // explicit allowlist entries are a deliberate operator override and
        // win over a base `never` permission that has no matching denylist.
        p.allowlist.push("task explore".to_string());
        assert_eq!(p.resolve("task", "task explore"), ToolDecision::Execute);
    }
}
