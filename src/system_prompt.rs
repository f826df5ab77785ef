// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! System prompt assembly (C15): a static preamble plus config-gated
//! sections, the way [`crate::agent::middleware`]'s reminder injection
//! assembles its text from the pieces that are actually active.

use chrono::Utc;

use crate::config::ResolvedConfig;

const PREAMBLE: &str = "You are codi, an interactive coding assistant. You help the user read, \
understand, and change code in their project by calling the tools available to you. Be direct \
and concise; prefer taking the next concrete action over describing what you would do.";

pub struct SystemPromptInputs<'a> {
    pub workspace_root: &'a str,
    pub project_context: Option<&'a str>,
    pub model_name: &'a str,
    pub commit_signature: Option<&'a str>,
    pub enabled_tool_names: &'a [String],
}

/// Build the system prompt for one session from the static preamble plus
/// whichever optional sections the config enables. Section order is fixed
/// so the same config always produces the same prompt, byte for byte.
pub fn build_system_prompt(config: &ResolvedConfig, inputs: &SystemPromptInputs<'_>) -> String {
    let mut sections = vec![PREAMBLE.to_string()];

    sections.push(format!("## Working directory\n{}", inputs.workspace_root));

    if config.include_project_context {
        if let Some(context) = inputs.project_context {
            sections.push(format!("## Project context\n{context}"));
        }
    }

    if config.include_prompt_detail {
        sections.push(format!(
            "## Available tools\n{}",
            inputs.enabled_tool_names.join(", ")
        ));
    }

    if config.include_model_info {
        sections.push(format!("## Model\n{}", inputs.model_name));
    }

    if config.include_commit_signature {
        if let Some(signature) = inputs.commit_signature {
            sections.push(format!("## Commit signature\n{signature}"));
        }
    }

    sections.push(format!("## Current time\n{}", Utc::now().to_rfc3339()));

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omits_disabled_sections() {
        let mut config = ResolvedConfig::default();
        config.include_project_context = false;
        config.include_prompt_detail = false;
        config.include_model_info = false;
        config.include_commit_signature = false;

        let inputs = SystemPromptInputs {
            workspace_root: "/tmp/project",
            project_context: Some("a Rust crate"),
            model_name: "claude-sonnet-4-5",
            commit_signature: Some("Co-authored-by: codi"),
            enabled_tool_names: &["grep".to_string()],
        };
        let prompt = build_system_prompt(&config, &inputs);
        assert!(!prompt.contains("Project context"));
        assert!(!prompt.contains("Available tools"));
        assert!(!prompt.contains("## Model"));
        assert!(!prompt.contains("Commit signature"));
        assert!(prompt.contains("/tmp/project"));
    }

    #[test]
    fn includes_enabled_sections_in_fixed_order() {
        let config = ResolvedConfig::default();
        let inputs = SystemPromptInputs {
            workspace_root: "/tmp/project",
            project_context: Some("a Rust crate"),
            model_name: "claude-sonnet-4-5",
            commit_signature: None,
            enabled_tool_names: &["grep".to_string(), "read_file".to_string()],
        };
        let prompt = build_system_prompt(&config, &inputs);
        let context_pos = prompt.find("Project context").unwrap();
        let tools_pos = prompt.find("Available tools").unwrap();
        let model_pos = prompt.find("## Model").unwrap();
        assert!(context_pos < tools_pos && tools_pos < model_pos);
    }
}
