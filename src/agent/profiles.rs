// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent profiles: named config-override bundles (C9).
//!
//! Profiles are deep-merged onto the base config: nested tables recurse,
//! everything else (including lists) replaces wholesale. That's not a
//! special-cased "lists replace" rule, it's just what falls out of a merge
//! that only recurses on table-typed values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Safety {
    Neutral,
    Safe,
    Destructive,
    Yolo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Agent,
    Subagent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub safety: Safety,
    pub agent_type: AgentType,
    #[serde(default)]
    pub overrides: toml::Table,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("unknown agent profile: {0}")]
    NotFound(String),
    #[error("profile '{0}' is not a subagent profile")]
    NotSubagent(String),
    #[error("failed to parse profile file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn overrides(pairs: &[(&str, toml::Value)]) -> toml::Table {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn tool_list(tools: &[&str]) -> toml::Value {
    toml::Value::Array(tools.iter().map(|t| toml::Value::String(t.to_string())).collect())
}

pub fn builtin_profiles() -> Vec<AgentProfile> {
    vec![
        AgentProfile {
            name: "default".into(),
            display_name: "Default".into(),
            description: "No overrides; full tool access with the configured approval policy."
                .into(),
            safety: Safety::Neutral,
            agent_type: AgentType::Agent,
            overrides: toml::Table::new(),
        },
        AgentProfile {
            name: "plan".into(),
            display_name: "Plan".into(),
            description: "Research and propose a plan without making changes.".into(),
            safety: Safety::Safe,
            agent_type: AgentType::Agent,
            overrides: overrides(&[
                ("auto_approve", toml::Value::Boolean(true)),
                (
                    "enabled_tools",
                    tool_list(&["grep", "read_file", "todo", "ask_user_question", "task"]),
                ),
            ]),
        },
        AgentProfile {
            name: "chat".into(),
            display_name: "Chat".into(),
            description: "Conversational, read-only mode for discussion and explanation.".into(),
            safety: Safety::Safe,
            agent_type: AgentType::Agent,
            overrides: overrides(&[
                ("auto_approve", toml::Value::Boolean(true)),
                ("enabled_tools", tool_list(&["grep", "read_file", "ask_user_question", "task"])),
            ]),
        },
        AgentProfile {
            name: "accept-edits".into(),
            display_name: "Accept Edits".into(),
            description: "Auto-approve file edits only; everything else still asks.".into(),
            safety: Safety::Destructive,
            agent_type: AgentType::Agent,
            overrides: overrides(&[(
                "tools",
                toml::Value::Table(
                    [
                        (
                            "write_file".to_string(),
                            toml::Value::Table(
                                [("permission".to_string(), toml::Value::String("always".into()))]
                                    .into_iter()
                                    .collect(),
                            ),
                        ),
                        (
                            "search_replace".to_string(),
                            toml::Value::Table(
                                [("permission".to_string(), toml::Value::String("always".into()))]
                                    .into_iter()
                                    .collect(),
                            ),
                        ),
                    ]
                    .into_iter()
                    .collect(),
                ),
            )]),
        },
        AgentProfile {
            name: "auto-approve".into(),
            display_name: "Auto Approve".into(),
            description: "Auto-approve every tool call. Use with care.".into(),
            safety: Safety::Yolo,
            agent_type: AgentType::Agent,
            overrides: overrides(&[("auto_approve", toml::Value::Boolean(true))]),
        },
        AgentProfile {
            name: "explore".into(),
            display_name: "Explore".into(),
            description: "Read-only subagent for the task tool to delegate research to.".into(),
            safety: Safety::Safe,
            agent_type: AgentType::Subagent,
            overrides: overrides(&[
                ("auto_approve", toml::Value::Boolean(true)),
                ("enabled_tools", tool_list(&["grep", "read_file"])),
            ]),
        },
    ]
}

/// Recursively merge `patch` onto `base`: tables recurse key by key,
/// anything else (scalars, arrays) in `patch` replaces the value in `base`.
pub fn deep_merge(base: &mut toml::Table, patch: &toml::Table) {
    for (key, patch_value) in patch {
        match (base.get_mut(key), patch_value) {
            (Some(toml::Value::Table(base_table)), toml::Value::Table(patch_table)) => {
                deep_merge(base_table, patch_table);
            }
            _ => {
                base.insert(key.clone(), patch_value.clone());
            }
        }
    }
}

pub struct AgentProfileManager {
    profiles: HashMap<String, AgentProfile>,
    order: Vec<String>,
    enabled_agents: Option<Vec<String>>,
    disabled_agents: Vec<String>,
    active: String,
}

impl AgentProfileManager {
    pub fn new(search_paths: &[PathBuf]) -> Result<Self, ProfileError> {
        let mut profiles = HashMap::new();
        let mut order = Vec::new();
        for profile in builtin_profiles() {
            order.push(profile.name.clone());
            profiles.insert(profile.name.clone(), profile);
        }

        for dir in search_paths {
            if !dir.is_dir() {
                continue;
            }
            let mut custom_names = Vec::new();
            for entry in std::fs::read_dir(dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("toml") {
                    continue;
                }
                let profile = load_profile_file(&path)?;
                let is_new = !profiles.contains_key(&profile.name);
                if is_new {
                    custom_names.push(profile.name.clone());
                }
                profiles.insert(profile.name.clone(), profile);
            }
            custom_names.sort();
            for name in custom_names {
                order.push(name);
            }
        }

        Ok(Self {
            profiles,
            order,
            enabled_agents: None,
            disabled_agents: Vec::new(),
            active: "default".to_string(),
        })
    }

    pub fn set_filters(&mut self, enabled: Option<Vec<String>>, disabled: Vec<String>) {
        self.enabled_agents = enabled;
        self.disabled_agents = disabled;
    }

    fn is_visible(&self, name: &str) -> bool {
        match &self.enabled_agents {
            Some(enabled) => enabled.iter().any(|n| n == name),
            None => !self.disabled_agents.iter().any(|n| n == name),
        }
    }

    pub fn get_agent(&self, name: &str) -> Result<&AgentProfile, ProfileError> {
        let profile = self.profiles.get(name).ok_or_else(|| ProfileError::NotFound(name.to_string()))?;
        if !self.is_visible(name) {
            return Err(ProfileError::NotFound(name.to_string()));
        }
        Ok(profile)
    }

    pub fn get_subagent(&self, name: &str) -> Result<&AgentProfile, ProfileError> {
        let profile = self.get_agent(name)?;
        if profile.agent_type != AgentType::Subagent {
            return Err(ProfileError::NotSubagent(name.to_string()));
        }
        Ok(profile)
    }

    pub fn register_agent(&mut self, profile: AgentProfile) {
        if !self.profiles.contains_key(&profile.name) {
            self.order.push(profile.name.clone());
        }
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn active_profile(&self) -> &str {
        &self.active
    }

    pub fn switch_profile(&mut self, name: &str) -> Result<&AgentProfile, ProfileError> {
        let profile = self.get_agent(name)?;
        self.active = name.to_string();
        Ok(profile)
    }

    /// Fixed builtin ordering followed by custom profiles alphabetically;
    /// subagents never appear (they're only reachable via `task`).
    pub fn get_agent_order(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|name| self.is_visible(name))
            .filter_map(|name| self.profiles.get(name.as_str()))
            .filter(|p| p.agent_type == AgentType::Agent)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn next_agent(&self) -> Option<&str> {
        let order = self.get_agent_order();
        let position = order.iter().position(|name| *name == self.active)?;
        order.get((position + 1) % order.len()).copied()
    }
}

fn load_profile_file(path: &Path) -> Result<AgentProfile, ProfileError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|source| ProfileError::Parse { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_profiles_include_chat() {
        let profiles = builtin_profiles();
        assert!(profiles.iter().any(|p| p.name == "chat"));
    }

    #[test]
    fn deep_merge_recurses_tables_but_replaces_lists() {
        let mut base: toml::Table = toml::from_str(
            "enabled_tools = [\"a\", \"b\"]\n[tools.write_file]\npermission = \"ask\"\n",
        )
        .unwrap();
        let patch: toml::Table = toml::from_str(
            "enabled_tools = [\"c\"]\n[tools.write_file]\npermission = \"always\"\n",
        )
        .unwrap();
        deep_merge(&mut base, &patch);

        assert_eq!(
            base.get("enabled_tools").unwrap().as_array().unwrap().len(),
            1
        );
        let write_file = base.get("tools").unwrap().get("write_file").unwrap();
        assert_eq!(write_file.get("permission").unwrap().as_str(), Some("always"));
    }

    #[test]
    fn manager_allowlist_dominates_denylist() {
        let mut manager = AgentProfileManager::new(&[]).unwrap();
        manager.set_filters(Some(vec!["default".to_string()]), vec!["default".to_string()]);
        assert!(manager.get_agent("default").is_ok());
        assert!(manager.get_agent("plan").is_err());
    }

    #[test]
    fn get_subagent_rejects_non_subagent_profile() {
        let manager = AgentProfileManager::new(&[]).unwrap();
        assert!(manager.get_subagent("plan").is_err());
        assert!(manager.get_subagent("explore").is_ok());
    }
}
