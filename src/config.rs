// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration (§6): model/provider tables, tool permissions, agent
//! filters, session logging, and the system-prompt toggles, loaded from a
//! project-local TOML file merged over built-in defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::approval::Permission;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to parse config file {path}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Command-line overrides layered on top of the file-loaded config. Mirrors
/// `main.rs`'s CLI flags one-to-one.
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub endpoint_id: Option<String>,
    pub no_tools: Option<bool>,
    pub compress: Option<bool>,
    pub summarize_provider: Option<String>,
    pub summarize_model: Option<String>,
    pub session: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub provider: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub adaptive: bool,
    #[serde(default)]
    pub max_context_tokens: u64,
    #[serde(default)]
    pub input_cost_per_million: f64,
    #[serde(default)]
    pub output_cost_per_million: f64,
    #[serde(default)]
    pub cache_write_cost_per_million: f64,
    #[serde(default)]
    pub cache_read_cost_per_million: f64,
}

fn default_temperature() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEntry {
    #[serde(default = "default_permission")]
    pub permission: Permission,
    #[serde(default)]
    pub allowlist: Vec<String>,
    #[serde(default)]
    pub denylist: Vec<String>,
}

fn default_permission() -> Permission {
    Permission::Ask
}

impl Default for ToolEntry {
    fn default() -> Self {
        Self { permission: Permission::Ask, allowlist: Vec::new(), denylist: Vec::new() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SessionLoggingConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
}

fn default_true() -> bool {
    true
}

fn default_session_prefix() -> String {
    "session".to_string()
}

/// Everything the core recognises, after CLI overrides and file contents
/// have been merged (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConfig {
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    #[serde(default)]
    pub models: Vec<ModelEntry>,
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,
    #[serde(default)]
    pub auto_compact_threshold: u64,
    #[serde(default = "default_true")]
    pub context_warnings: bool,
    #[serde(default = "default_api_timeout")]
    pub api_timeout_secs: u64,
    #[serde(default)]
    pub enabled_tools: Option<Vec<String>>,
    #[serde(default)]
    pub tools: HashMap<String, ToolEntry>,
    #[serde(default)]
    pub enabled_agents: Option<Vec<String>>,
    #[serde(default)]
    pub disabled_agents: Vec<String>,
    #[serde(default)]
    pub agent_paths: Vec<PathBuf>,
    #[serde(default)]
    pub session_logging: SessionLoggingConfig,
    #[serde(default)]
    pub include_project_context: bool,
    #[serde(default)]
    pub include_prompt_detail: bool,
    #[serde(default = "default_true")]
    pub include_model_info: bool,
    #[serde(default)]
    pub include_commit_signature: bool,
}

fn default_api_timeout() -> u64 {
    120
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: None,
            base_url: None,
            models: Vec::new(),
            providers: Vec::new(),
            auto_compact_threshold: 150_000,
            context_warnings: true,
            api_timeout_secs: default_api_timeout(),
            enabled_tools: None,
            tools: HashMap::new(),
            enabled_agents: None,
            disabled_agents: Vec::new(),
            agent_paths: Vec::new(),
            session_logging: SessionLoggingConfig {
                enabled: true,
                save_dir: None,
                session_prefix: default_session_prefix(),
            },
            include_project_context: true,
            include_prompt_detail: true,
            include_model_info: true,
            include_commit_signature: false,
        }
    }
}

const CONFIG_FILE_NAME: &str = "codi.toml";

fn apply_cli_overrides(mut config: ResolvedConfig, cli: CliOptions) -> ResolvedConfig {
    if let Some(provider) = cli.provider {
        config.provider = provider;
    }
    if let Some(model) = cli.model {
        config.model = Some(model);
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = Some(base_url);
    }
    if cli.no_tools == Some(true) {
        config.enabled_tools = Some(Vec::new());
    }
    config
}

/// Load `<workspace_root>/codi.toml` if present, merge CLI overrides on top.
/// A missing file is not an error; defaults are used.
pub fn load_config(workspace_root: &Path, cli: CliOptions) -> Result<ResolvedConfig, ConfigError> {
    let path = workspace_root.join(CONFIG_FILE_NAME);
    let base = if path.exists() {
        let text = std::fs::read_to_string(&path)
            .map_err(|source| ConfigError::Read { path: path.clone(), source })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse { path, source })?
    } else {
        ResolvedConfig::default()
    };
    Ok(apply_cli_overrides(base, cli))
}

pub fn init_config(workspace_root: &Path, contents: Option<&ResolvedConfig>) -> Result<PathBuf, ConfigError> {
    let path = workspace_root.join(CONFIG_FILE_NAME);
    let config = contents.cloned().unwrap_or_default();
    std::fs::write(&path, toml::to_string_pretty(&config)?)?;
    Ok(path)
}

pub fn get_example_config() -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    config.models.push(ModelEntry {
        name: "claude-sonnet-4-5".to_string(),
        provider: "anthropic".to_string(),
        alias: Some("sonnet".to_string()),
        temperature: 1.0,
        adaptive: false,
        max_context_tokens: 200_000,
        input_cost_per_million: 3.0,
        output_cost_per_million: 15.0,
        cache_write_cost_per_million: 3.75,
        cache_read_cost_per_million: 0.3,
    });
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), CliOptions::default()).unwrap();
        assert_eq!(config.provider, "anthropic");
    }

    #[test]
    fn cli_model_overrides_file_value() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "provider = \"openai\"\nmodel = \"gpt\"\n")
            .unwrap();
        let cli = CliOptions { model: Some("o3".to_string()), ..Default::default() };
        let config = load_config(dir.path(), cli).unwrap();
        assert_eq!(config.provider, "openai");
        assert_eq!(config.model.as_deref(), Some("o3"));
    }

    #[test]
    fn no_tools_flag_empties_enabled_tools() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliOptions { no_tools: Some(true), ..Default::default() };
        let config = load_config(dir.path(), cli).unwrap();
        assert_eq!(config.enabled_tools, Some(Vec::new()));
    }
}
