// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `/proxy-setup` routing and proxy env-file editing (§9 design note,
//! supplemented per SPEC_FULL.md §11). This is the one narrow prompt prefix
//! the agent loop intercepts before ever calling the backend; no other
//! prefix gets special treatment.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const SUPPORTED_PROXY_VARS: &[&str] =
    &["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY", "ALL_PROXY"];

#[derive(Debug, Error)]
pub enum ProxySetupError {
    #[error("unsupported proxy variable: {0}")]
    UnsupportedVar(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed `/proxy-setup` prompt. `Show` has no arguments; `Set`/`Unset`
/// name one of [`SUPPORTED_PROXY_VARS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxyCommand {
    Show,
    Set { var: String, value: String },
    Unset { var: String },
}

/// Recognise a `/proxy-setup ...` prompt; returns `None` for anything else,
/// so the agent loop's prefix check stays this single narrow case.
pub fn parse_proxy_command(prompt: &str) -> Option<ProxyCommand> {
    let rest = prompt.strip_prefix("/proxy-setup")?.trim();
    if rest.is_empty() {
        return Some(ProxyCommand::Show);
    }
    let mut parts = rest.splitn(2, char::is_whitespace);
    let action = parts.next().unwrap_or_default();
    let argument = parts.next().unwrap_or_default().trim();
    match action {
        "set" => {
            let mut kv = argument.splitn(2, '=');
            let var = kv.next().unwrap_or_default().trim().to_uppercase();
            let value = kv.next().unwrap_or_default().trim().to_string();
            Some(ProxyCommand::Set { var, value })
        }
        "unset" => Some(ProxyCommand::Unset { var: argument.to_uppercase() }),
        _ => Some(ProxyCommand::Show),
    }
}

fn check_supported(var: &str) -> Result<(), ProxySetupError> {
    if SUPPORTED_PROXY_VARS.contains(&var) {
        Ok(())
    } else {
        Err(ProxySetupError::UnsupportedVar(var.to_string()))
    }
}

/// Read the current values of every supported proxy variable from the
/// proxy env file (missing file reads as all-unset).
pub fn get_current_proxy_settings(env_file: &Path) -> HashMap<String, Option<String>> {
    let values = dotenvy::from_path_iter(env_file)
        .map(|iter| iter.filter_map(Result::ok).collect::<HashMap<_, _>>())
        .unwrap_or_default();
    SUPPORTED_PROXY_VARS
        .iter()
        .map(|&var| (var.to_string(), values.get(var).cloned()))
        .collect()
}

/// Rewrite the proxy env file with `var=value` set, preserving every other
/// supported variable already present.
pub fn set_proxy_var(env_file: &Path, var: &str, value: &str) -> Result<(), ProxySetupError> {
    check_supported(var)?;
    let mut current = get_current_proxy_settings(env_file);
    current.insert(var.to_string(), Some(value.to_string()));
    write_env_file(env_file, &current)
}

/// Remove `var` from the proxy env file, preserving every other supported
/// variable already present.
pub fn unset_proxy_var(env_file: &Path, var: &str) -> Result<(), ProxySetupError> {
    check_supported(var)?;
    let mut current = get_current_proxy_settings(env_file);
    current.insert(var.to_string(), None);
    write_env_file(env_file, &current)
}

fn write_env_file(env_file: &Path, values: &HashMap<String, Option<String>>) -> Result<(), ProxySetupError> {
    let mut contents = String::new();
    for var in SUPPORTED_PROXY_VARS {
        if let Some(Some(value)) = values.get(*var) {
            contents.push_str(&format!("{var}={value}\n"));
        }
    }
    if let Some(parent) = env_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(env_file, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_set_and_unset_and_show() {
        assert_eq!(parse_proxy_command("/proxy-setup"), Some(ProxyCommand::Show));
        assert_eq!(
            parse_proxy_command("/proxy-setup set http_proxy=http://localhost:8080"),
            Some(ProxyCommand::Set {
                var: "HTTP_PROXY".into(),
                value: "http://localhost:8080".into()
            })
        );
        assert_eq!(
            parse_proxy_command("/proxy-setup unset http_proxy"),
            Some(ProxyCommand::Unset { var: "HTTP_PROXY".into() })
        );
        assert_eq!(parse_proxy_command("hello"), None);
    }

    #[test]
    fn set_then_get_round_trips_and_unset_clears() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".proxy.env");
        set_proxy_var(&env_file, "HTTP_PROXY", "http://localhost:8080").unwrap();
        let current = get_current_proxy_settings(&env_file);
        assert_eq!(current.get("HTTP_PROXY").unwrap().as_deref(), Some("http://localhost:8080"));

        unset_proxy_var(&env_file, "HTTP_PROXY").unwrap();
        let current = get_current_proxy_settings(&env_file);
        assert_eq!(current.get("HTTP_PROXY").unwrap(), &None);
    }

    #[test]
    fn unknown_var_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env_file = dir.path().join(".proxy.env");
        assert!(set_proxy_var(&env_file, "FTP_PROXY", "x").is_err());
    }
}
