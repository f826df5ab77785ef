// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session logger and loader (C10): one directory per session holding an
//! append-only `messages.jsonl` and a `meta.json` snapshot.

use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::{Message, Role};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize session data: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsSnapshot {
    pub steps: u64,
    pub session_prompt_tokens: u64,
    pub session_completion_tokens: u64,
    pub tool_calls_agreed: u64,
    pub tool_calls_rejected: u64,
    #[serde(default)]
    pub tool_calls_failed: u64,
    #[serde(default)]
    pub tool_calls_succeeded: u64,
    pub session_cost: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMetadata {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub environment: EnvironmentInfo,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub stats: StatsSnapshot,
    pub total_messages: usize,
    #[serde(default)]
    pub agent_profile: Option<String>,
    #[serde(default)]
    pub tool_states: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentInfo {
    pub working_directory: PathBuf,
}

const MESSAGES_FILE: &str = "messages.jsonl";
const META_FILE: &str = "meta.json";

/// Append-only writer for one session's directory. Each `save()` call
/// rewrites `messages.jsonl` with the full current history and `meta.json`
/// with a fresh snapshot -- the simplest correct option, since history
/// length is bounded by compaction (§5).
pub struct SessionLogger {
    dir: PathBuf,
    session_id: String,
    start_time: DateTime<Utc>,
    working_directory: PathBuf,
}

impl SessionLogger {
    /// Create a new session directory named
    /// `<prefix>_<YYYYMMDD>_<HHMMSS>_<8 lowercase alphanumeric>`.
    pub fn create(
        save_dir: &Path,
        session_prefix: &str,
        working_directory: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        let id_suffix = short_id();
        let dir_name = format!(
            "{}_{}_{}",
            session_prefix,
            now.format("%Y%m%d_%H%M%S"),
            id_suffix
        );
        let dir = save_dir.join(dir_name);
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            session_id: Uuid::new_v4().to_string(),
            start_time: now,
            working_directory,
        })
    }

    /// Create a subagent's session directory nested under its parent's.
    pub fn create_nested(
        parent_dir: &Path,
        session_prefix: &str,
        working_directory: PathBuf,
        now: DateTime<Utc>,
    ) -> Result<Self, SessionError> {
        Self::create(&parent_dir.join("agents"), session_prefix, working_directory, now)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Rewrite `messages.jsonl` (one JSON object per line, system rows
    /// skipped) and `meta.json` from the current state.
    pub fn save(
        &self,
        messages: &[Message],
        stats: StatsSnapshot,
        agent_profile: Option<&str>,
        title: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(self.dir.join(MESSAGES_FILE))?;
        let mut persisted = 0usize;
        for message in messages {
            if message.role == Role::System {
                continue;
            }
            let line = serde_json::to_string(message)?;
            writeln!(file, "{line}")?;
            persisted += 1;
        }

        let meta = SessionMetadata {
            session_id: self.session_id.clone(),
            start_time: self.start_time,
            end_time: now,
            environment: EnvironmentInfo { working_directory: self.working_directory.clone() },
            title: title.map(str::to_string),
            stats,
            total_messages: persisted,
            agent_profile: agent_profile.map(str::to_string),
            tool_states: serde_json::Value::Null,
        };
        std::fs::write(self.dir.join(META_FILE), serde_json::to_string_pretty(&meta)?)?;
        Ok(())
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// One discovered session directory.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub dir: PathBuf,
    pub id: String,
    pub modified: std::time::SystemTime,
}

fn is_valid_session_dir(dir: &Path) -> bool {
    let messages_path = dir.join(MESSAGES_FILE);
    let Ok(contents) = std::fs::read_to_string(&messages_path) else { return false };
    let Some(first_line) = contents.lines().next() else { return false };
    if serde_json::from_str::<serde_json::Value>(first_line)
        .ok()
        .filter(serde_json::Value::is_object)
        .is_none()
    {
        return false;
    }
    let Ok(meta_contents) = std::fs::read_to_string(dir.join(META_FILE)) else { return false };
    serde_json::from_str::<serde_json::Value>(&meta_contents)
        .ok()
        .filter(serde_json::Value::is_object)
        .is_some()
}

fn trailing_id(dir_name: &str) -> Option<&str> {
    dir_name.rsplit('_').next()
}

/// Enumerate every structurally-valid session under `save_dir`, optionally
/// restricted to those whose `meta.json` records `working_directory ==
/// cwd`.
pub fn list_sessions(save_dir: &Path, cwd: Option<&Path>) -> Vec<SessionInfo> {
    let Ok(entries) = std::fs::read_dir(save_dir) else { return Vec::new() };
    let mut sessions: Vec<SessionInfo> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter(|entry| is_valid_session_dir(&entry.path()))
        .filter(|entry| {
            let Some(cwd) = cwd else { return true };
            read_metadata(&entry.path())
                .map(|meta| meta.environment.working_directory == cwd)
                .unwrap_or(false)
        })
        .filter_map(|entry| {
            let modified = entry.metadata().ok()?.modified().ok()?;
            let id = trailing_id(&entry.file_name().to_string_lossy())?.to_string();
            Some(SessionInfo { dir: entry.path(), id, modified })
        })
        .collect();
    sessions.sort_by_key(|s| std::cmp::Reverse(s.modified));
    sessions
}

/// The most recently modified valid session, if any.
pub fn find_latest_session(save_dir: &Path) -> Option<SessionInfo> {
    list_sessions(save_dir, None).into_iter().next()
}

/// Find a session by exact or unique-prefix match on its trailing id,
/// preferring the most recently modified on collision.
pub fn find_session_by_id(save_dir: &Path, id: &str) -> Option<SessionInfo> {
    list_sessions(save_dir, None)
        .into_iter()
        .filter(|s| s.id == id || s.id.starts_with(id))
        .max_by_key(|s| s.modified)
}

fn read_metadata(dir: &Path) -> Result<SessionMetadata, SessionError> {
    let contents = std::fs::read_to_string(dir.join(META_FILE))?;
    Ok(serde_json::from_str(&contents)?)
}

/// Load a session's history (system rows skipped -- a fresh system prompt
/// is regenerated on load) and metadata.
pub fn load_session(dir: &Path) -> Result<(Vec<Message>, SessionMetadata), SessionError> {
    let contents = std::fs::read_to_string(dir.join(MESSAGES_FILE))?;
    let messages = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str::<Message>)
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .filter(|m| m.role != Role::System)
        .collect();
    let metadata = read_metadata(dir)?;
    Ok((messages, metadata))
}

/// The first user row's text, newlines collapsed to spaces; canonical
/// placeholders cover the missing/empty/whitespace cases.
pub fn get_first_user_message(dir: &Path) -> String {
    const NO_MESSAGES: &str = "(no messages)";
    const EMPTY_MESSAGE: &str = "(empty message)";

    let Ok((messages, _)) = load_session(dir) else { return NO_MESSAGES.to_string() };
    let Some(first_user) = messages.iter().find(|m| m.role == Role::User) else {
        return NO_MESSAGES.to_string();
    };
    let text = first_user.text().unwrap_or_default().replace('\n', " ");
    if text.trim().is_empty() {
        EMPTY_MESSAGE.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-28T12:00:00Z").unwrap().with_timezone(&Utc)
    }

    #[test]
    fn save_then_load_preserves_non_system_messages() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::create(dir.path(), "session", dir.path().to_path_buf(), now()).unwrap();
        let messages = vec![
            Message::new(Role::System, "sys"),
            Message::new(Role::User, "hi"),
            Message::new(Role::Assistant, "hello"),
        ];
        logger.save(&messages, StatsSnapshot::default(), Some("default"), None, now()).unwrap();

        let (loaded, meta) = load_session(logger.dir()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(meta.total_messages, 2);
    }

    #[test]
    fn find_latest_session_picks_most_recently_modified() {
        let dir = tempfile::tempdir().unwrap();
        let first = SessionLogger::create(dir.path(), "session", dir.path().to_path_buf(), now()).unwrap();
        first.save(&[Message::new(Role::User, "a")], StatsSnapshot::default(), None, None, now()).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let second = SessionLogger::create(dir.path(), "session", dir.path().to_path_buf(), now()).unwrap();
        second.save(&[Message::new(Role::User, "b")], StatsSnapshot::default(), None, None, now()).unwrap();

        let latest = find_latest_session(dir.path()).unwrap();
        assert_eq!(latest.dir, second.dir());
    }

    #[test]
    fn invalid_session_dirs_are_excluded() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("session_20260101_000000_abcdefgh")).unwrap();
        assert!(list_sessions(dir.path(), None).is_empty());
    }

    #[test]
    fn get_first_user_message_reports_placeholder_for_whitespace() {
        let dir = tempfile::tempdir().unwrap();
        let logger = SessionLogger::create(dir.path(), "session", dir.path().to_path_buf(), now()).unwrap();
        logger
            .save(&[Message::new(Role::User, "   ")], StatsSnapshot::default(), None, None, now())
            .unwrap();
        assert_eq!(get_first_user_message(logger.dir()), "(empty message)");
    }
}
