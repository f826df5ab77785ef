// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! `task`: delegate a bounded piece of work to a subagent (C11). Spawns a
//! fresh [`Agent`] scoped to one named subagent profile, nested under the
//! caller's own session directory, and relays its output back as one tool
//! result.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;

use crate::agent::approval::{ApprovalPolicy, Permission};
use crate::agent::events::AgentEvent;
use crate::agent::profiles::{self, AgentProfile, AgentType};
use crate::agent::{Agent, AgentConfig, AgentOptions};
use crate::providers::BoxedBackend;
use crate::telemetry::TelemetrySink;
use crate::tools::base::{InvokeContext, Tool, ToolOutcome, ToolYield};
use crate::tools::format::render_result_text;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct TaskArgs {
    agent: String,
    task: String,
}

/// Everything a spawned subagent needs that it can't get from its own
/// [`InvokeContext`] (which only carries the parent's session directory and
/// callbacks).
pub struct TaskHandler {
    backend: BoxedBackend,
    tool_registry: Arc<ToolRegistry>,
    system_prompt: String,
    config: AgentConfig,
    working_directory: PathBuf,
    telemetry: Arc<dyn TelemetrySink>,
    subagents: HashMap<String, AgentProfile>,
}

impl TaskHandler {
    pub fn new(
        backend: BoxedBackend,
        tool_registry: Arc<ToolRegistry>,
        system_prompt: String,
        config: AgentConfig,
        working_directory: PathBuf,
        telemetry: Arc<dyn TelemetrySink>,
        subagents: HashMap<String, AgentProfile>,
    ) -> Self {
        Self { backend, tool_registry, system_prompt, config, working_directory, telemetry, subagents }
    }

    /// Convenience constructor pulling the builtin `explore` profile (and
    /// any other builtin [`AgentType::Subagent`] entries) as the delegation
    /// targets.
    pub fn with_builtin_subagents(
        backend: BoxedBackend,
        tool_registry: Arc<ToolRegistry>,
        system_prompt: String,
        config: AgentConfig,
        working_directory: PathBuf,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let subagents = profiles::builtin_profiles()
            .into_iter()
            .filter(|p| p.agent_type == AgentType::Subagent)
            .map(|p| (p.name.clone(), p))
            .collect();
        Self::new(backend, tool_registry, system_prompt, config, working_directory, telemetry, subagents)
    }

    fn build_policy_and_registry(&self, profile: &AgentProfile) -> (ApprovalPolicy, Arc<ToolRegistry>) {
        let mut table = toml::Table::new();
        profiles::deep_merge(&mut table, &profile.overrides);

        let mut policy = ApprovalPolicy::default();
        if let Some(auto_approve) = table.get("auto_approve").and_then(toml::Value::as_bool) {
            policy.auto_approve = auto_approve;
        }

        let registry = match table.get("enabled_tools").and_then(toml::Value::as_array) {
            Some(enabled) => {
                let names: Vec<String> =
                    enabled.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
                Arc::new(self.tool_registry.filtered(&names))
            }
            None => self.tool_registry.clone(),
        };

        (policy, registry)
    }
}

#[async_trait::async_trait]
impl Tool for TaskHandler {
    fn name(&self) -> &str {
        "task"
    }

    fn description(&self) -> &str {
        "Delegate a bounded research or editing task to a named subagent and return its final response."
    }

    fn args_schema(&self) -> serde_json::Value {
        let names: Vec<&str> = self.subagents.keys().map(String::as_str).collect();
        serde_json::json!({
            "type": "object",
            "properties": {
                "agent": {"type": "string", "enum": names},
                "task": {"type": "string"}
            },
            "required": ["agent", "task"]
        })
    }

    /// `explore` is pre-approved by default since it's read-only; every
    /// other subagent target still goes through the caller's normal
    /// approval resolution.
    fn resolve_permission(&self, args: &serde_json::Value) -> Option<Permission> {
        if args.get("agent").and_then(serde_json::Value::as_str) == Some("explore") {
            Some(Permission::Always)
        } else {
            None
        }
    }

    async fn invoke(&self, ctx: InvokeContext, args: serde_json::Value) -> BoxStream<'static, ToolYield> {
        let args: TaskArgs = match serde_json::from_value(args) {
            Ok(args) => args,
            Err(err) => {
                return Box::pin(stream! {
                    yield ToolYield::Terminal(ToolOutcome::Error(format!("invalid arguments: {err}")));
                });
            }
        };

        let Some(profile) = self.subagents.get(&args.agent).cloned() else {
            let message = format!("unknown subagent: {}", args.agent);
            return Box::pin(stream! { yield ToolYield::Terminal(ToolOutcome::Error(message)); });
        };

        let (approval_policy, tool_registry) = self.build_policy_and_registry(&profile);
        let system_prompt = format!(
            "{}\n\nYou are operating as a delegated '{}' subagent. Complete the following task and \
             report back concisely:\n{}",
            self.system_prompt, profile.name, args.task
        );

        let options = AgentOptions {
            backend: self.backend.clone(),
            tool_registry,
            approval_policy,
            system_prompt,
            config: self.config.clone(),
            session_save_dir: ctx.session_dir.join("agents"),
            session_prefix: profile.name.clone(),
            working_directory: self.working_directory.clone(),
            telemetry: self.telemetry.clone(),
            profile_manager: None,
            active_profile: profile.name.clone(),
            max_context_tokens: None,
            approval_callback: ctx.approval_callback.clone(),
            user_input_callback: ctx.user_input_callback.clone(),
            sampling_callback: ctx.sampling_callback.clone(),
        };

        let agent_name = args.agent.clone();
        let task = args.task.clone();

        Box::pin(stream! {
            let mut agent = match Agent::new(options) {
                Ok(agent) => agent,
                Err(err) => {
                    yield ToolYield::Terminal(ToolOutcome::Error(format!("failed to start subagent: {err}")));
                    return;
                }
            };

            let mut response = String::new();
            let mut completed = true;
            let mut failed: Option<String> = None;

            {
                let mut events = agent.act(task.clone());
                while let Some(event) = events.next().await {
                    match event {
                        Ok(AgentEvent::Assistant(assistant)) => {
                            response.push_str(&assistant.content);
                            if assistant.stopped_by_middleware {
                                completed = false;
                            }
                        }
                        Ok(AgentEvent::ToolResult(result)) => {
                            let chunk = match &result.outcome {
                                crate::agent::events::ToolResultOutcome::Result { content } => {
                                    format!("[{}] {}", result.tool_name, content)
                                }
                                crate::agent::events::ToolResultOutcome::Error { message } => {
                                    format!("[{}] error: {}", result.tool_name, message)
                                }
                                crate::agent::events::ToolResultOutcome::Skipped { reason } => {
                                    format!("[{}] skipped: {}", result.tool_name, reason)
                                }
                            };
                            yield ToolYield::Stream(chunk);
                        }
                        Ok(_) => {}
                        Err(err) => {
                            failed = Some(err.to_string());
                            completed = false;
                            break;
                        }
                    }
                }
            }

            if let Some(message) = failed {
                yield ToolYield::Terminal(ToolOutcome::Error(format!("subagent '{agent_name}' failed: {message}")));
                return;
            }

            let turns_used = agent
                .history()
                .iter()
                .filter(|m| m.role == crate::types::Role::Assistant)
                .count();

            let text = render_result_text(&[
                ("agent", agent_name),
                ("task", task),
                ("completed", completed.to_string()),
                ("turns_used", turns_used.to_string()),
                ("response", response),
            ]);
            yield ToolYield::Terminal(ToolOutcome::Result(text));
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_permission_only_pre_approves_explore() {
        let handler = TaskHandler::with_builtin_subagents(
            dummy_backend(),
            Arc::new(ToolRegistry::new()),
            "sys".to_string(),
            AgentConfig::default(),
            std::env::temp_dir(),
            Arc::new(crate::telemetry::NullTelemetryClient),
        );
        assert_eq!(
            handler.resolve_permission(&serde_json::json!({"agent": "explore", "task": "x"})),
            Some(Permission::Always)
        );
        assert_eq!(
            handler.resolve_permission(&serde_json::json!({"agent": "other", "task": "x"})),
            None
        );
    }

    fn dummy_backend() -> BoxedBackend {
        use crate::providers::{
            BackendError, CompletionRequest, CompletionResponse, ModelConfig, ProviderKind,
        };
        use crate::types::LlmChunk;

        struct Dummy(ModelConfig);

        #[async_trait::async_trait]
        impl crate::providers::Backend for Dummy {
            async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
                unreachable!("not exercised in this test")
            }
            async fn complete_streaming(
                &self,
                _request: CompletionRequest,
            ) -> Result<BoxStream<'static, Result<LlmChunk, BackendError>>, BackendError> {
                unreachable!("not exercised in this test")
            }
            async fn count_tokens(&self, _messages: &[crate::types::Message]) -> Result<u64, BackendError> {
                unreachable!("not exercised in this test")
            }
            fn model(&self) -> &ModelConfig {
                &self.0
            }
        }

        Arc::new(Dummy(ModelConfig {
            name: "dummy".to_string(),
            provider: ProviderKind::Anthropic,
            default_temperature: 1.0,
            max_context_tokens: 100_000,
            adaptive: false,
            input_cost_per_million: 0.0,
            output_cost_per_million: 0.0,
            cache_write_cost_per_million: 0.0,
            cache_read_cost_per_million: 0.0,
        }))
    }
}
