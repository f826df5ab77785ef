// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The agent loop (C5): the outer per-session control loop that turns one
//! user prompt into a sequence of [`events::AgentEvent`]s, driving the
//! backend, the tool registry, the approval resolver, the middleware
//! pipeline, and session persistence.

pub mod approval;
pub mod events;
pub mod loop_detection;
pub mod message_list;
pub mod middleware;
pub mod profiles;
pub mod stats;
pub mod types;

pub use types::{AgentConfig, AgentLoopError, AgentOptions};

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_stream::stream;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use uuid::Uuid;

use crate::agent::approval::{ApprovalPolicy, ToolDecision};
use crate::agent::events::{
    AgentEvent, AssistantEvent, CancellationReason, CompactEndEvent, CompactStartEvent,
    ReasoningEvent, ToolCallEvent, ToolResultEvent, ToolResultOutcome, ToolStreamEvent,
    UserMessageEvent,
};
use crate::agent::loop_detection::{ToolCallLoopDetector, ToolCallLoopHandler};
use crate::agent::message_list::MessageList;
use crate::agent::middleware::{
    AutoCompactMiddleware, ContextWarningMiddleware, ConversationContext, MiddlewareAction,
    MiddlewarePipeline, PriceLimitMiddleware, ReadOnlyAgentMiddleware, ResetReason,
    TurnLimitMiddleware, CHAT_AGENT_EXIT, CHAT_AGENT_REMINDER, PLAN_AGENT_EXIT,
    PLAN_AGENT_REMINDER,
};
use crate::agent::profiles::{self, AgentProfile, AgentProfileManager};
use crate::agent::stats::AgentStats;
use crate::providers::{BoxedBackend, CompletionRequest, ThinkingConfig};
use crate::proxy_setup::{self, ProxyCommand};
use crate::session::{SessionLogger, StatsSnapshot};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use crate::tools::base::{
    ApprovalCallback, ApprovalDecision, InvokeContext, SamplingCallback, ToolOutcome, ToolYield,
    UserInputCallback,
};
use crate::tools::format;
use crate::tools::ToolRegistry;
use crate::types::{Content, ContentBlock, Message, Role};

/// One running agent loop: conversation state, the backend, the tool
/// registry, and everything needed to honour one profile's policy.
pub struct Agent {
    backend: BoxedBackend,
    tool_registry: Arc<ToolRegistry>,
    approval_policy: ApprovalPolicy,
    system_prompt: String,
    config: AgentConfig,
    session_logger: SessionLogger,
    session_save_dir: std::path::PathBuf,
    session_prefix: String,
    working_directory: std::path::PathBuf,
    telemetry: Arc<dyn TelemetrySink>,
    profile_manager: Option<AgentProfileManager>,
    active_profile: String,
    active_profile_name: Arc<Mutex<String>>,
    max_context_tokens: Option<u64>,
    approval_callback: Option<ApprovalCallback>,
    user_input_callback: Option<UserInputCallback>,
    sampling_callback: Option<SamplingCallback>,

    messages: MessageList,
    stats: AgentStats,
    middleware: MiddlewarePipeline,
    loop_detector: ToolCallLoopHandler,
    running: bool,
}

impl Agent {
    pub fn new(options: AgentOptions) -> Result<Self, AgentLoopError> {
        let now = Utc::now();
        let session_logger = SessionLogger::create(
            &options.session_save_dir,
            &options.session_prefix,
            options.working_directory.clone(),
            now,
        )?;

        let active_profile_name = Arc::new(Mutex::new(options.active_profile.clone()));
        let mut middleware = MiddlewarePipeline::new();
        middleware.add(Box::new(TurnLimitMiddleware { max_turns: options.config.max_turns }));
        middleware.add(Box::new(PriceLimitMiddleware { max_price: options.config.max_price }));
        middleware
            .add(Box::new(AutoCompactMiddleware { threshold: options.config.auto_compact_threshold }));
        middleware
            .add(Box::new(ContextWarningMiddleware::new(options.config.context_warning_percent)));
        {
            let flag = active_profile_name.clone();
            middleware.add(Box::new(ReadOnlyAgentMiddleware::new(
                move || flag.lock().expect("profile name lock poisoned").clone(),
                "plan",
                PLAN_AGENT_REMINDER,
                PLAN_AGENT_EXIT,
            )));
        }
        {
            let flag = active_profile_name.clone();
            middleware.add(Box::new(ReadOnlyAgentMiddleware::new(
                move || flag.lock().expect("profile name lock poisoned").clone(),
                "chat",
                CHAT_AGENT_REMINDER,
                CHAT_AGENT_EXIT,
            )));
        }

        let mut messages = MessageList::new();
        messages.insert(0, Message::new(Role::System, options.system_prompt.clone()));

        let mut agent = Self {
            backend: options.backend,
            tool_registry: options.tool_registry,
            approval_policy: options.approval_policy,
            system_prompt: options.system_prompt,
            config: options.config,
            session_logger,
            session_save_dir: options.session_save_dir,
            session_prefix: options.session_prefix,
            working_directory: options.working_directory,
            telemetry: options.telemetry,
            profile_manager: options.profile_manager,
            active_profile: options.active_profile,
            active_profile_name,
            max_context_tokens: options.max_context_tokens,
            approval_callback: options.approval_callback,
            user_input_callback: options.user_input_callback,
            sampling_callback: options.sampling_callback,
            messages,
            stats: AgentStats::create_fresh(),
            middleware,
            loop_detector: ToolCallLoopHandler::new(ToolCallLoopDetector::new(
                options.config.loop_detection_threshold.max(1),
            )),
            running: false,
        };

        let initial_profile = agent
            .profile_manager
            .as_ref()
            .and_then(|manager| manager.get_agent(&agent.active_profile).ok())
            .cloned();
        if let Some(profile) = initial_profile {
            agent.apply_profile(&profile);
        }

        agent
            .telemetry
            .emit(TelemetryEvent::NewSession { session_id: agent.session_logger.session_id().to_string() });

        Ok(agent)
    }

    pub fn session_dir(&self) -> &std::path::Path {
        self.session_logger.dir()
    }

    pub fn active_profile(&self) -> &str {
        &self.active_profile
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    pub fn history(&self) -> &[Message] {
        self.messages.as_slice()
    }

    /// Drop all history back to a bare system prompt.
    pub fn clear_history(&mut self) {
        self.messages.reset(vec![Message::new(Role::System, self.system_prompt.clone())]);
        self.stats.reset_context_state();
    }

    /// Replace history with `[system_prompt, ...messages]`, e.g. after
    /// loading a session from disk.
    pub fn reload_with_initial_messages(&mut self, messages: Vec<Message>) {
        let mut full = vec![Message::new(Role::System, self.system_prompt.clone())];
        full.extend(messages);
        self.messages.reset(full);
    }

    /// Switch the active profile: deep-merges its overrides onto the base
    /// config and rebuilds the effective tool registry / approval policy.
    pub fn switch_agent(&mut self, name: &str) -> Result<(), AgentLoopError> {
        let manager = self
            .profile_manager
            .as_mut()
            .ok_or_else(|| AgentLoopError::InvalidState("no profile manager configured".into()))?;
        let profile = manager.switch_profile(name)?.clone();
        self.active_profile = profile.name.clone();
        *self.active_profile_name.lock().expect("profile name lock poisoned") = profile.name.clone();
        self.apply_profile(&profile);
        Ok(())
    }

    fn apply_profile(&mut self, profile: &AgentProfile) {
        let mut table = toml::Table::new();
        profiles::deep_merge(&mut table, &profile.overrides);

        if let Some(auto_approve) = table.get("auto_approve").and_then(toml::Value::as_bool) {
            self.approval_policy.auto_approve = auto_approve;
        }
        if let Some(enabled) = table.get("enabled_tools").and_then(toml::Value::as_array) {
            let names: Vec<String> =
                enabled.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            self.tool_registry = Arc::new(self.tool_registry.filtered(&names));
        }
        if let Some(tools_table) = table.get("tools").and_then(toml::Value::as_table) {
            for (tool_name, entry) in tools_table {
                let Some(entry) = entry.as_table() else { continue };
                if let Some(permission) =
                    entry.get("permission").and_then(toml::Value::as_str).and_then(parse_permission)
                {
                    self.approval_policy.tool_permissions.insert(tool_name.clone(), permission);
                }
                if let Some(allow) = entry.get("allowlist").and_then(toml::Value::as_array) {
                    self.approval_policy
                        .allowlist
                        .extend(allow.iter().filter_map(|v| v.as_str().map(str::to_string)));
                }
                if let Some(deny) = entry.get("denylist").and_then(toml::Value::as_array) {
                    self.approval_policy
                        .denylist
                        .extend(deny.iter().filter_map(|v| v.as_str().map(str::to_string)));
                }
            }
        }
    }

    /// The global proxy env file `/proxy-setup` reads and edits: one file
    /// per machine, under the user's config directory, shared across
    /// sessions and working directories.
    fn proxy_env_file(&self) -> std::path::PathBuf {
        dirs::config_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("codi")
            .join("proxy.env")
    }

    fn persist(&self) {
        let snapshot = StatsSnapshot {
            steps: self.stats.steps,
            session_prompt_tokens: self.stats.session_prompt_tokens,
            session_completion_tokens: self.stats.session_completion_tokens,
            tool_calls_agreed: self.stats.tool_calls_agreed,
            tool_calls_rejected: self.stats.tool_calls_rejected,
            tool_calls_failed: self.stats.tool_calls_failed,
            tool_calls_succeeded: self.stats.tool_calls_succeeded,
            session_cost: self.stats.session_cost(),
        };
        if let Err(err) = self.session_logger.save(
            self.messages.as_slice(),
            snapshot,
            Some(&self.active_profile),
            None,
            Utc::now(),
        ) {
            tracing::warn!(error = %err, "failed to persist session");
        }
    }

    /// Restore I-M2/I-M3 before a new `act()` call: synthesize `tool`
    /// responses for any assistant tool calls left unanswered by a previous
    /// cancellation, then close out a trailing `tool` row with an
    /// `"Understood."` assistant message.
    ///
    /// This is also where cancellation's history repair actually happens: a
    /// dropped `act()` stream can't run async persistence from `Drop`, so
    /// rather than inject the synthetic response at the cancellation point,
    /// we defer it to the next call's repair pass -- the insert logic is
    /// identical either way, and this keeps it in one place.
    fn repair_history(&mut self) {
        let snapshot = self.messages.as_slice().to_vec();
        let mut inserts: Vec<(usize, Message)> = Vec::new();

        for (index, message) in snapshot.iter().enumerate() {
            if message.role != Role::Assistant {
                continue;
            }
            let Some(calls) = &message.tool_calls else { continue };
            if calls.is_empty() {
                continue;
            }
            let mut answered: HashSet<&str> = HashSet::new();
            let mut cursor = index + 1;
            while cursor < snapshot.len() && snapshot[cursor].role == Role::Tool {
                if let Some(id) = &snapshot[cursor].tool_call_id {
                    answered.insert(id.as_str());
                }
                cursor += 1;
            }
            for call in calls {
                if !answered.contains(call.id.as_str()) {
                    inserts.push((
                        cursor,
                        format::skipped_tool_response_message(
                            &call.id,
                            CancellationReason::Interrupted.message(),
                        ),
                    ));
                }
            }
        }

        for (index, message) in inserts.into_iter().rev() {
            self.messages.insert(index, message);
        }

        if matches!(self.messages.as_slice().last(), Some(last) if last.role == Role::Tool) {
            let len = self.messages.len();
            self.messages.insert(len, Message::new(Role::Assistant, "Understood."));
        }
    }

    /// Summarize the conversation so far into a fresh `[system, summary]`
    /// history and start a new on-disk session rooted at that summary.
    async fn compact(&mut self) -> Result<u64, AgentLoopError> {
        self.persist();

        let last_user_text = self
            .messages
            .as_slice()
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(Message::text)
            .map(str::to_string);

        let mut summary_prompt =
            "Summarize this conversation so far. Preserve important context, decisions made, and \
             any outstanding work the user still expects."
                .to_string();
        if let Some(text) = &last_user_text {
            summary_prompt.push_str(&format!("\n\nLast request from user was: {text}"));
        }

        self.messages.silent(|list| {
            list.append(Message::new(Role::User, summary_prompt));
        });

        let request = CompletionRequest {
            messages: merge_consecutive_user_messages(self.messages.as_slice()),
            tools: None,
            temperature: self.backend.model().default_temperature,
            max_tokens: self.config.max_response_tokens,
            thinking: None,
        };
        let response = self.backend.complete(request).await?;
        let summary_text = response.message.text().unwrap_or_default().to_string();

        let system_message = Message::new(Role::System, self.system_prompt.clone());
        let summary_message = Message::new(Role::User, format!("Conversation summary:\n{summary_text}"));
        self.messages.reset(vec![system_message, summary_message]);

        let new_tokens = self.backend.count_tokens(self.messages.as_slice()).await?;
        self.stats.context_tokens = new_tokens;

        let now = Utc::now();
        self.session_logger = SessionLogger::create(
            &self.session_save_dir,
            &self.session_prefix,
            self.working_directory.clone(),
            now,
        )?;
        self.persist();
        self.middleware.reset(ResetReason::Compact);

        Ok(new_tokens)
    }

    /// Run one user turn to completion, yielding every event along the way.
    /// The returned stream borrows `self` for its whole lifetime; at most
    /// one may be alive (and driven) at a time.
    pub fn act(&mut self, prompt: String) -> BoxStream<'_, Result<AgentEvent, AgentLoopError>> {
        Box::pin(stream! {
            if self.running {
                yield Err(AgentLoopError::AlreadyRunning);
                return;
            }
            self.running = true;

            self.repair_history();

            let user_message = Message::new(Role::User, prompt.clone());
            let user_message_id = user_message.message_id.clone();
            self.messages.append(user_message);
            self.stats.increment_step();
            self.persist();
            yield Ok(AgentEvent::UserMessage(UserMessageEvent {
                message_id: user_message_id,
                content: prompt.clone(),
            }));

            if let Some(command) = proxy_setup::parse_proxy_command(&prompt) {
                let response = render_proxy_command(command, &self.proxy_env_file());
                self.messages.append(Message::new(Role::Assistant, response.clone()));
                self.persist();
                yield Ok(AgentEvent::Assistant(AssistantEvent {
                    message_id: None,
                    content: response,
                    stopped_by_middleware: false,
                }));
                self.running = false;
                return;
            }

            loop {
                let action = {
                    let context = ConversationContext {
                        messages: &self.messages,
                        stats: &self.stats,
                        max_context_tokens: self.max_context_tokens,
                    };
                    self.middleware.run_before_turn(&context).await
                };

                match action {
                    MiddlewareAction::Continue => {}
                    MiddlewareAction::InjectMessage(text) => {
                        self.messages.append(Message::new(Role::User, text));
                        self.persist();
                    }
                    MiddlewareAction::Compact { old_tokens, threshold: _ } => {
                        let compaction_id = Uuid::new_v4().to_string();
                        yield Ok(AgentEvent::CompactStart(CompactStartEvent { compaction_id: compaction_id.clone() }));
                        match self.compact().await {
                            Ok(new_tokens) => {
                                self.telemetry.emit(TelemetryEvent::AutoCompactTriggered { old_tokens, new_tokens });
                                yield Ok(AgentEvent::CompactEnd(CompactEndEvent {
                                    compaction_id,
                                    old_tokens,
                                    new_tokens,
                                }));
                            }
                            Err(err) => {
                                yield Err(err);
                                self.running = false;
                                return;
                            }
                        }
                    }
                    MiddlewareAction::Stop { reason } => {
                        let text = format!("<stopped>{reason}</stopped>");
                        self.messages.append(Message::new(Role::Assistant, text.clone()));
                        self.persist();
                        yield Ok(AgentEvent::Assistant(AssistantEvent {
                            message_id: None,
                            content: text,
                            stopped_by_middleware: true,
                        }));
                        self.running = false;
                        return;
                    }
                }

                self.stats.increment_step();

                let request = CompletionRequest {
                    messages: merge_consecutive_user_messages(self.messages.as_slice()),
                    tools: build_available_tools(&self.tool_registry),
                    temperature: self.backend.model().default_temperature,
                    max_tokens: self.config.max_response_tokens,
                    thinking: self.config.thinking_level.map(|level| ThinkingConfig { level }),
                };

                let final_message = if self.config.use_streaming {
                    let mut chunk_stream = match self.backend.complete_streaming(request).await {
                        Ok(stream) => stream,
                        Err(err) => {
                            yield Err(AgentLoopError::Backend(err));
                            self.running = false;
                            return;
                        }
                    };

                    let mut accumulated: Option<Message> = None;
                    let mut usage = None;
                    let mut announced_tool_calls: HashSet<String> = HashSet::new();

                    loop {
                        let Some(item) = chunk_stream.next().await else { break };
                        let chunk = match item {
                            Ok(chunk) => chunk,
                            Err(err) => {
                                yield Err(AgentLoopError::Backend(err));
                                self.running = false;
                                return;
                            }
                        };

                        for call in chunk.message.tool_calls.iter().flatten() {
                            if announced_tool_calls.insert(call.id.clone()) {
                                yield Ok(AgentEvent::ToolCall(ToolCallEvent {
                                    call_id: call.id.clone(),
                                    tool_name: call.function.name.clone(),
                                    arguments: serde_json::Value::Null,
                                }));
                            }
                        }

                        if let Some(reasoning) = chunk.message.reasoning_content.as_deref() {
                            if !reasoning.is_empty() {
                                yield Ok(AgentEvent::Reasoning(ReasoningEvent {
                                    message_id: Some(chunk.message.message_id.clone()),
                                    content: reasoning.to_string(),
                                }));
                            }
                        }
                        if let Some(text) = chunk.message.text() {
                            if !text.is_empty() {
                                yield Ok(AgentEvent::Assistant(AssistantEvent {
                                    message_id: Some(chunk.message.message_id.clone()),
                                    content: text.to_string(),
                                    stopped_by_middleware: false,
                                }));
                            }
                        }

                        usage = match (usage.take(), chunk.usage) {
                            (None, u) => u,
                            (Some(a), b) => Some(crate::types::LlmUsage::merge(a, b)),
                        };

                        accumulated = Some(match accumulated.take() {
                            None => chunk.message,
                            Some(acc) => match acc.merge(chunk.message) {
                                Ok(merged) => merged,
                                Err(err) => {
                                    yield Err(AgentLoopError::Merge(err));
                                    self.running = false;
                                    return;
                                }
                            },
                        });
                    }

                    let Some(message) = accumulated else {
                        yield Err(AgentLoopError::MalformedResponse("stream produced no chunks".into()));
                        self.running = false;
                        return;
                    };
                    let Some(usage) = usage else {
                        yield Err(AgentLoopError::MalformedResponse(
                            "final streaming chunk was missing usage information".into(),
                        ));
                        self.running = false;
                        return;
                    };

                    self.messages.append(message.clone());
                    self.stats.record_turn_usage(
                        usage.prompt_tokens,
                        usage.completion_tokens,
                        usage.cache_creation_input_tokens,
                        usage.cache_read_input_tokens,
                    );
                    self.persist();
                    message
                } else {
                    let response = match self.backend.complete(request).await {
                        Ok(response) => response,
                        Err(err) => {
                            yield Err(AgentLoopError::Backend(err));
                            self.running = false;
                            return;
                        }
                    };

                    if let Some(reasoning) = response.message.reasoning_content.as_deref() {
                        if !reasoning.is_empty() {
                            yield Ok(AgentEvent::Reasoning(ReasoningEvent {
                                message_id: Some(response.message.message_id.clone()),
                                content: reasoning.to_string(),
                            }));
                        }
                    }
                    if let Some(text) = response.message.text() {
                        if !text.is_empty() {
                            yield Ok(AgentEvent::Assistant(AssistantEvent {
                                message_id: Some(response.message.message_id.clone()),
                                content: text.to_string(),
                                stopped_by_middleware: false,
                            }));
                        }
                    }

                    self.messages.append(response.message.clone());
                    self.stats.record_turn_usage(
                        response.usage.prompt_tokens,
                        response.usage.completion_tokens,
                        response.usage.cache_creation_input_tokens,
                        response.usage.cache_read_input_tokens,
                    );
                    self.persist();
                    response.message
                };

                let mut triggered_image_case = false;
                for (call_id, name, parsed_args) in format::resolve_tool_calls(&final_message) {
                    let args = match parsed_args {
                        Ok(value) => value,
                        Err(err) => {
                            let message = format!("invalid arguments for tool '{name}': {err}");
                            self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::Error(message.clone())));
                            self.stats.record_tool_failed();
                            self.persist();
                            yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                                call_id,
                                tool_name: name,
                                outcome: ToolResultOutcome::Error { message },
                            }));
                            continue;
                        }
                    };

                    let Some(tool) = self.tool_registry.get(&name) else {
                        let message = format!("unknown tool: {name}");
                        self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::Error(message.clone())));
                        self.stats.record_tool_failed();
                        self.persist();
                        yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                            call_id,
                            tool_name: name,
                            outcome: ToolResultOutcome::Error { message },
                        }));
                        continue;
                    };

                    yield Ok(AgentEvent::ToolCall(ToolCallEvent {
                        call_id: call_id.clone(),
                        tool_name: name.clone(),
                        arguments: args.clone(),
                    }));

                    if self.loop_detector.check(&name, &args) {
                        let message =
                            "repeated tool call with identical arguments detected; try a different approach"
                                .to_string();
                        self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::Error(message.clone())));
                        self.stats.record_tool_failed();
                        self.persist();
                        yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                            call_id,
                            tool_name: name,
                            outcome: ToolResultOutcome::Error { message },
                        }));
                        continue;
                    }

                    let match_subject = tool_match_subject(&name, &args);
                    let initial_decision = match tool.resolve_permission(&args) {
                        Some(permission) => {
                            let mut policy = self.approval_policy.clone();
                            policy.tool_permissions.insert(name.clone(), permission);
                            policy.resolve(&name, &match_subject)
                        }
                        None => self.approval_policy.resolve(&name, &match_subject),
                    };

                    let (should_execute, skip_reason, approval_kind) = match initial_decision {
                        ToolDecision::Execute => (true, None, "auto"),
                        ToolDecision::Skip => {
                            (false, Some("tool permanently disabled by policy".to_string()), "denied")
                        }
                        ToolDecision::AskUser => {
                            let decision = match &self.approval_callback {
                                Some(callback) => callback(name.clone(), args.clone()).await,
                                None => ApprovalDecision { approved: false, feedback: None },
                            };
                            if decision.approved {
                                (true, None, "prompted")
                            } else {
                                let feedback = decision
                                    .feedback
                                    .unwrap_or_else(|| CancellationReason::NoResponse.message().to_string());
                                (false, Some(feedback), "prompted")
                            }
                        }
                    };

                    if !should_execute {
                        let reason = skip_reason.unwrap_or_else(|| CancellationReason::Skipped.message().to_string());
                        self.messages.append(format::skipped_tool_response_message(&call_id, &reason));
                        self.stats.record_tool_rejected();
                        self.persist();
                        self.telemetry.emit(TelemetryEvent::ToolCallFinished {
                            tool_name: name.clone(),
                            status: "skipped".to_string(),
                            approval_type: approval_kind.to_string(),
                        });
                        yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                            call_id,
                            tool_name: name,
                            outcome: ToolResultOutcome::Skipped { reason },
                        }));
                        continue;
                    }

                    self.stats.record_tool_agreed();

                    let ctx = InvokeContext {
                        tool_call_id: call_id.clone(),
                        session_dir: self.session_logger.dir().to_path_buf(),
                        entrypoint_metadata: serde_json::Value::Null,
                        approval_callback: self.approval_callback.clone(),
                        user_input_callback: self.user_input_callback.clone(),
                        sampling_callback: self.sampling_callback.clone(),
                    };
                    let mut tool_stream = tool.invoke(ctx, args).await;
                    let mut terminal: Option<ToolOutcome> = None;
                    while let Some(item) = tool_stream.next().await {
                        match item {
                            ToolYield::Stream(chunk) => {
                                yield Ok(AgentEvent::ToolStream(ToolStreamEvent { call_id: call_id.clone(), chunk }));
                            }
                            ToolYield::Terminal(outcome) => {
                                terminal = Some(outcome);
                                break;
                            }
                        }
                    }
                    drop(tool_stream);

                    let outcome = terminal.unwrap_or_else(|| {
                        ToolOutcome::Error("tool stream ended without a terminal result".to_string())
                    });

                    match outcome {
                        ToolOutcome::Error(message) => {
                            self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::Error(message.clone())));
                            self.stats.record_tool_failed();
                            self.persist();
                            self.telemetry.emit(TelemetryEvent::ToolCallFinished {
                                tool_name: name.clone(),
                                status: "error".to_string(),
                                approval_type: approval_kind.to_string(),
                            });
                            yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                                call_id,
                                tool_name: name,
                                outcome: ToolResultOutcome::Error { message },
                            }));
                        }
                        ToolOutcome::PermissionDenied(message) => {
                            self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::PermissionDenied(message.clone())));
                            self.stats.retract_tool_agreement();
                            self.persist();
                            self.telemetry.emit(TelemetryEvent::ToolCallFinished {
                                tool_name: name.clone(),
                                status: "error".to_string(),
                                approval_type: approval_kind.to_string(),
                            });
                            yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                                call_id,
                                tool_name: name,
                                outcome: ToolResultOutcome::Error { message },
                            }));
                        }
                        ToolOutcome::Result(text) => {
                            self.messages.append(format::tool_response_message(&call_id, &ToolOutcome::Result(text.clone())));
                            self.stats.record_tool_succeeded();
                            self.persist();
                            self.telemetry.emit(TelemetryEvent::ToolCallFinished {
                                tool_name: name.clone(),
                                status: "result".to_string(),
                                approval_type: approval_kind.to_string(),
                            });
                            yield Ok(AgentEvent::ToolResult(ToolResultEvent {
                                call_id,
                                tool_name: name.clone(),
                                outcome: ToolResultOutcome::Result { content: text.clone() },
                            }));

                            if let Some(image_url) = extract_image_url(&text) {
                                let understood = Message::new(Role::Assistant, "Understood.");
                                let understood_id = understood.message_id.clone();
                                self.messages.append(understood);
                                yield Ok(AgentEvent::Assistant(AssistantEvent {
                                    message_id: Some(understood_id),
                                    content: "Understood.".to_string(),
                                    stopped_by_middleware: false,
                                }));

                                let mixed_content = Content::Blocks(vec![
                                    ContentBlock::Text {
                                        text: format!("Here is the image produced by {name}."),
                                    },
                                    ContentBlock::Image { source_type: "url".to_string(), data: image_url },
                                ]);
                                let mixed_id = Uuid::new_v4().to_string();
                                let mixed = Message {
                                    message_id: mixed_id.clone(),
                                    role: Role::User,
                                    content: Some(mixed_content.clone()),
                                    reasoning_content: None,
                                    reasoning_signature: None,
                                    tool_calls: None,
                                    tool_call_id: None,
                                    name: None,
                                };
                                self.messages.append(mixed);
                                self.persist();
                                yield Ok(AgentEvent::UserMessage(UserMessageEvent {
                                    message_id: mixed_id,
                                    content: format::flatten_text(&mixed_content),
                                }));
                                triggered_image_case = true;
                            }
                        }
                    }
                }

                let last_is_tool = matches!(self.messages.as_slice().last(), Some(last) if last.role == Role::Tool);
                if !last_is_tool && !triggered_image_case {
                    break;
                }
            }

            self.persist();
            self.running = false;
        })
    }
}

fn parse_permission(value: &str) -> Option<crate::agent::approval::Permission> {
    use crate::agent::approval::Permission;
    match value {
        "always" => Some(Permission::Always),
        "ask" => Some(Permission::Ask),
        "never" => Some(Permission::Never),
        _ => None,
    }
}

/// Build the glob-match subject an approval policy's allow/deny lists are
/// checked against: `task` keys its entries off the target subagent, every
/// other tool just matches on its own name.
fn tool_match_subject(tool_name: &str, args: &serde_json::Value) -> String {
    if tool_name == "task" {
        if let Some(agent) = args.get("agent").and_then(serde_json::Value::as_str) {
            return format!("{tool_name} {agent}");
        }
    }
    tool_name.to_string()
}

/// Execute a parsed `/proxy-setup` command against the given env file and
/// render the result as the plain-text reply the loop hands back instead of
/// calling the backend.
fn render_proxy_command(command: ProxyCommand, env_file: &std::path::Path) -> String {
    match command {
        ProxyCommand::Show => {
            let settings = proxy_setup::get_current_proxy_settings(env_file);
            let lines: Vec<String> = proxy_setup::SUPPORTED_PROXY_VARS
                .iter()
                .map(|&var| format!("{var}={}", settings.get(var).cloned().flatten().unwrap_or_default()))
                .collect();
            format!("Current proxy settings:\n{}", lines.join("\n"))
        }
        ProxyCommand::Set { var, value } => match proxy_setup::set_proxy_var(env_file, &var, &value) {
            Ok(()) => format!("Set {var}={value}."),
            Err(err) => format!("Failed to set {var}: {err}"),
        },
        ProxyCommand::Unset { var } => match proxy_setup::unset_proxy_var(env_file, &var) {
            Ok(()) => format!("Unset {var}."),
            Err(err) => format!("Failed to unset {var}: {err}"),
        },
    }
}

/// Scan a tool's rendered result text for an `image_url: ...` line (the
/// shape `render_result_text` produces for `read_image`-style tools).
fn extract_image_url(text: &str) -> Option<String> {
    text.lines().find_map(|line| line.strip_prefix("image_url: ").map(str::to_string))
}

/// Collapse adjacent `user`-role rows into one via the merge law, so a
/// middleware-injected reminder doesn't send the backend two consecutive
/// user turns.
fn merge_consecutive_user_messages(messages: &[Message]) -> Vec<Message> {
    let mut merged: Vec<Message> = Vec::with_capacity(messages.len());
    for message in messages.iter().cloned() {
        if message.role == Role::User && matches!(merged.last(), Some(last) if last.role == Role::User) {
            let previous = merged.pop().expect("checked non-empty above");
            match previous.clone().merge(message.clone()) {
                Ok(combined) => {
                    merged.push(combined);
                    continue;
                }
                Err(_) => {
                    merged.push(previous);
                }
            }
        }
        merged.push(message);
    }
    merged
}

fn build_available_tools(
    registry: &ToolRegistry,
) -> Option<(Vec<crate::providers::AvailableTool>, crate::types::ToolChoice)> {
    let mut names = registry.names();
    if names.is_empty() {
        return None;
    }
    names.sort_unstable();
    let tools = names
        .into_iter()
        .filter_map(|name| registry.get(name))
        .map(|tool| crate::providers::AvailableTool {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.args_schema(),
        })
        .collect();
    Some((tools, crate::types::ToolChoice::Auto))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_consecutive_user_messages_collapses_adjacent_rows() {
        let messages = vec![
            Message::new(Role::System, "sys"),
            Message::new(Role::User, "hello "),
            Message::new(Role::User, "world"),
            Message::new(Role::Assistant, "hi"),
        ];
        let merged = merge_consecutive_user_messages(&messages);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[1].text(), Some("hello world"));
    }

    #[test]
    fn extract_image_url_reads_key_value_line() {
        let text = "image_url: https://example.com/a.png\nsource_type: http";
        assert_eq!(extract_image_url(text).as_deref(), Some("https://example.com/a.png"));
        assert_eq!(extract_image_url("no image here"), None);
    }

    #[test]
    fn tool_match_subject_keys_task_off_its_agent_argument() {
        let args = serde_json::json!({"agent": "explore", "task": "look around"});
        assert_eq!(tool_match_subject("task", &args), "task explore");
        assert_eq!(tool_match_subject("grep", &args), "grep");
    }

    #[test]
    fn parse_permission_rejects_unknown_strings() {
        assert!(parse_permission("always").is_some());
        assert!(parse_permission("bogus").is_none());
    }
}
