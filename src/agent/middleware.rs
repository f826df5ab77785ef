// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Before-turn middleware pipeline (C7).
//!
//! Each middleware inspects the conversation before a turn begins and may
//! ask the loop to stop, trigger a compaction, or inject a reminder
//! message. A STOP or COMPACT result from any middleware short-circuits the
//! pipeline immediately, discarding any injections accumulated from earlier
//! middlewares in the same pass; otherwise all pending injections are
//! joined with a blank line and returned together.

use async_trait::async_trait;

use crate::agent::message_list::MessageList;
use crate::agent::stats::AgentStats;

pub const CONTEXT_WARNING_TAG: &str = "system-warning";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    Stop,
    Compact,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareAction {
    Continue,
    Stop { reason: String },
    Compact { old_tokens: u64, threshold: u64 },
    InjectMessage(String),
}

pub struct ConversationContext<'a> {
    pub messages: &'a MessageList,
    pub stats: &'a AgentStats,
    pub max_context_tokens: Option<u64>,
}

#[async_trait]
pub trait ConversationMiddleware: Send + Sync {
    async fn before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction;

    fn reset(&mut self, _reason: ResetReason) {}
}

pub struct TurnLimitMiddleware {
    pub max_turns: u64,
}

#[async_trait]
impl ConversationMiddleware for TurnLimitMiddleware {
    async fn before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction {
        if context.stats.steps.saturating_sub(1) >= self.max_turns {
            MiddlewareAction::Stop { reason: format!("Turn limit of {} reached", self.max_turns) }
        } else {
            MiddlewareAction::Continue
        }
    }
}

pub struct PriceLimitMiddleware {
    pub max_price: f64,
}

#[async_trait]
impl ConversationMiddleware for PriceLimitMiddleware {
    async fn before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction {
        let cost = context.stats.session_cost();
        if cost > self.max_price {
            MiddlewareAction::Stop {
                reason: format!(
                    "Price limit exceeded: ${:.4} > ${:.2}",
                    cost, self.max_price
                ),
            }
        } else {
            MiddlewareAction::Continue
        }
    }
}

pub struct AutoCompactMiddleware {
    pub threshold: u64,
}

#[async_trait]
impl ConversationMiddleware for AutoCompactMiddleware {
    async fn before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction {
        if context.stats.context_tokens >= self.threshold {
            MiddlewareAction::Compact {
                old_tokens: context.stats.context_tokens,
                threshold: self.threshold,
            }
        } else {
            MiddlewareAction::Continue
        }
    }
}

pub struct ContextWarningMiddleware {
    pub threshold_percent: f64,
    has_warned: bool,
}

impl ContextWarningMiddleware {
    pub fn new(threshold_percent: f64) -> Self {
        Self { threshold_percent, has_warned: false }
    }
}

#[async_trait]
impl ConversationMiddleware for ContextWarningMiddleware {
    async fn before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction {
        if self.has_warned {
            return MiddlewareAction::Continue;
        }
        let Some(max_context) = context.max_context_tokens else {
            return MiddlewareAction::Continue;
        };
        let threshold = (max_context as f64) * self.threshold_percent;
        if (context.stats.context_tokens as f64) >= threshold {
            self.has_warned = true;
            let percentage = (context.stats.context_tokens as f64) / (max_context as f64) * 100.0;
            let message = format!(
                "<{tag}>You have used {percentage:.0}% of your total context ({used}/{max} tokens)</{tag}>",
                tag = CONTEXT_WARNING_TAG,
                used = context.stats.context_tokens,
                max = max_context,
            );
            MiddlewareAction::InjectMessage(message)
        } else {
            MiddlewareAction::Continue
        }
    }

    fn reset(&mut self, _reason: ResetReason) {
        self.has_warned = false;
    }
}

/// Injects a reminder when a named read-only profile becomes active and an
/// exit notice when it stops being active, firing only on the transition
/// (not on every turn the profile stays active).
pub struct ReadOnlyAgentMiddleware<F: Fn() -> String + Send + Sync> {
    active_profile_name: F,
    target_profile_name: String,
    reminder: String,
    exit_message: String,
    was_active: bool,
}

impl<F: Fn() -> String + Send + Sync> ReadOnlyAgentMiddleware<F> {
    pub fn new(
        active_profile_name: F,
        target_profile_name: impl Into<String>,
        reminder: impl Into<String>,
        exit_message: impl Into<String>,
    ) -> Self {
        Self {
            active_profile_name,
            target_profile_name: target_profile_name.into(),
            reminder: reminder.into(),
            exit_message: exit_message.into(),
            was_active: false,
        }
    }
}

#[async_trait]
impl<F: Fn() -> String + Send + Sync> ConversationMiddleware for ReadOnlyAgentMiddleware<F> {
    async fn before_turn(&mut self, _context: &ConversationContext<'_>) -> MiddlewareAction {
        let is_active = (self.active_profile_name)() == self.target_profile_name;
        let was_active = self.was_active;

        if was_active && !is_active {
            self.was_active = false;
            return MiddlewareAction::InjectMessage(self.exit_message.clone());
        }
        if is_active && !was_active {
            self.was_active = true;
            return MiddlewareAction::InjectMessage(self.reminder.clone());
        }
        self.was_active = is_active;
        MiddlewareAction::Continue
    }

    fn reset(&mut self, _reason: ResetReason) {
        self.was_active = false;
    }
}

pub const PLAN_AGENT_REMINDER: &str = "Plan mode is active: gather information and present a plan, but do not edit files, run mutating tools, or otherwise change system state until the user confirms the plan.";
pub const PLAN_AGENT_EXIT: &str =
    "Plan mode has ended. You may use editing tools and make changes now.";
pub const CHAT_AGENT_REMINDER: &str = "Chat mode is active: answer the user's questions and discuss code using read-only tools only. Your response is the deliverable, not a precursor to action.";
pub const CHAT_AGENT_EXIT: &str =
    "Chat mode has ended. You may use editing tools and make changes now.";

#[derive(Default)]
pub struct MiddlewarePipeline {
    middlewares: Vec<Box<dyn ConversationMiddleware>>,
}

impl MiddlewarePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, middleware: Box<dyn ConversationMiddleware>) -> &mut Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn reset(&mut self, reason: ResetReason) {
        for middleware in &mut self.middlewares {
            middleware.reset(reason);
        }
    }

    pub async fn run_before_turn(&mut self, context: &ConversationContext<'_>) -> MiddlewareAction {
        let mut injections = Vec::new();
        for middleware in &mut self.middlewares {
            match middleware.before_turn(context).await {
                MiddlewareAction::InjectMessage(message) => injections.push(message),
                action @ (MiddlewareAction::Stop { .. } | MiddlewareAction::Compact { .. }) => {
                    return action;
                }
                MiddlewareAction::Continue => {}
            }
        }
        if injections.is_empty() {
            MiddlewareAction::Continue
        } else {
            MiddlewareAction::InjectMessage(injections.join("\n\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(messages: &'a MessageList, stats: &'a AgentStats) -> ConversationContext<'a> {
        ConversationContext { messages, stats, max_context_tokens: Some(1000) }
    }

    #[tokio::test]
    async fn stop_short_circuits_and_discards_pending_injections() {
        let messages = MessageList::new();
        let mut stats = AgentStats::create_fresh();
        stats.record_turn_usage(600, 0, 0, 0);

        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(Box::new(ContextWarningMiddleware::new(0.5)));
        pipeline.add(Box::new(TurnLimitMiddleware { max_turns: 0 }));

        stats.increment_step();
        stats.increment_step();
        let action = pipeline.run_before_turn(&ctx(&messages, &stats)).await;
        assert!(matches!(action, MiddlewareAction::Stop { .. }));
    }

    #[tokio::test]
    async fn injections_from_multiple_middlewares_join_with_blank_line() {
        struct Always(&'static str);
        #[async_trait]
        impl ConversationMiddleware for Always {
            async fn before_turn(&mut self, _c: &ConversationContext<'_>) -> MiddlewareAction {
                MiddlewareAction::InjectMessage(self.0.to_string())
            }
        }

        let messages = MessageList::new();
        let stats = AgentStats::create_fresh();
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add(Box::new(Always("first")));
        pipeline.add(Box::new(Always("second")));

        let action = pipeline.run_before_turn(&ctx(&messages, &stats)).await;
        assert_eq!(action, MiddlewareAction::InjectMessage("first\n\nsecond".to_string()));
    }

    #[tokio::test]
    async fn read_only_middleware_fires_only_on_transition() {
        use std::sync::{Arc, Mutex};
        let active = Arc::new(Mutex::new("default".to_string()));
        let active_clone = active.clone();
        let mut mw = ReadOnlyAgentMiddleware::new(
            move || active_clone.lock().unwrap().clone(),
            "plan",
            PLAN_AGENT_REMINDER,
            PLAN_AGENT_EXIT,
        );

        let messages = MessageList::new();
        let stats = AgentStats::create_fresh();
        let context = ctx(&messages, &stats);

        assert_eq!(mw.before_turn(&context).await, MiddlewareAction::Continue);

        *active.lock().unwrap() = "plan".to_string();
        assert_eq!(
            mw.before_turn(&context).await,
            MiddlewareAction::InjectMessage(PLAN_AGENT_REMINDER.to_string())
        );
        assert_eq!(mw.before_turn(&context).await, MiddlewareAction::Continue);

        *active.lock().unwrap() = "default".to_string();
        assert_eq!(
            mw.before_turn(&context).await,
            MiddlewareAction::InjectMessage(PLAN_AGENT_EXIT.to_string())
        );
    }
}
