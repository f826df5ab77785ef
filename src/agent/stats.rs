// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session-wide counters (C13).
//!
//! [`AgentStats`] tracks turn/token/cost counters for the lifetime of a
//! session and notifies listeners whenever it changes, the way
//! [`super::message_list::MessageList`] notifies on message changes.

#[derive(Debug, Clone, Copy, Default)]
pub struct ModelPricing {
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    pub cache_write_cost_per_million: f64,
    pub cache_read_cost_per_million: f64,
}

type StatsListener = Box<dyn Fn(&AgentStats) + Send + Sync>;

pub struct AgentStats {
    pub steps: u64,
    pub tool_calls_agreed: u64,
    pub tool_calls_rejected: u64,
    pub tool_calls_failed: u64,
    pub tool_calls_succeeded: u64,
    pub context_tokens: u64,
    pub session_prompt_tokens: u64,
    pub session_completion_tokens: u64,
    pub session_cache_creation_tokens: u64,
    pub session_cache_read_tokens: u64,
    pricing: ModelPricing,
    listeners: Vec<StatsListener>,
}

impl std::fmt::Debug for AgentStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentStats")
            .field("steps", &self.steps)
            .field("tool_calls_agreed", &self.tool_calls_agreed)
            .field("tool_calls_rejected", &self.tool_calls_rejected)
            .field("tool_calls_failed", &self.tool_calls_failed)
            .field("tool_calls_succeeded", &self.tool_calls_succeeded)
            .field("context_tokens", &self.context_tokens)
            .field("session_prompt_tokens", &self.session_prompt_tokens)
            .field("session_completion_tokens", &self.session_completion_tokens)
            .field("session_cost", &self.session_cost())
            .finish()
    }
}

impl AgentStats {
    pub fn create_fresh() -> Self {
        Self {
            steps: 0,
            tool_calls_agreed: 0,
            tool_calls_rejected: 0,
            tool_calls_failed: 0,
            tool_calls_succeeded: 0,
            context_tokens: 0,
            session_prompt_tokens: 0,
            session_completion_tokens: 0,
            session_cache_creation_tokens: 0,
            session_cache_read_tokens: 0,
            pricing: ModelPricing::default(),
            listeners: Vec::new(),
        }
    }

    pub fn subscribe(&mut self, listener: StatsListener) {
        self.listeners.push(listener);
    }

    fn notify(&self) {
        for listener in &self.listeners {
            listener(self);
        }
    }

    pub fn update_pricing(&mut self, pricing: ModelPricing) {
        self.pricing = pricing;
        self.notify();
    }

    /// Set (not increment) the context-window size as of the turn just
    /// completed, while cumulatively tracking the session-wide totals used
    /// for cost accounting.
    pub fn record_turn_usage(
        &mut self,
        prompt_tokens: u64,
        completion_tokens: u64,
        cache_creation_tokens: u64,
        cache_read_tokens: u64,
    ) {
        self.context_tokens = prompt_tokens + completion_tokens;
        self.session_prompt_tokens += prompt_tokens;
        self.session_completion_tokens += completion_tokens;
        self.session_cache_creation_tokens += cache_creation_tokens;
        self.session_cache_read_tokens += cache_read_tokens;
        self.notify();
    }

    pub fn increment_step(&mut self) {
        self.steps += 1;
        self.notify();
    }

    pub fn record_tool_agreed(&mut self) {
        self.tool_calls_agreed += 1;
        self.notify();
    }

    /// A tool that was approved failed at invocation time with a permission
    /// error; retroactively move it from agreed to rejected.
    pub fn retract_tool_agreement(&mut self) {
        self.tool_calls_agreed = self.tool_calls_agreed.saturating_sub(1);
        self.tool_calls_rejected += 1;
        self.notify();
    }

    pub fn record_tool_rejected(&mut self) {
        self.tool_calls_rejected += 1;
        self.notify();
    }

    /// A tool invocation ran to a terminal `Result` (as opposed to merely
    /// being approved to run).
    pub fn record_tool_succeeded(&mut self) {
        self.tool_calls_succeeded += 1;
        self.notify();
    }

    /// A `FailedToolCall` (unknown tool or schema validation error) or a
    /// runtime `ToolError` during invocation; distinct from a rejection,
    /// which always reflects a permission decision.
    pub fn record_tool_failed(&mut self) {
        self.tool_calls_failed += 1;
        self.notify();
    }

    pub fn session_cost(&self) -> f64 {
        let million = 1_000_000.0;
        (self.session_prompt_tokens as f64) * self.pricing.input_cost_per_million / million
            + (self.session_completion_tokens as f64) * self.pricing.output_cost_per_million
                / million
            + (self.session_cache_creation_tokens as f64)
                * self.pricing.cache_write_cost_per_million
                / million
            + (self.session_cache_read_tokens as f64) * self.pricing.cache_read_cost_per_million
                / million
    }

    /// Clear context-window accounting (used right after compaction mints a
    /// fresh session); session-wide cumulative counters are left untouched.
    pub fn reset_context_state(&mut self) {
        self.context_tokens = 0;
        self.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_tokens_is_set_not_incremented() {
        let mut stats = AgentStats::create_fresh();
        stats.record_turn_usage(100, 20, 0, 0);
        stats.record_turn_usage(150, 30, 0, 0);
        assert_eq!(stats.context_tokens, 180);
        assert_eq!(stats.session_prompt_tokens, 250);
        assert_eq!(stats.session_completion_tokens, 50);
    }

    #[test]
    fn retract_moves_agreed_to_rejected() {
        let mut stats = AgentStats::create_fresh();
        stats.record_tool_agreed();
        stats.record_tool_agreed();
        stats.retract_tool_agreement();
        assert_eq!(stats.tool_calls_agreed, 1);
        assert_eq!(stats.tool_calls_rejected, 1);
    }

    #[test]
    fn agreed_and_succeeded_are_independent_counters() {
        let mut stats = AgentStats::create_fresh();
        stats.record_tool_agreed();
        stats.record_tool_succeeded();
        assert_eq!(stats.tool_calls_agreed, 1);
        assert_eq!(stats.tool_calls_succeeded, 1);
    }

    #[test]
    fn session_cost_formula() {
        let mut stats = AgentStats::create_fresh();
        stats.update_pricing(ModelPricing {
            input_cost_per_million: 3.0,
            output_cost_per_million: 15.0,
            cache_write_cost_per_million: 3.75,
            cache_read_cost_per_million: 0.3,
        });
        stats.record_turn_usage(1_000_000, 1_000_000, 0, 0);
        assert!((stats.session_cost() - 18.0).abs() < 1e-9);
    }
}
