// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Repeated-tool-call loop detection (C12).
//!
//! A signature is exactly `(tool_name, normalised_args)` — deliberately not
//! including the call id, which is always unique and would make the
//! detector never trigger. Detecting a loop immediately resets the detector
//! so the next repetition starts counting from one again, rather than
//! continuing to fire on every subsequent repeat.

use serde_json::Value;

/// Recursively sort object keys and turn arrays into a stable, order-
/// preserving but otherwise canonical form so that two calls with
/// differently-ordered JSON keys still compare equal.
pub fn normalize_args(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by_key(|(k, _)| k.clone());
            Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.clone(), normalize_args(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize_args).collect()),
        other => other.clone(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ToolCallSignature {
    tool_name: String,
    normalized_args: String,
}

impl ToolCallSignature {
    fn new(tool_name: &str, args: &Value) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            normalized_args: normalize_args(args).to_string(),
        }
    }
}

pub struct ToolCallLoopDetector {
    threshold: u32,
    last: Option<ToolCallSignature>,
    consecutive_count: u32,
}

impl ToolCallLoopDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold, last: None, consecutive_count: 0 }
    }

    pub fn with_default_threshold() -> Self {
        Self::new(3)
    }

    /// Record one tool call and report whether it completes a loop. Resets
    /// the run on detection, and restarts the count at 1 whenever the
    /// signature changes.
    pub fn detect_loop(&mut self, tool_name: &str, args: &Value) -> bool {
        let signature = ToolCallSignature::new(tool_name, args);
        if self.last.as_ref() == Some(&signature) {
            self.consecutive_count += 1;
        } else {
            self.last = Some(signature);
            self.consecutive_count = 1;
        }

        if self.consecutive_count >= self.threshold {
            self.reset();
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.consecutive_count = 0;
    }
}

/// Thin convenience wrapper around a single [`ToolCallLoopDetector`]
/// instance. There is exactly one call site for this in the agent loop —
/// it is not a second, independently-wired detector.
pub struct ToolCallLoopHandler {
    detector: ToolCallLoopDetector,
}

impl ToolCallLoopHandler {
    pub fn new(detector: ToolCallLoopDetector) -> Self {
        Self { detector }
    }

    pub fn check(&mut self, tool_name: &str, args: &Value) -> bool {
        self.detector.detect_loop(tool_name, args)
    }

    pub fn reset(&mut self) {
        self.detector.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn triggers_at_threshold_and_resets() {
        let mut detector = ToolCallLoopDetector::new(3);
        let args = json!({"path": "a.rs"});
        assert!(!detector.detect_loop("read_file", &args));
        assert!(!detector.detect_loop("read_file", &args));
        assert!(detector.detect_loop("read_file", &args));
        // reset on detect: the 4th identical call starts a fresh count
        assert!(!detector.detect_loop("read_file", &args));
    }

    #[test]
    fn key_order_does_not_defeat_detection() {
        let mut detector = ToolCallLoopDetector::new(2);
        assert!(!detector.detect_loop("grep", &json!({"a": 1, "b": 2})));
        assert!(detector.detect_loop("grep", &json!({"b": 2, "a": 1})));
    }

    #[test]
    fn different_args_do_not_accumulate() {
        let mut detector = ToolCallLoopDetector::new(2);
        assert!(!detector.detect_loop("read_file", &json!({"path": "a"})));
        assert!(!detector.detect_loop("read_file", &json!({"path": "b"})));
    }
}
