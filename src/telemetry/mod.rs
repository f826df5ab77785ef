// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Fire-and-forget telemetry sink (C12). The transport is `tracing`: events
//! are emitted as structured spans/fields rather than shipped anywhere by
//! this crate, leaving the actual sink (stdout, OTLP, a file) to whatever
//! `tracing-subscriber` layer the host installs.

use serde_json::Value;
use tracing::info;

#[derive(Debug, Clone)]
pub enum TelemetryEvent {
    NewSession { session_id: String },
    ToolCallFinished { tool_name: String, status: String, approval_type: String },
    AutoCompactTriggered { old_tokens: u64, new_tokens: u64 },
}

pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: TelemetryEvent);
}

#[derive(Debug, Clone, Default)]
pub struct TracingTelemetryClient;

impl TelemetrySink for TracingTelemetryClient {
    fn emit(&self, event: TelemetryEvent) {
        match event {
            TelemetryEvent::NewSession { session_id } => {
                info!(event = "new_session", session_id = %session_id);
            }
            TelemetryEvent::ToolCallFinished { tool_name, status, approval_type } => {
                info!(
                    event = "tool_call_finished",
                    tool_name = %tool_name,
                    status = %status,
                    approval_type = %approval_type,
                );
            }
            TelemetryEvent::AutoCompactTriggered { old_tokens, new_tokens } => {
                info!(
                    event = "auto_compact_triggered",
                    old_tokens = old_tokens,
                    new_tokens = new_tokens,
                );
            }
        }
    }
}

/// A sink that drops everything; useful for tests that don't want to assert
/// on tracing output.
#[derive(Debug, Clone, Default)]
pub struct NullTelemetryClient;

impl TelemetrySink for NullTelemetryClient {
    fn emit(&self, _event: TelemetryEvent) {}
}

/// Render an arbitrary value into the metadata blob some downstream sinks
/// attach to their events; kept separate from `emit` so a host can build
/// richer payloads without this crate needing to know their shape.
pub fn event_metadata(event: &TelemetryEvent) -> Value {
    match event {
        TelemetryEvent::NewSession { session_id } => {
            serde_json::json!({"session_id": session_id})
        }
        TelemetryEvent::ToolCallFinished { tool_name, status, approval_type } => {
            serde_json::json!({"tool_name": tool_name, "status": status, "approval_type": approval_type})
        }
        TelemetryEvent::AutoCompactTriggered { old_tokens, new_tokens } => {
            serde_json::json!({"old_tokens": old_tokens, "new_tokens": new_tokens})
        }
    }
}
