// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Agent core: the message model, tool contract, backend adapters, the
//! agent loop, and the supporting services (profiles, sessions, middleware,
//! telemetry) that drive a coding assistant.

pub mod agent;
pub mod config;
pub mod error;
pub mod proxy_setup;
pub mod providers;
pub mod session;
pub mod system_prompt;
pub mod telemetry;
pub mod tools;
pub mod types;

pub use error::{CoreError, CoreResult};
