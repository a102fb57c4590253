// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query orchestration for the Sibyl query assistant.
//!
//! The [`QueryOrchestrator`] coordinates one inbound question at a time
//! per call, sharing the permission guard, rate limiter, result cache,
//! session store, and audit log with every other concurrent request. It:
//! - admits the request (permission guard, then rate limiter)
//! - serves the cache fast path without touching the expert service
//! - otherwise drives the expert call sequence under the request deadline
//! - streams best-effort progress and honors cooperative cancellation
//! - lands every outcome in a terminal state with exactly one audit entry

pub mod orchestrator;
pub mod progress;
pub mod retry;

pub use orchestrator::QueryOrchestrator;
pub use progress::{channel as progress_channel, ProgressSender};
