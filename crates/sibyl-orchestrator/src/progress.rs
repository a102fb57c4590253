// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort progress delivery to the chat surface.
//!
//! Progress is a one-way stream decoupled from the state machine: a full
//! buffer or a dropped receiver loses updates, never blocks or fails a
//! transition.

use sibyl_core::types::{ProgressUpdate, Stage};
use tokio::sync::mpsc;
use tracing::trace;

/// Create a progress channel with the given capacity.
pub fn channel(capacity: usize) -> (ProgressSender, mpsc::Receiver<ProgressUpdate>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ProgressSender { tx: Some(tx) }, rx)
}

/// Sending half of a progress stream. A disabled sender drops everything.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl ProgressSender {
    /// A sender that discards all updates (callers that don't render
    /// progress).
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Emit a stage transition. Never blocks; a slow consumer loses
    /// updates rather than stalling the orchestrator.
    pub fn emit(&self, query_id: &str, stage: Stage) {
        let Some(tx) = &self.tx else { return };
        let update = ProgressUpdate {
            query_id: query_id.to_string(),
            stage,
        };
        if let Err(e) = tx.try_send(update) {
            trace!(query_id, stage = %stage, error = %e, "progress update dropped");
        }
    }
}
