// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Sibyl workspace.
//!
//! Timestamps are ISO 8601 strings (UTC) throughout, matching the TEXT
//! columns they are persisted to.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The authenticated identity making a request (end user or service).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal(pub String);

impl Principal {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Principal {
    fn from(s: &str) -> Self {
        Principal(s.to_string())
    }
}

/// A normalized inbound question, already signature-verified and
/// deduplicated by the chat-platform adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub principal: Principal,
    pub channel_id: String,
    pub text: String,
    pub thread_id: Option<String>,
}

/// Lifecycle status of a [`QueryRecord`].
///
/// Transitions are monotonic: once terminal, a record never changes status
/// again, and nothing ever moves back to `Pending`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl QueryStatus {
    /// Terminal states admit no further transition.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueryStatus::Succeeded
                | QueryStatus::Failed
                | QueryStatus::TimedOut
                | QueryStatus::Cancelled
        )
    }

    /// Whether a record in this status may move to `next`.
    ///
    /// Forward-only: `Pending -> Running -> terminal`, with a direct
    /// `Pending -> terminal` shortcut for cache hits and admission failures.
    pub fn can_advance_to(&self, next: QueryStatus) -> bool {
        if self.is_terminal() || next == QueryStatus::Pending {
            return false;
        }
        match next {
            QueryStatus::Running => *self == QueryStatus::Pending,
            _ => next.is_terminal(),
        }
    }
}

/// Stages of the orchestrator state machine, reported through the
/// progress stream as each transition happens.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Admitted,
    CacheChecking,
    CacheHit,
    Generating,
    Executing,
    Formatting,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

/// One progress event emitted to the chat-surface caller.
///
/// Delivery is best-effort: a slow or absent consumer never blocks the
/// orchestrator's own state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub query_id: String,
    pub stage: Stage,
}

/// The terminal answer relayed back to the chat-platform adapter, which is
/// solely responsible for rendering it into messages or files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub query_id: String,
    pub status: QueryStatus,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub sql: Option<String>,
    pub duration_ms: u64,
    pub error_reason: Option<String>,
    pub from_cache: bool,
}

// --- Query-expert types ---

/// A warehouse table surfaced by the expert's metadata search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub owners: Vec<String>,
}

/// A previously-run query similar to the current question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorQuery {
    pub sql: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub similarity: f64,
}

/// Warehouse execution context forwarded to the expert service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpertContext {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub warehouse: Option<String>,
    pub user_name: Option<String>,
}

/// Result of executing SQL against the warehouse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub duration_ms: u64,
}

// --- Storage models ---

/// A (user, channel) conversation. At most one active session exists per
/// pair; sessions are flagged inactive rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub principal: String,
    pub channel_id: String,
    /// Free-form JSON context (last table/warehouse touched, preferences).
    pub context: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub last_activity_at: String,
    pub active: bool,
    pub expires_at: Option<String>,
}

/// One attempt to answer a question within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRecord {
    pub id: String,
    pub session_id: String,
    pub principal: String,
    pub channel_id: String,
    pub question: String,
    pub generated_sql: Option<String>,
    pub status: QueryStatus,
    /// JSON result payload, set on success.
    pub result: Option<String>,
    pub row_count: i64,
    pub duration_ms: Option<i64>,
    pub error_detail: Option<String>,
    pub created_at: String,
    pub executed_at: Option<String>,
    pub completed_at: Option<String>,
}

/// A cached query outcome, keyed by a stable hash of normalized SQL plus
/// execution context. Invalidation flips `valid` and keeps the row so hit
/// and latency history survive for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub sql: String,
    pub payload: String,
    pub row_count: i64,
    pub duration_ms: i64,
    pub hit_count: i64,
    pub created_at: String,
    pub last_hit_at: String,
    pub expires_at: String,
    pub valid: bool,
    pub invalidated_reason: Option<String>,
}

/// Category of an audit event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Security,
    Query,
    System,
    Performance,
    Error,
}

/// Severity of an audit event.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuditSeverity {
    Info,
    Warning,
    Critical,
}

/// An immutable security/operational event. Never updated or deleted by
/// the application; retention is an external concern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub severity: AuditSeverity,
    pub principal: String,
    pub session_id: Option<String>,
    /// Free-form structured JSON payload.
    pub payload: Option<String>,
    pub created_at: String,
}

/// Mapping from a chat-platform user id to an internal principal with its
/// roles and direct capability grants. Backs the local-table resolver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMapping {
    pub chat_user_id: String,
    pub principal: String,
    pub directory_id: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A resolved identity: the principal plus everything the permission guard
/// needs to derive its capability set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub principal: String,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub directory_id: Option<String>,
    pub roles: Vec<String>,
    pub capabilities: Vec<String>,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn query_status_terminal_states_admit_no_transition() {
        let terminals = [
            QueryStatus::Succeeded,
            QueryStatus::Failed,
            QueryStatus::TimedOut,
            QueryStatus::Cancelled,
        ];
        let all = [
            QueryStatus::Pending,
            QueryStatus::Running,
            QueryStatus::Succeeded,
            QueryStatus::Failed,
            QueryStatus::TimedOut,
            QueryStatus::Cancelled,
        ];
        for t in &terminals {
            assert!(t.is_terminal());
            for next in &all {
                assert!(!t.can_advance_to(*next), "{t} -> {next} must be rejected");
            }
        }
    }

    #[test]
    fn query_status_moves_only_forward() {
        assert!(QueryStatus::Pending.can_advance_to(QueryStatus::Running));
        // Cache hits and admission failures jump straight to terminal.
        assert!(QueryStatus::Pending.can_advance_to(QueryStatus::Succeeded));
        assert!(QueryStatus::Pending.can_advance_to(QueryStatus::Failed));
        assert!(QueryStatus::Running.can_advance_to(QueryStatus::TimedOut));

        assert!(!QueryStatus::Running.can_advance_to(QueryStatus::Pending));
        assert!(!QueryStatus::Running.can_advance_to(QueryStatus::Running));
        assert!(!QueryStatus::Pending.can_advance_to(QueryStatus::Pending));
    }

    #[test]
    fn status_and_stage_round_trip_through_strings() {
        for s in [
            QueryStatus::Pending,
            QueryStatus::TimedOut,
            QueryStatus::Cancelled,
        ] {
            let text = s.to_string();
            assert_eq!(QueryStatus::from_str(&text).unwrap(), s);
        }
        assert_eq!(QueryStatus::TimedOut.to_string(), "timed_out");
        assert_eq!(Stage::CacheChecking.to_string(), "cache_checking");
        assert_eq!(Stage::from_str("generating").unwrap(), Stage::Generating);
    }

    #[test]
    fn audit_enums_serialize_snake_case() {
        let json = serde_json::to_string(&AuditCategory::Security).unwrap();
        assert_eq!(json, "\"security\"");
        let sev: AuditSeverity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(sev, AuditSeverity::Warning);
    }
}
