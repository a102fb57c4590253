// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log of security and operational events.
//!
//! Every component writes here: the permission guard on denials, the rate
//! limiter on administrative resets, the orchestrator on every terminal
//! state. Entries are durable before [`AuditLog::record`] returns. When a
//! write fails, the primary operation must not fail with it --
//! [`AuditLog::record_or_degrade`] logs the failure for operators and
//! carries on.

use std::sync::Arc;

use sibyl_core::types::{AuditCategory, AuditEntry, AuditSeverity};
use sibyl_core::SibylError;
use sibyl_storage::queries::audit as audit_queries;
use sibyl_storage::time::now_iso;
use sibyl_storage::Database;
use tracing::{debug, error};

/// Construct a new audit entry with a fresh id and timestamp. Session and
/// payload fields start empty and are set by the caller as needed.
pub fn entry(
    event_type: &str,
    category: AuditCategory,
    severity: AuditSeverity,
    principal: &str,
) -> AuditEntry {
    AuditEntry {
        id: uuid::Uuid::new_v4().to_string(),
        event_type: event_type.to_string(),
        category,
        severity,
        principal: principal.to_string(),
        session_id: None,
        payload: None,
        created_at: now_iso(),
    }
}

/// Handle to the audit collection.
#[derive(Clone)]
pub struct AuditLog {
    db: Arc<Database>,
}

impl AuditLog {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Durably append an entry. Returns once the row is written.
    pub async fn record(&self, entry: AuditEntry) -> Result<(), SibylError> {
        audit_queries::insert_entry(&self.db, &entry).await?;
        debug!(
            event_type = %entry.event_type,
            category = %entry.category,
            principal = %entry.principal,
            "audit entry recorded"
        );
        Ok(())
    }

    /// Append an entry, treating a write failure as degraded but non-fatal.
    ///
    /// The failure is surfaced to operators via the error log, never to the
    /// caller: auditing must not take the primary operation down with it.
    pub async fn record_or_degrade(&self, entry: AuditEntry) {
        let event_type = entry.event_type.clone();
        if let Err(e) = self.record(entry).await {
            error!(
                event_type = %event_type,
                error = %e,
                "audit write failed; continuing degraded"
            );
        }
    }

    /// Recent entries for operator review, newest first.
    pub async fn recent(
        &self,
        category: Option<AuditCategory>,
        principal: Option<&str>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, SibylError> {
        audit_queries::recent(&self.db, category, principal, limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (AuditLog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (AuditLog::new(Arc::new(db)), dir)
    }

    #[tokio::test]
    async fn record_is_readable_back_in_order() {
        let (log, _dir) = setup().await;

        let mut first = entry(
            "rate_limit_reset",
            AuditCategory::System,
            AuditSeverity::Info,
            "operator",
        );
        first.payload = Some(r#"{"target":"u1"}"#.to_string());
        first.created_at = "2026-01-01T00:00:00.000Z".to_string();
        log.record(first).await.unwrap();

        let mut second = entry(
            "query_denied",
            AuditCategory::Security,
            AuditSeverity::Warning,
            "u1",
        );
        second.created_at = "2026-01-02T00:00:00.000Z".to_string();
        log.record(second).await.unwrap();

        let all = log.recent(None, None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].event_type, "query_denied");
        assert_eq!(all[1].event_type, "rate_limit_reset");
    }

    #[tokio::test]
    async fn entry_helper_fills_id_and_timestamp() {
        let e = entry("x", AuditCategory::Query, AuditSeverity::Info, "u1");
        assert!(!e.id.is_empty());
        assert!(!e.created_at.is_empty());
        assert!(e.session_id.is_none());
        assert!(e.payload.is_none());
    }

    #[tokio::test]
    async fn degraded_write_does_not_panic_or_propagate() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("gone.db").to_str().unwrap())
            .await
            .unwrap();
        let log = AuditLog::new(Arc::new(db));
        // Entry with a duplicate id forces a constraint failure on the
        // second write; record_or_degrade must swallow it.
        let mut a = entry("dup", AuditCategory::System, AuditSeverity::Info, "u1");
        a.id = "fixed-id".to_string();
        let mut b = entry("dup", AuditCategory::System, AuditSeverity::Info, "u1");
        b.id = "fixed-id".to_string();

        log.record(a).await.unwrap();
        log.record_or_degrade(b).await;

        assert_eq!(log.recent(None, None, 10).await.unwrap().len(), 1);
    }
}
