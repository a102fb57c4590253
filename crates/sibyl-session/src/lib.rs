// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-(user, channel) conversational sessions with activity-based expiry.
//!
//! At most one active session exists per pair; creation is an atomic
//! insert-if-absent so concurrent first contact cannot race a duplicate
//! into place. Activity updates are last-writer-wins -- session context is
//! advisory, not authoritative. Expiry only flags sessions inactive; a
//! reaper invoked on a fixed interval does the sweeping and never runs
//! concurrently with itself.

use std::sync::Arc;
use std::time::Duration;

use sibyl_audit::AuditLog;
use sibyl_core::types::{AuditCategory, AuditSeverity, Principal, Session};
use sibyl_core::SibylError;
use sibyl_storage::queries::sessions;
use sibyl_storage::time::{iso_before, now_iso};
use sibyl_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Store of conversational sessions.
pub struct SessionStore {
    db: Arc<Database>,
    audit: AuditLog,
    idle_threshold: Duration,
    /// Single-flight guard for the reaper.
    reap_gate: tokio::sync::Mutex<()>,
}

impl SessionStore {
    pub fn new(db: Arc<Database>, audit: AuditLog, idle_threshold: Duration) -> Self {
        Self {
            db,
            audit,
            idle_threshold,
            reap_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the active session for (principal, channel), creating one if
    /// absent. Safe under concurrent first contact for the same pair.
    pub async fn get_or_create(
        &self,
        principal: &Principal,
        channel_id: &str,
    ) -> Result<Session, SibylError> {
        let candidate_id = uuid::Uuid::new_v4().to_string();
        let session = sessions::get_or_create(
            &self.db,
            principal.as_str(),
            channel_id,
            &candidate_id,
            &now_iso(),
        )
        .await?;
        if session.id == candidate_id {
            debug!(session_id = %session.id, principal = %principal, "session created");
        }
        Ok(session)
    }

    /// Record activity on a session and optionally replace its context.
    pub async fn touch(
        &self,
        session_id: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<(), SibylError> {
        let context_text = context.map(|v| v.to_string());
        sessions::touch(&self.db, session_id, context_text.as_deref(), &now_iso()).await
    }

    /// Fetch a session by id.
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>, SibylError> {
        sessions::get_session(&self.db, session_id).await
    }

    /// Flag sessions idle past the configured threshold as inactive.
    ///
    /// Single-flight: if a sweep is already running, this returns `None`
    /// without touching anything. Returns `Some(count)` otherwise.
    pub async fn expire_idle(&self) -> Result<Option<u64>, SibylError> {
        self.expire_older_than_inner(self.idle_threshold).await
    }

    /// Operator variant with an explicit threshold; the action is audited.
    pub async fn expire_older_than(
        &self,
        threshold: Duration,
        operator: &str,
    ) -> Result<Option<u64>, SibylError> {
        let expired = self.expire_older_than_inner(threshold).await?;

        if let Some(count) = expired {
            let mut entry = sibyl_audit::entry(
                "sessions_expired",
                AuditCategory::System,
                AuditSeverity::Info,
                operator,
            );
            entry.payload = Some(
                serde_json::json!({
                    "threshold_secs": threshold.as_secs(),
                    "expired": count,
                })
                .to_string(),
            );
            self.audit.record(entry).await?;
        }
        Ok(expired)
    }

    async fn expire_older_than_inner(
        &self,
        threshold: Duration,
    ) -> Result<Option<u64>, SibylError> {
        let Ok(_guard) = self.reap_gate.try_lock() else {
            debug!("session reap already in flight, skipping");
            return Ok(None);
        };
        let cutoff = iso_before(threshold);
        let expired = sessions::expire_idle(&self.db, &cutoff, &now_iso()).await?;
        if expired > 0 {
            info!(expired, "flagged idle sessions inactive");
        }
        Ok(Some(expired))
    }
}

/// Drive the idle reaper on a fixed interval until cancelled. Scheduled by
/// the serve wiring, never inline by the orchestrator.
pub async fn run_reaper(store: Arc<SessionStore>, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = store.expire_idle().await {
                    warn!(error = %e, "session reap failed");
                }
            }
            _ = cancel.cancelled() => {
                debug!("session reaper stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn store_with_threshold(
        threshold: Duration,
    ) -> (Arc<SessionStore>, AuditLog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        let audit = AuditLog::new(db.clone());
        (
            Arc::new(SessionStore::new(db, audit.clone(), threshold)),
            audit,
            dir,
        )
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_exactly_one_session() {
        let (store, _audit, _dir) = store_with_threshold(Duration::from_secs(3600)).await;

        let mut handles = Vec::new();
        for _ in 0..12 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .get_or_create(&Principal::from("u1"), "c1")
                    .await
                    .unwrap()
                    .id
            }));
        }
        let mut ids = std::collections::HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap());
        }
        assert_eq!(ids.len(), 1);
    }

    #[tokio::test]
    async fn touch_replaces_context_last_writer_wins() {
        let (store, _audit, _dir) = store_with_threshold(Duration::from_secs(3600)).await;
        let session = store
            .get_or_create(&Principal::from("u1"), "c1")
            .await
            .unwrap();

        store
            .touch(&session.id, Some(&serde_json::json!({"last_table": "SALES"})))
            .await
            .unwrap();
        store
            .touch(&session.id, Some(&serde_json::json!({"last_table": "ORDERS"})))
            .await
            .unwrap();

        let reread = store.get(&session.id).await.unwrap().unwrap();
        let context: serde_json::Value =
            serde_json::from_str(reread.context.as_deref().unwrap()).unwrap();
        assert_eq!(context["last_table"], "ORDERS");
    }

    #[tokio::test]
    async fn idle_sessions_are_flagged_and_pair_gets_a_fresh_one() {
        let (store, _audit, _dir) = store_with_threshold(Duration::from_millis(10)).await;
        let old = store
            .get_or_create(&Principal::from("u1"), "c1")
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        let expired = store.expire_idle().await.unwrap();
        assert_eq!(expired, Some(1));

        let row = store.get(&old.id).await.unwrap().unwrap();
        assert!(!row.active);

        let fresh = store
            .get_or_create(&Principal::from("u1"), "c1")
            .await
            .unwrap();
        assert_ne!(fresh.id, old.id);
    }

    #[tokio::test]
    async fn operator_expiry_is_audited() {
        let (store, audit, _dir) = store_with_threshold(Duration::from_secs(3600)).await;
        store
            .get_or_create(&Principal::from("u1"), "c1")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Zero threshold: everything created before this call is idle.
        let expired = store
            .expire_older_than(Duration::from_secs(0), "operator")
            .await
            .unwrap();
        assert_eq!(expired, Some(1));

        let entries = audit
            .recent(Some(AuditCategory::System), None, 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "sessions_expired");
    }

    #[tokio::test]
    async fn reaper_task_stops_on_cancel() {
        let (store, _audit, _dir) = store_with_threshold(Duration::from_secs(3600)).await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_reaper(
            store,
            Duration::from_millis(10),
            cancel.clone(),
        ));
        tokio::time::sleep(Duration::from_millis(40)).await;
        cancel.cancel();
        handle.await.unwrap();
    }
}
