// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session row operations.
//!
//! The active-session uniqueness invariant lives in the schema (partial
//! unique index on (principal, channel_id) WHERE active = 1); get-or-create
//! is insert-if-absent inside a single writer closure, never read-then-write
//! across round trips.

use rusqlite::params;
use sibyl_core::SibylError;

use crate::database::Database;
use crate::models::Session;

fn row_to_session(row: &rusqlite::Row<'_>) -> Result<Session, rusqlite::Error> {
    Ok(Session {
        id: row.get(0)?,
        principal: row.get(1)?,
        channel_id: row.get(2)?,
        context: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        last_activity_at: row.get(6)?,
        active: row.get(7)?,
        expires_at: row.get(8)?,
    })
}

const SESSION_COLUMNS: &str = "id, principal, channel_id, context, created_at, updated_at,
     last_activity_at, active, expires_at";

/// Get the active session for (principal, channel), creating it if absent.
///
/// `candidate_id` is used only when a new row is inserted; concurrent
/// first-contact callers race on the insert and all read back the single
/// surviving row.
pub async fn get_or_create(
    db: &Database,
    principal: &str,
    channel_id: &str,
    candidate_id: &str,
    now: &str,
) -> Result<Session, SibylError> {
    let principal = principal.to_string();
    let channel_id = channel_id.to_string();
    let candidate_id = candidate_id.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            // OR IGNORE defers to the partial unique index; losing the race
            // leaves the existing active row in place.
            conn.execute(
                "INSERT OR IGNORE INTO sessions
                     (id, principal, channel_id, context, created_at, updated_at,
                      last_activity_at, active, expires_at)
                 VALUES (?1, ?2, ?3, NULL, ?4, ?4, ?4, 1, NULL)",
                params![candidate_id, principal, channel_id, now],
            )?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions
                 WHERE principal = ?1 AND channel_id = ?2 AND active = 1"
            ))?;
            stmt.query_row(params![principal, channel_id], row_to_session)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<Session>, SibylError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;
            let result = stmt.query_row(params![id], row_to_session);
            match result {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update a session's activity timestamp and (optionally) its context.
///
/// Last-writer-wins: concurrent touches for the same session do not
/// serialize against each other beyond the writer thread itself.
pub async fn touch(
    db: &Database,
    id: &str,
    context: Option<&str>,
    now: &str,
) -> Result<(), SibylError> {
    let id = id.to_string();
    let context = context.map(|s| s.to_string());
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET last_activity_at = ?1, updated_at = ?1,
                     context = COALESCE(?2, context)
                 WHERE id = ?3",
                params![now, context, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flag sessions idle since before `cutoff` (or past their explicit expiry)
/// as inactive. Returns the number of sessions expired.
///
/// Rows are never deleted here; inactive sessions remain as history.
pub async fn expire_idle(db: &Database, cutoff: &str, now: &str) -> Result<u64, SibylError> {
    let cutoff = cutoff.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE sessions SET active = 0, updated_at = ?2
                 WHERE active = 1
                   AND (last_activity_at < ?1
                        OR (expires_at IS NOT NULL AND expires_at <= ?2))",
                params![cutoff, now],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::{iso_before, now_iso};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let db = Database::open(db_path.to_str().unwrap()).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn get_or_create_returns_same_row_for_same_pair() {
        let (db, _dir) = setup_db().await;
        let now = now_iso();
        let a = get_or_create(&db, "u1", "c1", "sess-a", &now).await.unwrap();
        let b = get_or_create(&db, "u1", "c1", "sess-b", &now).await.unwrap();
        assert_eq!(a.id, "sess-a");
        assert_eq!(b.id, "sess-a", "second caller must see the first row");
        assert!(b.active);
    }

    #[tokio::test]
    async fn different_channels_get_distinct_sessions() {
        let (db, _dir) = setup_db().await;
        let now = now_iso();
        let a = get_or_create(&db, "u1", "c1", "s1", &now).await.unwrap();
        let b = get_or_create(&db, "u1", "c2", "s2", &now).await.unwrap();
        assert_ne!(a.id, b.id);
    }

    #[tokio::test]
    async fn touch_updates_activity_and_context() {
        let (db, _dir) = setup_db().await;
        let created = iso_before(Duration::from_secs(10));
        let s = get_or_create(&db, "u1", "c1", "s1", &created).await.unwrap();

        let later = now_iso();
        touch(&db, &s.id, Some(r#"{"last_table":"SALES"}"#), &later)
            .await
            .unwrap();

        let reread = get_session(&db, &s.id).await.unwrap().unwrap();
        assert_eq!(reread.last_activity_at, later);
        assert_eq!(reread.context.as_deref(), Some(r#"{"last_table":"SALES"}"#));

        // Touch without context preserves the existing context.
        touch(&db, &s.id, None, &now_iso()).await.unwrap();
        let reread = get_session(&db, &s.id).await.unwrap().unwrap();
        assert_eq!(reread.context.as_deref(), Some(r#"{"last_table":"SALES"}"#));
    }

    #[tokio::test]
    async fn expire_idle_flags_but_never_deletes() {
        let (db, _dir) = setup_db().await;
        let stale = iso_before(Duration::from_secs(7200));
        let s = get_or_create(&db, "u1", "c1", "s1", &stale).await.unwrap();

        let cutoff = iso_before(Duration::from_secs(3600));
        let expired = expire_idle(&db, &cutoff, &now_iso()).await.unwrap();
        assert_eq!(expired, 1);

        let row = get_session(&db, &s.id).await.unwrap().unwrap();
        assert!(!row.active, "session must be flagged inactive");

        // A new get_or_create for the pair now creates a fresh session.
        let fresh = get_or_create(&db, "u1", "c1", "s2", &now_iso()).await.unwrap();
        assert_eq!(fresh.id, "s2");
    }

    #[tokio::test]
    async fn concurrent_get_or_create_yields_one_active_row() {
        let (db, _dir) = setup_db().await;
        let db = std::sync::Arc::new(db);

        let mut handles = Vec::new();
        for i in 0..16 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                let now = now_iso();
                get_or_create(&db, "u1", "c1", &format!("cand-{i}"), &now)
                    .await
                    .unwrap()
            }));
        }

        let mut ids = std::collections::HashSet::new();
        for h in handles {
            ids.insert(h.await.unwrap().id);
        }
        assert_eq!(ids.len(), 1, "all callers must converge on one session");
    }
}
