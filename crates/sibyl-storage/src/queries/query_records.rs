// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query record operations.
//!
//! Status transitions are guarded here: a record moves only forward through
//! its lifecycle, and terminal states are frozen. Updates that would violate
//! that are rejected with an error rather than silently applied.

use std::str::FromStr;

use rusqlite::params;
use sibyl_core::types::QueryStatus;
use sibyl_core::SibylError;

use crate::database::Database;
use crate::models::QueryRecord;

fn row_to_record(row: &rusqlite::Row<'_>) -> Result<QueryRecord, rusqlite::Error> {
    let status_text: String = row.get(6)?;
    let status = QueryStatus::from_str(&status_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(QueryRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        principal: row.get(2)?,
        channel_id: row.get(3)?,
        question: row.get(4)?,
        generated_sql: row.get(5)?,
        status,
        result: row.get(7)?,
        row_count: row.get(8)?,
        duration_ms: row.get(9)?,
        error_detail: row.get(10)?,
        created_at: row.get(11)?,
        executed_at: row.get(12)?,
        completed_at: row.get(13)?,
    })
}

const RECORD_COLUMNS: &str = "id, session_id, principal, channel_id, question, generated_sql,
     status, result, row_count, duration_ms, error_detail, created_at, executed_at, completed_at";

/// Insert a new pending record.
pub async fn insert_record(db: &Database, record: &QueryRecord) -> Result<(), SibylError> {
    let record = record.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO query_records
                     (id, session_id, principal, channel_id, question, generated_sql,
                      status, result, row_count, duration_ms, error_detail,
                      created_at, executed_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    record.id,
                    record.session_id,
                    record.principal,
                    record.channel_id,
                    record.question,
                    record.generated_sql,
                    record.status.to_string(),
                    record.result,
                    record.row_count,
                    record.duration_ms,
                    record.error_detail,
                    record.created_at,
                    record.executed_at,
                    record.completed_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a record by id.
pub async fn get_record(db: &Database, id: &str) -> Result<Option<QueryRecord>, SibylError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM query_records WHERE id = ?1"
            ))?;
            match stmt.query_row(params![id], row_to_record) {
                Ok(r) => Ok(Some(r)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Advance a record to `next` status, enforcing forward-only transitions.
///
/// For terminal states, `completed_at` must be supplied; the optional
/// fields (sql, result, error detail, timings) are written when given.
/// Returns the error if the record is missing or the transition is invalid.
#[allow(clippy::too_many_arguments)]
pub async fn advance_status(
    db: &Database,
    id: &str,
    next: QueryStatus,
    generated_sql: Option<String>,
    result: Option<String>,
    row_count: Option<i64>,
    duration_ms: Option<i64>,
    error_detail: Option<String>,
    executed_at: Option<String>,
    completed_at: Option<String>,
) -> Result<(), SibylError> {
    debug_assert_eq!(next.is_terminal(), completed_at.is_some());
    let id_owned = id.to_string();
    let applied = db
        .connection()
        .call(move |conn| {
            let id = id_owned;
            let tx = conn.transaction()?;
            let current_text: String = tx.query_row(
                "SELECT status FROM query_records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )?;
            let current = QueryStatus::from_str(&current_text).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            if !current.can_advance_to(next) {
                tx.commit()?;
                return Ok(false);
            }
            tx.execute(
                "UPDATE query_records
                 SET status = ?2,
                     generated_sql = COALESCE(?3, generated_sql),
                     result = COALESCE(?4, result),
                     row_count = COALESCE(?5, row_count),
                     duration_ms = COALESCE(?6, duration_ms),
                     error_detail = COALESCE(?7, error_detail),
                     executed_at = COALESCE(?8, executed_at),
                     completed_at = COALESCE(?9, completed_at)
                 WHERE id = ?1",
                params![
                    id,
                    next.to_string(),
                    generated_sql,
                    result,
                    row_count,
                    duration_ms,
                    error_detail,
                    executed_at,
                    completed_at,
                ],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
        .map_err(crate::database::map_tr_err)?;

    if !applied {
        return Err(SibylError::Internal(format!(
            "rejected status transition to {next} for query record {id}"
        )));
    }
    Ok(())
}

/// Mark when warehouse execution began, independent of status.
pub async fn set_executed_at(db: &Database, id: &str, at: &str) -> Result<(), SibylError> {
    let id = id.to_string();
    let at = at.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE query_records SET executed_at = ?2 WHERE id = ?1",
                params![id, at],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// The SQL last generated for this exact question within a session, if a
/// prior attempt succeeded. Lets a repeated question reach the result
/// cache without calling the generation service at all.
pub async fn latest_sql_for_question(
    db: &Database,
    session_id: &str,
    question: &str,
) -> Result<Option<String>, SibylError> {
    let session_id = session_id.to_string();
    let question = question.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT generated_sql FROM query_records
                 WHERE session_id = ?1 AND question = ?2
                   AND status = 'succeeded' AND generated_sql IS NOT NULL
                 ORDER BY created_at DESC LIMIT 1",
                params![session_id, question],
                |row| row.get::<_, Option<String>>(0),
            );
            match result {
                Ok(sql) => Ok(sql),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Recent records for a principal, newest first.
pub async fn recent_for_principal(
    db: &Database,
    principal: &str,
    limit: i64,
) -> Result<Vec<QueryRecord>, SibylError> {
    let principal = principal.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {RECORD_COLUMNS} FROM query_records
                 WHERE principal = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![principal, limit], row_to_record)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::sessions;
    use crate::time::now_iso;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        let session = sessions::get_or_create(&db, "u1", "c1", "sess-1", &now_iso())
            .await
            .unwrap();
        (db, dir, session.id)
    }

    fn make_record(id: &str, session_id: &str) -> QueryRecord {
        QueryRecord {
            id: id.to_string(),
            session_id: session_id.to_string(),
            principal: "u1".to_string(),
            channel_id: "c1".to_string(),
            question: "what was revenue last month".to_string(),
            generated_sql: None,
            status: QueryStatus::Pending,
            result: None,
            row_count: 0,
            duration_ms: None,
            error_detail: None,
            created_at: now_iso(),
            executed_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn insert_and_get_round_trips() {
        let (db, _dir, sid) = setup().await;
        insert_record(&db, &make_record("q1", &sid)).await.unwrap();
        let r = get_record(&db, "q1").await.unwrap().unwrap();
        assert_eq!(r.status, QueryStatus::Pending);
        assert_eq!(r.question, "what was revenue last month");
    }

    #[tokio::test]
    async fn status_advances_forward_and_freezes_at_terminal() {
        let (db, _dir, sid) = setup().await;
        insert_record(&db, &make_record("q1", &sid)).await.unwrap();

        advance_status(
            &db,
            "q1",
            QueryStatus::Running,
            None,
            None,
            None,
            None,
            None,
            Some(now_iso()),
            None,
        )
        .await
        .unwrap();

        advance_status(
            &db,
            "q1",
            QueryStatus::Succeeded,
            Some("SELECT 1".into()),
            Some("{\"rows\":[]}".into()),
            Some(0),
            Some(1200),
            None,
            None,
            Some(now_iso()),
        )
        .await
        .unwrap();

        let r = get_record(&db, "q1").await.unwrap().unwrap();
        assert_eq!(r.status, QueryStatus::Succeeded);
        assert!(r.completed_at.is_some());

        // Any further transition out of a terminal state is rejected.
        let err = advance_status(
            &db,
            "q1",
            QueryStatus::Failed,
            None,
            None,
            None,
            None,
            Some("late failure".into()),
            None,
            Some(now_iso()),
        )
        .await;
        assert!(err.is_err(), "terminal records must be frozen");

        let r = get_record(&db, "q1").await.unwrap().unwrap();
        assert_eq!(r.status, QueryStatus::Succeeded, "status unchanged");
    }

    #[tokio::test]
    async fn backwards_transition_is_rejected() {
        let (db, _dir, sid) = setup().await;
        insert_record(&db, &make_record("q2", &sid)).await.unwrap();
        advance_status(
            &db,
            "q2",
            QueryStatus::Running,
            None,
            None,
            None,
            None,
            None,
            Some(now_iso()),
            None,
        )
        .await
        .unwrap();

        // Running -> Running is not a forward move.
        let err = advance_status(
            &db, "q2", QueryStatus::Running, None, None, None, None, None, None, None,
        )
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn recent_for_principal_orders_newest_first() {
        let (db, _dir, sid) = setup().await;
        for i in 0..3 {
            let mut r = make_record(&format!("q{i}"), &sid);
            r.created_at = format!("2026-01-0{}T00:00:00.000Z", i + 1);
            insert_record(&db, &r).await.unwrap();
        }
        let recent = recent_for_principal(&db, "u1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].id, "q2");
        assert_eq!(recent[1].id, "q1");
    }
}
