// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Audit entry operations. Insert-only; the application never updates or
//! deletes audit rows.

use std::str::FromStr;

use rusqlite::params;
use sibyl_core::types::{AuditCategory, AuditSeverity};
use sibyl_core::SibylError;

use crate::database::Database;
use crate::models::AuditEntry;

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<AuditEntry, rusqlite::Error> {
    let category_text: String = row.get(2)?;
    let severity_text: String = row.get(3)?;
    let category = AuditCategory::from_str(&category_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let severity = AuditSeverity::from_str(&severity_text).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(AuditEntry {
        id: row.get(0)?,
        event_type: row.get(1)?,
        category,
        severity,
        principal: row.get(4)?,
        session_id: row.get(5)?,
        payload: row.get(6)?,
        created_at: row.get(7)?,
    })
}

const ENTRY_COLUMNS: &str =
    "id, event_type, category, severity, principal, session_id, payload, created_at";

/// Append an audit entry.
pub async fn insert_entry(db: &Database, entry: &AuditEntry) -> Result<(), SibylError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO audit_entries
                     (id, event_type, category, severity, principal, session_id,
                      payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entry.id,
                    entry.event_type,
                    entry.category.to_string(),
                    entry.severity.to_string(),
                    entry.principal,
                    entry.session_id,
                    entry.payload,
                    entry.created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Recent entries, newest first, optionally filtered by category and/or
/// principal. Used by operator tooling.
pub async fn recent(
    db: &Database,
    category: Option<AuditCategory>,
    principal: Option<&str>,
    limit: i64,
) -> Result<Vec<AuditEntry>, SibylError> {
    let category = category.map(|c| c.to_string());
    let principal = principal.map(|p| p.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_entries
                 WHERE (?1 IS NULL OR category = ?1)
                   AND (?2 IS NULL OR principal = ?2)
                 ORDER BY created_at DESC LIMIT ?3"
            ))?;
            let rows = stmt.query_map(params![category, principal, limit], row_to_entry)?;
            let mut entries = Vec::new();
            for row in rows {
                entries.push(row?);
            }
            Ok(entries)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now_iso;
    use tempfile::tempdir;

    fn make_entry(id: &str, category: AuditCategory, principal: &str) -> AuditEntry {
        AuditEntry {
            id: id.to_string(),
            event_type: "query_complete".to_string(),
            category,
            severity: AuditSeverity::Info,
            principal: principal.to_string(),
            session_id: Some("sess-1".to_string()),
            payload: Some(r#"{"status":"succeeded"}"#.to_string()),
            created_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn insert_and_filter_by_category_and_principal() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        insert_entry(&db, &make_entry("a1", AuditCategory::Query, "u1"))
            .await
            .unwrap();
        insert_entry(&db, &make_entry("a2", AuditCategory::Security, "u1"))
            .await
            .unwrap();
        insert_entry(&db, &make_entry("a3", AuditCategory::Query, "u2"))
            .await
            .unwrap();

        let all = recent(&db, None, None, 10).await.unwrap();
        assert_eq!(all.len(), 3);

        let security = recent(&db, Some(AuditCategory::Security), None, 10)
            .await
            .unwrap();
        assert_eq!(security.len(), 1);
        assert_eq!(security[0].id, "a2");

        let u1_queries = recent(&db, Some(AuditCategory::Query), Some("u1"), 10)
            .await
            .unwrap();
        assert_eq!(u1_queries.len(), 1);
        assert_eq!(u1_queries[0].id, "a1");
    }
}
