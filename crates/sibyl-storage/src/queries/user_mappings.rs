// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User mapping operations backing the local-table identity resolver.
//!
//! Roles and capabilities are stored as JSON arrays in TEXT columns.

use rusqlite::params;
use sibyl_core::SibylError;

use crate::database::Database;
use crate::models::UserMapping;

fn row_to_mapping(row: &rusqlite::Row<'_>) -> Result<UserMapping, rusqlite::Error> {
    let roles_json: String = row.get(5)?;
    let caps_json: String = row.get(6)?;
    let parse = |col: usize, text: &str| -> Result<Vec<String>, rusqlite::Error> {
        serde_json::from_str(text).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                col,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };
    Ok(UserMapping {
        chat_user_id: row.get(0)?,
        principal: row.get(1)?,
        directory_id: row.get(2)?,
        email: row.get(3)?,
        full_name: row.get(4)?,
        roles: parse(5, &roles_json)?,
        capabilities: parse(6, &caps_json)?,
        active: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

const MAPPING_COLUMNS: &str = "chat_user_id, principal, directory_id, email, full_name,
     roles, capabilities, active, created_at, updated_at";

/// Create or update a mapping, keyed by chat user id.
pub async fn upsert_mapping(db: &Database, mapping: &UserMapping) -> Result<(), SibylError> {
    let mapping = mapping.clone();
    let roles_json = serde_json::to_string(&mapping.roles)
        .map_err(|e| SibylError::Internal(format!("roles serialization: {e}")))?;
    let caps_json = serde_json::to_string(&mapping.capabilities)
        .map_err(|e| SibylError::Internal(format!("capabilities serialization: {e}")))?;
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO user_mappings
                     (chat_user_id, principal, directory_id, email, full_name,
                      roles, capabilities, active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (chat_user_id) DO UPDATE SET
                     principal = excluded.principal,
                     directory_id = excluded.directory_id,
                     email = excluded.email,
                     full_name = excluded.full_name,
                     roles = excluded.roles,
                     capabilities = excluded.capabilities,
                     active = excluded.active,
                     updated_at = excluded.updated_at",
                params![
                    mapping.chat_user_id,
                    mapping.principal,
                    mapping.directory_id,
                    mapping.email,
                    mapping.full_name,
                    roles_json,
                    caps_json,
                    mapping.active,
                    mapping.created_at,
                    mapping.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get the active mapping for an internal principal.
pub async fn get_by_principal(
    db: &Database,
    principal: &str,
) -> Result<Option<UserMapping>, SibylError> {
    let principal = principal.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM user_mappings
                 WHERE principal = ?1 AND active = 1"
            ))?;
            match stmt.query_row(params![principal], row_to_mapping) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a mapping by chat-platform user id, active or not (operator view).
pub async fn get_by_chat_user(
    db: &Database,
    chat_user_id: &str,
) -> Result<Option<UserMapping>, SibylError> {
    let chat_user_id = chat_user_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {MAPPING_COLUMNS} FROM user_mappings WHERE chat_user_id = ?1"
            ))?;
            match stmt.query_row(params![chat_user_id], row_to_mapping) {
                Ok(m) => Ok(Some(m)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now_iso;
    use tempfile::tempdir;

    fn make_mapping(chat: &str, principal: &str) -> UserMapping {
        UserMapping {
            chat_user_id: chat.to_string(),
            principal: principal.to_string(),
            directory_id: Some("jdoe".to_string()),
            email: Some("jdoe@example.com".to_string()),
            full_name: Some("Jane Doe".to_string()),
            roles: vec!["analyst".to_string()],
            capabilities: vec![],
            active: true,
            created_at: now_iso(),
            updated_at: now_iso(),
        }
    }

    #[tokio::test]
    async fn upsert_then_get_round_trips_json_arrays() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        upsert_mapping(&db, &make_mapping("U123", "jane")).await.unwrap();
        let m = get_by_principal(&db, "jane").await.unwrap().unwrap();
        assert_eq!(m.chat_user_id, "U123");
        assert_eq!(m.roles, vec!["analyst"]);

        // Upsert replaces roles on conflict.
        let mut updated = make_mapping("U123", "jane");
        updated.roles = vec!["analyst".to_string(), "admin".to_string()];
        upsert_mapping(&db, &updated).await.unwrap();
        let m = get_by_chat_user(&db, "U123").await.unwrap().unwrap();
        assert_eq!(m.roles.len(), 2);
    }

    #[tokio::test]
    async fn inactive_mapping_is_hidden_from_principal_lookup() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();

        let mut m = make_mapping("U9", "ghost");
        m.active = false;
        upsert_mapping(&db, &m).await.unwrap();

        assert!(get_by_principal(&db, "ghost").await.unwrap().is_none());
        // Operator lookup still sees it.
        assert!(get_by_chat_user(&db, "U9").await.unwrap().is_some());
    }
}
