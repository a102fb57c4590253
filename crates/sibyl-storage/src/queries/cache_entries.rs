// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache entry row operations.
//!
//! Lookup-and-touch and upsert each run inside a single writer closure, so
//! concurrent orchestrator instances see atomic read-modify-write behavior
//! without any lock held across a round trip.

use rusqlite::params;
use sibyl_core::SibylError;

use crate::database::Database;
use crate::models::CacheEntry;

fn row_to_entry(row: &rusqlite::Row<'_>) -> Result<CacheEntry, rusqlite::Error> {
    Ok(CacheEntry {
        key: row.get(0)?,
        sql: row.get(1)?,
        payload: row.get(2)?,
        row_count: row.get(3)?,
        duration_ms: row.get(4)?,
        hit_count: row.get(5)?,
        created_at: row.get(6)?,
        last_hit_at: row.get(7)?,
        expires_at: row.get(8)?,
        valid: row.get(9)?,
        invalidated_reason: row.get(10)?,
    })
}

const ENTRY_COLUMNS: &str = "key, sql, payload, row_count, duration_ms, hit_count,
     created_at, last_hit_at, expires_at, valid, invalidated_reason";

/// Return the entry for `key` if it is valid and unexpired, atomically
/// bumping its hit count and last-hit timestamp.
///
/// The expiry check happens here on every lookup; the background sweep is
/// only housekeeping. A hit never extends `expires_at`.
pub async fn lookup_and_touch(
    db: &Database,
    key: &str,
    now: &str,
) -> Result<Option<CacheEntry>, SibylError> {
    let key = key.to_string();
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let found = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM cache_entries
                     WHERE key = ?1 AND valid = 1 AND expires_at > ?2"
                ))?;
                match stmt.query_row(params![key, now], row_to_entry) {
                    Ok(entry) => Some(entry),
                    Err(rusqlite::Error::QueryReturnedNoRows) => None,
                    Err(e) => return Err(e),
                }
            };
            let result = match found {
                Some(mut entry) => {
                    tx.execute(
                        "UPDATE cache_entries
                         SET hit_count = hit_count + 1, last_hit_at = ?2
                         WHERE key = ?1",
                        params![key, now],
                    )?;
                    entry.hit_count += 1;
                    entry.last_hit_at = now;
                    Some(entry)
                }
                None => None,
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Insert or replace the entry for `key`. Last writer wins; a store over
/// an invalidated entry revalidates it with the fresh payload and expiry.
/// The hit counter survives the overwrite so its history stays monotonic.
pub async fn upsert_entry(db: &Database, entry: &CacheEntry) -> Result<(), SibylError> {
    let entry = entry.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO cache_entries
                     (key, sql, payload, row_count, duration_ms, hit_count,
                      created_at, last_hit_at, expires_at, valid, invalidated_reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6, ?7, 1, NULL)
                 ON CONFLICT (key) DO UPDATE SET
                     sql = excluded.sql,
                     payload = excluded.payload,
                     row_count = excluded.row_count,
                     duration_ms = excluded.duration_ms,
                     created_at = excluded.created_at,
                     last_hit_at = excluded.last_hit_at,
                     expires_at = excluded.expires_at,
                     valid = 1,
                     invalidated_reason = NULL",
                params![
                    entry.key,
                    entry.sql,
                    entry.payload,
                    entry.row_count,
                    entry.duration_ms,
                    entry.created_at,
                    entry.expires_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Flag an entry invalid, recording the reason. The row is kept so hit and
/// latency history remain available for diagnostics. Returns whether a row
/// was affected.
pub async fn invalidate(db: &Database, key: &str, reason: &str) -> Result<bool, SibylError> {
    let key = key.to_string();
    let reason = reason.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE cache_entries SET valid = 0, invalidated_reason = ?2
                 WHERE key = ?1",
                params![key, reason],
            )?;
            Ok(n > 0)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete entries whose expiry has passed. Returns how many were purged.
pub async fn purge_expired(db: &Database, now: &str) -> Result<u64, SibylError> {
    let now = now.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![now],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Fetch an entry regardless of validity or expiry (diagnostics).
pub async fn get_raw(db: &Database, key: &str) -> Result<Option<CacheEntry>, SibylError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ENTRY_COLUMNS} FROM cache_entries WHERE key = ?1"
            ))?;
            match stmt.query_row(params![key], row_to_entry) {
                Ok(e) => Ok(Some(e)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}
