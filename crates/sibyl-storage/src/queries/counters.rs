// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Rate counter operations.
//!
//! Counters are bucketed by key (`scope:windowBucket`); a rolled-over
//! window simply lands on a new key, so counts reset by bucketing, never
//! by decrement. The conditional increment is one SQL statement, which is
//! the atomic increment-and-check primitive the limiter builds on.

use rusqlite::params;
use sibyl_core::SibylError;

use crate::database::Database;

/// Atomically increment `key` if its count is below `limit`.
///
/// Returns `Some(new_count)` when applied, `None` when already at limit.
pub async fn try_increment(
    db: &Database,
    key: &str,
    limit: u64,
    window_start: &str,
    window_secs: u64,
) -> Result<Option<u64>, SibylError> {
    let key = key.to_string();
    let window_start = window_start.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "INSERT INTO rate_counters (key, count, window_start, window_secs)
                 VALUES (?1, 1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET count = count + 1
                     WHERE rate_counters.count < ?4
                 RETURNING count",
                params![key, window_start, window_secs as i64, limit as i64],
                |row| row.get::<_, i64>(0),
            );
            match result {
                Ok(count) => Ok(Some(count as u64)),
                // The conditional update filtered out: counter at limit.
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Current count for `key`; zero when absent.
pub async fn current(db: &Database, key: &str) -> Result<u64, SibylError> {
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            let result = conn.query_row(
                "SELECT count FROM rate_counters WHERE key = ?1",
                params![key],
                |row| row.get::<_, i64>(0),
            );
            match result {
                Ok(count) => Ok(count as u64),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(0),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete all counters with the given key prefix. Returns rows removed.
pub async fn clear_prefix(db: &Database, prefix: &str) -> Result<u64, SibylError> {
    let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM rate_counters WHERE key LIKE ?1 ESCAPE '\\'",
                params![pattern],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::now_iso;
    use tempfile::tempdir;

    async fn setup_db() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("t.db").to_str().unwrap())
            .await
            .unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn increments_until_limit_then_refuses() {
        let (db, _dir) = setup_db().await;
        let start = now_iso();
        for expected in 1..=3u64 {
            let got = try_increment(&db, "u1:100", 3, &start, 60).await.unwrap();
            assert_eq!(got, Some(expected));
        }
        assert_eq!(try_increment(&db, "u1:100", 3, &start, 60).await.unwrap(), None);
        assert_eq!(current(&db, "u1:100").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn distinct_buckets_are_independent() {
        let (db, _dir) = setup_db().await;
        let start = now_iso();
        try_increment(&db, "u1:100", 1, &start, 60).await.unwrap();
        assert_eq!(try_increment(&db, "u1:100", 1, &start, 60).await.unwrap(), None);
        // A new bucket key means a fresh counter.
        assert_eq!(
            try_increment(&db, "u1:101", 1, &start, 60).await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn clear_prefix_removes_only_matching_counters() {
        let (db, _dir) = setup_db().await;
        let start = now_iso();
        try_increment(&db, "u1:100", 10, &start, 60).await.unwrap();
        try_increment(&db, "u1:101", 10, &start, 60).await.unwrap();
        try_increment(&db, "u2:100", 10, &start, 60).await.unwrap();

        let removed = clear_prefix(&db, "u1:").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(current(&db, "u1:100").await.unwrap(), 0);
        assert_eq!(current(&db, "u2:100").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_increments_never_exceed_limit() {
        let (db, _dir) = setup_db().await;
        let db = std::sync::Arc::new(db);
        let start = now_iso();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let db = db.clone();
            let start = start.clone();
            handles.push(tokio::spawn(async move {
                try_increment(&db, "u1:7", 5, &start, 60).await.unwrap()
            }));
        }

        let mut admitted = 0;
        for h in handles {
            if h.await.unwrap().is_some() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5, "exactly the limit must be admitted");
        assert_eq!(current(&db, "u1:7").await.unwrap(), 5);
    }
}
