// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Database connection management with PRAGMA setup, WAL mode, and lifecycle.
//!
//! All writes are serialized through tokio-rusqlite's single background
//! thread: every closure passed to `conn.call()` executes as one atomic unit
//! with respect to every other closure. This is what makes the
//! increment-and-check and insert-if-absent operations in the query modules
//! safe without any application-level locking.
//!
//! Do NOT create additional Connection instances for writes.

use sibyl_core::SibylError;
use tracing::debug;

use crate::migrations;

/// Convert a tokio-rusqlite error into SibylError::Storage.
pub fn map_tr_err(e: tokio_rusqlite::Error<rusqlite::Error>) -> SibylError {
    SibylError::Storage {
        source: Box::new(e),
    }
}

/// Handle to the single-writer SQLite connection.
///
/// Opening runs PRAGMA setup and all pending migrations. Query modules
/// accept `&Database` and go through [`Database::connection`].
pub struct Database {
    conn: tokio_rusqlite::Connection,
}

impl Database {
    /// Open (creating if needed) the database at `path` with WAL mode.
    pub async fn open(path: &str) -> Result<Self, SibylError> {
        Self::open_with_wal(path, true).await
    }

    /// Open with explicit WAL control (tests use non-WAL in-memory files).
    pub async fn open_with_wal(path: &str, wal: bool) -> Result<Self, SibylError> {
        let conn = tokio_rusqlite::Connection::open(path)
            .await
            .map_err(|e| SibylError::Storage {
                source: Box::new(e),
            })?;

        conn.call(move |conn| {
            if wal {
                conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            }
            conn.execute_batch(
                "PRAGMA synchronous=NORMAL;
                 PRAGMA foreign_keys=ON;
                 PRAGMA busy_timeout=5000;",
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;

        conn.call(|conn| migrations::run_migrations(conn))
            .await
            .map_err(|e| SibylError::Storage {
                source: Box::new(e),
            })?;

        debug!(path, wal, "database opened");
        Ok(Self { conn })
    }

    /// The underlying tokio-rusqlite connection.
    pub fn connection(&self) -> &tokio_rusqlite::Connection {
        &self.conn
    }

    /// Checkpoint the WAL and close the connection.
    pub async fn close(self) -> Result<(), SibylError> {
        self.conn
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        debug!("WAL checkpoint complete, closing");
        Ok(())
    }
}
