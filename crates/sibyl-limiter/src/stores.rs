// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Counter store implementations.
//!
//! The SQLite store rides the single-writer connection shared by every
//! orchestrator instance on this database; the in-memory store serves
//! tests and single-process deployments. Both expose only atomic
//! increment-and-check, never a lock the caller could hold across a call.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use sibyl_core::traits::CounterStore;
use sibyl_core::SibylError;
use sibyl_storage::queries::counters;
use sibyl_storage::Database;

/// Counter store backed by the shared SQLite database.
pub struct SqliteCounterStore {
    db: Arc<Database>,
}

impl SqliteCounterStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl CounterStore for SqliteCounterStore {
    async fn try_increment(
        &self,
        key: &str,
        limit: u64,
        window_start: &str,
        window_secs: u64,
    ) -> Result<Option<u64>, SibylError> {
        counters::try_increment(&self.db, key, limit, window_start, window_secs).await
    }

    async fn current(&self, key: &str) -> Result<u64, SibylError> {
        counters::current(&self.db, key).await
    }

    async fn clear(&self, prefix: &str) -> Result<u64, SibylError> {
        counters::clear_prefix(&self.db, prefix).await
    }
}

struct Cell {
    count: u64,
}

/// In-process counter store. Per-key atomicity comes from dashmap's
/// exclusive entry access.
#[derive(Default)]
pub struct MemoryCounterStore {
    cells: DashMap<String, Cell>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn try_increment(
        &self,
        key: &str,
        limit: u64,
        _window_start: &str,
        _window_secs: u64,
    ) -> Result<Option<u64>, SibylError> {
        let mut cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Cell { count: 0 });
        if cell.count < limit {
            cell.count += 1;
            Ok(Some(cell.count))
        } else {
            Ok(None)
        }
    }

    async fn current(&self, key: &str) -> Result<u64, SibylError> {
        Ok(self.cells.get(key).map(|c| c.count).unwrap_or(0))
    }

    async fn clear(&self, prefix: &str) -> Result<u64, SibylError> {
        let before = self.cells.len();
        self.cells.retain(|k, _| !k.starts_with(prefix));
        Ok((before - self.cells.len()) as u64)
    }
}
