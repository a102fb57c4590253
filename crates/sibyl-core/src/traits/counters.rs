// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared atomic counter store used by the rate limiter.

use async_trait::async_trait;

use crate::error::SibylError;

/// An atomic counter namespace shared across orchestrator instances.
///
/// Counters are keyed `scope:windowBucket` and mutated only through
/// single atomic read-modify-write operations; callers never hold a lock
/// across a store round trip.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically increment `key` if its count is below `limit`.
    ///
    /// Returns `Some(new_count)` when the increment was applied and
    /// `None` when the counter was already at the limit. The window
    /// metadata is recorded on first insert so operators can read buckets
    /// back meaningfully.
    async fn try_increment(
        &self,
        key: &str,
        limit: u64,
        window_start: &str,
        window_secs: u64,
    ) -> Result<Option<u64>, SibylError>;

    /// Current count for `key`; zero when the counter does not exist.
    async fn current(&self, key: &str) -> Result<u64, SibylError>;

    /// Delete all counters whose key starts with `prefix`, returning how
    /// many were removed. Used by the administrative reset.
    async fn clear(&self, prefix: &str) -> Result<u64, SibylError>;
}
