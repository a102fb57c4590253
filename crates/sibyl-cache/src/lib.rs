// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content-addressed cache of prior query outcomes.
//!
//! Entries carry a fixed absolute TTL: a hit bumps the hit counter and
//! last-hit timestamp but never extends expiry, so a popular entry cannot
//! hide its own staleness. Invalidation flags rather than deletes, keeping
//! hit/latency history for diagnostics. A background sweep purges rows
//! past expiry to bound growth; correctness never depends on it because
//! lookup re-checks expiry itself.

pub mod key;

use std::sync::Arc;
use std::time::Duration;

use sibyl_core::types::CacheEntry;
use sibyl_core::SibylError;
use sibyl_storage::queries::cache_entries;
use sibyl_storage::time::{iso_after, now_iso};
use sibyl_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use key::CacheKey;

/// Outcome of a cache lookup.
#[derive(Debug)]
pub enum Lookup {
    Hit(CacheEntry),
    Miss,
}

/// The shared result cache.
#[derive(Clone)]
pub struct ResultCache {
    db: Arc<Database>,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(db: Arc<Database>, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Look up `key`, counting a hit if present, valid, and unexpired.
    pub async fn lookup(&self, key: &CacheKey) -> Result<Lookup, SibylError> {
        match cache_entries::lookup_and_touch(&self.db, key.as_str(), &now_iso()).await? {
            Some(entry) => {
                debug!(key = %key, hit_count = entry.hit_count, "cache hit");
                Ok(Lookup::Hit(entry))
            }
            None => Ok(Lookup::Miss),
        }
    }

    /// Store a result under `key` with the configured TTL.
    ///
    /// Idempotent under races: concurrent stores for the same key resolve
    /// last-writer-wins with no error.
    pub async fn store(
        &self,
        key: &CacheKey,
        sql: &str,
        payload: &str,
        row_count: i64,
        duration_ms: i64,
    ) -> Result<(), SibylError> {
        let now = now_iso();
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            sql: sql.to_string(),
            payload: payload.to_string(),
            row_count,
            duration_ms,
            hit_count: 0,
            created_at: now.clone(),
            last_hit_at: now,
            expires_at: iso_after(self.ttl),
            valid: true,
            invalidated_reason: None,
        };
        cache_entries::upsert_entry(&self.db, &entry).await?;
        debug!(key = %key, row_count, "cache entry stored");
        Ok(())
    }

    /// Invalidate `key`, recording why. Returns whether an entry existed.
    pub async fn invalidate(&self, key: &CacheKey, reason: &str) -> Result<bool, SibylError> {
        let hit = cache_entries::invalidate(&self.db, key.as_str(), reason).await?;
        if hit {
            info!(key = %key, reason, "cache entry invalidated");
        }
        Ok(hit)
    }

    /// Purge entries past expiry. Advisory housekeeping; returns the purge
    /// count.
    pub async fn sweep(&self) -> Result<u64, SibylError> {
        let purged = cache_entries::purge_expired(&self.db, &now_iso()).await?;
        if purged > 0 {
            debug!(purged, "cache sweep purged expired entries");
        }
        Ok(purged)
    }
}

/// Drive periodic sweeps until cancelled. Spawned once per process by the
/// serve wiring, not per request.
pub async fn run_sweeper(cache: ResultCache, interval: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = cache.sweep().await {
                    // Sweep failure is not correctness-critical; log and retry
                    // on the next tick.
                    warn!(error = %e, "cache sweep failed");
                }
            }
            _ = cancel.cancelled() => {
                debug!("cache sweeper stopping");
                break;
            }
        }
    }
}
