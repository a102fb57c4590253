// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-principal and global admission control.
//!
//! Accounting is fixed-window: requests land in the bucket
//! `floor(now / window)` and a rolled-over window starts a fresh counter
//! under a new key. This is deliberately simpler than a leaky bucket. The
//! tradeoff: a principal can burst up to twice its limit across a window
//! boundary. Limits here are generous (tens of requests per minute) and
//! the cost of that burst is low, so the simplicity wins.
//!
//! A request is admitted only if both the principal's counter and the
//! global counter are under their limits. The per-principal counter is
//! checked first; a request refused by the global counter leaves the
//! principal increment in place, which slightly overcounts rejected
//! requests but never lets admissions exceed either limit.

pub mod stores;

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sibyl_audit::AuditLog;
use sibyl_config::model::LimitsConfig;
use sibyl_core::traits::CounterStore;
use sibyl_core::types::{AuditCategory, AuditSeverity, Principal};
use sibyl_core::SibylError;
use sibyl_storage::time::now_iso;
use tracing::{debug, info};

pub use stores::{MemoryCounterStore, SqliteCounterStore};

/// Counts recorded for an admitted request, mostly useful in logs.
#[derive(Debug, Clone, Copy)]
pub struct Admission {
    pub principal_count: u64,
    pub global_count: u64,
}

/// Point-in-time usage for a principal, for operator tooling.
#[derive(Debug, Clone, Copy)]
pub struct Usage {
    pub principal_count: u64,
    pub principal_limit: u64,
    pub global_count: u64,
    pub global_limit: u64,
    pub window_remaining: Duration,
}

/// Windowed admission control over a shared counter store.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    audit: AuditLog,
    config: LimitsConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, audit: AuditLog, config: LimitsConfig) -> Self {
        Self {
            store,
            audit,
            config,
        }
    }

    /// Admit or reject a request from `principal`.
    ///
    /// Rejection carries `retry_after`: the time until the current window
    /// boundary, after which a fresh bucket opens.
    pub async fn admit(&self, principal: &Principal) -> Result<Admission, SibylError> {
        self.admit_at(principal, unix_now()).await
    }

    /// Admission against an explicit clock; `admit` passes wall time.
    pub async fn admit_at(
        &self,
        principal: &Principal,
        now_unix: u64,
    ) -> Result<Admission, SibylError> {
        let window_start = now_iso();

        let p_window = self.config.per_principal_window_secs;
        let p_key = format!("{}:{}", principal.as_str(), now_unix / p_window);
        let principal_count = self
            .store
            .try_increment(&p_key, self.config.per_principal, &window_start, p_window)
            .await?
            .ok_or_else(|| SibylError::RateLimited {
                retry_after: retry_after(now_unix, p_window),
            })?;

        let g_window = self.config.global_window_secs;
        let g_key = format!("global:{}", now_unix / g_window);
        let global_count = self
            .store
            .try_increment(&g_key, self.config.global, &window_start, g_window)
            .await?
            .ok_or_else(|| SibylError::RateLimited {
                retry_after: retry_after(now_unix, g_window),
            })?;

        debug!(
            principal = %principal,
            principal_count,
            global_count,
            "request admitted"
        );
        Ok(Admission {
            principal_count,
            global_count,
        })
    }

    /// Clear a principal's counters immediately (operator unblock).
    /// The reset itself is audited.
    pub async fn reset(&self, principal: &Principal, operator: &str) -> Result<u64, SibylError> {
        let removed = self
            .store
            .clear(&format!("{}:", principal.as_str()))
            .await?;

        let mut entry = sibyl_audit::entry(
            "rate_limit_reset",
            AuditCategory::System,
            AuditSeverity::Info,
            operator,
        );
        entry.payload = Some(
            serde_json::json!({
                "target": principal.as_str(),
                "counters_cleared": removed,
            })
            .to_string(),
        );
        self.audit.record(entry).await?;

        info!(principal = %principal, operator, removed, "rate limit reset");
        Ok(removed)
    }

    /// Current usage for a principal, for operator tooling.
    pub async fn usage(&self, principal: &Principal) -> Result<Usage, SibylError> {
        let now_unix = unix_now();
        let p_window = self.config.per_principal_window_secs;
        let g_window = self.config.global_window_secs;
        let p_key = format!("{}:{}", principal.as_str(), now_unix / p_window);
        let g_key = format!("global:{}", now_unix / g_window);
        Ok(Usage {
            principal_count: self.store.current(&p_key).await?,
            principal_limit: self.config.per_principal,
            global_count: self.store.current(&g_key).await?,
            global_limit: self.config.global,
            window_remaining: retry_after(now_unix, p_window),
        })
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn retry_after(now_unix: u64, window_secs: u64) -> Duration {
    Duration::from_secs(window_secs - (now_unix % window_secs))
}
