// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Component wiring: build the full stack from configuration.
//!
//! Adapter selection (mock vs. HTTP expert, local vs. directory resolver)
//! happens here, once, so nothing downstream branches on configuration.

use std::sync::Arc;
use std::time::Duration;

use sibyl_audit::AuditLog;
use sibyl_auth::{resolver_from_config, PermissionGuard};
use sibyl_cache::ResultCache;
use sibyl_config::SibylConfig;
use sibyl_core::traits::QueryExpert;
use sibyl_core::SibylError;
use sibyl_expert::{HttpExpert, MockExpert};
use sibyl_limiter::{RateLimiter, SqliteCounterStore};
use sibyl_orchestrator::QueryOrchestrator;
use sibyl_session::SessionStore;
use sibyl_storage::Database;
use tracing::info;

/// Everything the serve loop and admin commands need.
pub struct Stack {
    pub db: Arc<Database>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub cache: ResultCache,
    pub sessions: Arc<SessionStore>,
    pub audit: AuditLog,
}

/// Open storage and assemble all components per the configuration.
pub async fn build(config: &SibylConfig) -> Result<Stack, SibylError> {
    let db = Arc::new(
        Database::open_with_wal(&config.storage.database_path, config.storage.wal_mode).await?,
    );
    let audit = AuditLog::new(db.clone());

    let op_timeout = Duration::from_millis(config.storage.op_timeout_ms);
    let resolver = resolver_from_config(&config.auth, op_timeout, db.clone())?;
    let guard = Arc::new(PermissionGuard::new(resolver, audit.clone()));

    let limiter = Arc::new(RateLimiter::new(
        Arc::new(SqliteCounterStore::new(db.clone())),
        audit.clone(),
        config.limits.clone(),
    ));

    let cache = ResultCache::new(db.clone(), Duration::from_secs(config.cache.ttl_secs));

    let sessions = Arc::new(SessionStore::new(
        db.clone(),
        audit.clone(),
        Duration::from_secs(config.session.idle_threshold_secs),
    ));

    let expert: Arc<dyn QueryExpert> = if config.expert.mock_mode {
        info!("expert: using canned mock (expert.mock_mode = true)");
        Arc::new(MockExpert::new(Duration::from_millis(
            config.expert.mock_delay_ms,
        )))
    } else {
        info!(base_url = %config.expert.base_url, "expert: using HTTP client");
        Arc::new(HttpExpert::new(
            config.expert.base_url.clone(),
            Duration::from_secs(config.expert.timeout_secs),
            Duration::from_secs(config.expert.health_check_interval_secs),
        )?)
    };

    let orchestrator = Arc::new(QueryOrchestrator::new(
        db.clone(),
        guard,
        limiter,
        cache.clone(),
        sessions.clone(),
        audit.clone(),
        expert,
        config,
    ));

    Ok(Stack {
        db,
        orchestrator,
        cache,
        sessions,
        audit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_from_default_config_with_temp_storage() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SibylConfig::default();
        config.storage.database_path = dir
            .path()
            .join("stack.db")
            .to_string_lossy()
            .into_owned();
        config.expert.mock_mode = true;

        let stack = build(&config).await.unwrap();
        // The audit log is usable straight away.
        assert!(stack.audit.recent(None, None, 5).await.unwrap().is_empty());
    }
}
