// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-request state machine.
//!
//! One orchestrator is shared across requests; each call to [`QueryOrchestrator::run`]
//! drives a single question through
//! `Pending -> Admitted -> CacheChecking -> {CacheHit -> Completed} |
//! Generating -> Executing -> Formatting -> Completed | Failed | TimedOut |
//! Cancelled`. No error escapes `run`: every failure lands in a terminal
//! state with a typed reason, exactly one audit entry, and a user-facing
//! answer.
//!
//! The cache is consulted twice. On entry, a repeat of a question this
//! session has already answered resolves its remembered SQL and can hit
//! without any expert call. After generation, the freshly generated SQL is
//! checked again, so a differently-phrased question that generates the
//! same SQL skips warehouse execution.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use sibyl_audit::AuditLog;
use sibyl_auth::{Capability, PermissionGuard};
use sibyl_cache::{CacheKey, Lookup, ResultCache};
use sibyl_config::model::{QueryConfig, SibylConfig, WarehouseConfig};
use sibyl_core::traits::QueryExpert;
use sibyl_core::types::{
    Answer, AuditCategory, AuditEntry, AuditSeverity, ExpertContext, Principal, Question,
    QueryRecord, QueryStatus, Stage, TableRef,
};
use sibyl_core::SibylError;
use sibyl_limiter::RateLimiter;
use sibyl_session::SessionStore;
use sibyl_storage::queries::query_records;
use sibyl_storage::time::now_iso;
use sibyl_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::progress::ProgressSender;
use crate::retry;

/// Result payload persisted to records and cache entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResultPayload {
    columns: Vec<String>,
    rows: Vec<Vec<serde_json::Value>>,
}

/// Per-request bookkeeping threaded through the state machine so the
/// error path knows what exists and where the request got to.
struct Flight {
    stage: Stage,
    session_id: Option<String>,
    record_created: bool,
    sql: Option<String>,
}

impl Flight {
    fn new() -> Self {
        Self {
            stage: Stage::Pending,
            session_id: None,
            record_created: false,
            sql: None,
        }
    }
}

/// Per-request context: identity of the run plus its clocks and signals.
struct RunCtx {
    query_id: String,
    started: Instant,
    deadline: Duration,
    progress: ProgressSender,
    cancel: CancellationToken,
}

impl RunCtx {
    fn remaining(&self) -> Option<Duration> {
        self.deadline.checked_sub(self.started.elapsed())
    }

    fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Top-level coordinator for inbound questions.
pub struct QueryOrchestrator {
    db: Arc<Database>,
    guard: Arc<PermissionGuard>,
    limiter: Arc<RateLimiter>,
    cache: ResultCache,
    sessions: Arc<SessionStore>,
    audit: AuditLog,
    expert: Arc<dyn QueryExpert>,
    query_config: QueryConfig,
    warehouse: WarehouseConfig,
    op_timeout: Duration,
}

impl QueryOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        guard: Arc<PermissionGuard>,
        limiter: Arc<RateLimiter>,
        cache: ResultCache,
        sessions: Arc<SessionStore>,
        audit: AuditLog,
        expert: Arc<dyn QueryExpert>,
        config: &SibylConfig,
    ) -> Self {
        Self {
            db,
            guard,
            limiter,
            cache,
            sessions,
            audit,
            expert,
            query_config: config.query.clone(),
            warehouse: config.warehouse.clone(),
            op_timeout: Duration::from_millis(config.storage.op_timeout_ms),
        }
    }

    /// Drive one question to a terminal answer.
    ///
    /// Progress updates stream through `progress` (best-effort). The
    /// caller may cancel at any time via `cancel`; cancellation is
    /// cooperative and takes effect between stages.
    pub async fn run(
        &self,
        question: Question,
        progress: ProgressSender,
        cancel: CancellationToken,
    ) -> Answer {
        let ctx = RunCtx {
            query_id: uuid::Uuid::new_v4().to_string(),
            started: Instant::now(),
            deadline: Duration::from_secs(self.query_config.deadline_secs),
            progress,
            cancel,
        };
        let mut flight = Flight::new();

        info!(
            query_id = %ctx.query_id,
            principal = %question.principal,
            channel = %question.channel_id,
            "question received"
        );

        match self.drive(&question, &ctx, &mut flight).await {
            Ok(answer) => answer,
            Err(e) => self.finish_error(&question, &ctx, &flight, e).await,
        }
    }

    async fn drive(
        &self,
        question: &Question,
        ctx: &RunCtx,
        flight: &mut Flight,
    ) -> Result<Answer, SibylError> {
        ctx.progress.emit(&ctx.query_id, Stage::Pending);

        // Admission: permission guard first, then rate limiter. Resolver
        // outages are the one admission error class worth retrying.
        let identity = retry::with_retry(
            self.query_config.max_retries,
            Duration::from_millis(self.query_config.retry_base_delay_ms),
            &ctx.cancel,
            || self.guard.authorize(&question.principal, Capability::QueryExecute),
        )
        .await?;
        self.limiter.admit(&question.principal).await?;

        flight.stage = Stage::Admitted;
        ctx.progress.emit(&ctx.query_id, Stage::Admitted);

        let session = self
            .store_op(self.sessions.get_or_create(&question.principal, &question.channel_id))
            .await?;
        flight.session_id = Some(session.id.clone());

        let record = QueryRecord {
            id: ctx.query_id.clone(),
            session_id: session.id.clone(),
            principal: question.principal.to_string(),
            channel_id: question.channel_id.clone(),
            question: question.text.clone(),
            generated_sql: None,
            status: QueryStatus::Pending,
            result: None,
            row_count: 0,
            duration_ms: None,
            error_detail: None,
            created_at: now_iso(),
            executed_at: None,
            completed_at: None,
        };
        self.store_op(query_records::insert_record(&self.db, &record))
            .await?;
        flight.record_created = true;

        let expert_ctx = ExpertContext {
            database: self.warehouse.database.clone(),
            schema: self.warehouse.schema.clone(),
            warehouse: self.warehouse.warehouse.clone(),
            user_name: identity.directory_id.clone(),
        };

        // Fast path: an identical question this session already answered
        // resolves its remembered SQL without any expert involvement.
        flight.stage = Stage::CacheChecking;
        ctx.progress.emit(&ctx.query_id, Stage::CacheChecking);

        if let Some(prior_sql) = self
            .store_op(query_records::latest_sql_for_question(
                &self.db,
                &session.id,
                &question.text,
            ))
            .await?
        {
            let key = CacheKey::derive(&prior_sql, &expert_ctx);
            if let Some(payload) = self.cached_payload(&key).await? {
                flight.sql = Some(prior_sql.clone());
                flight.stage = Stage::CacheHit;
                ctx.progress.emit(&ctx.query_id, Stage::CacheHit);
                return self
                    .complete(question, ctx, flight, &session.id, &prior_sql, payload, None, true)
                    .await;
            }
        }

        self.check_cancel(ctx).await?;

        // Generation: discover tables, discover prior queries, generate.
        flight.stage = Stage::Generating;
        ctx.progress.emit(&ctx.query_id, Stage::Generating);
        self.store_op(query_records::advance_status(
            &self.db,
            &ctx.query_id,
            QueryStatus::Running,
            None,
            None,
            None,
            None,
            None,
            None,
            None,
        ))
        .await?;

        let tables = self
            .stage(ctx, || self.expert.find_tables(&question.text, &expert_ctx))
            .await?;
        self.check_cancel(ctx).await?;

        let prior = self
            .stage(ctx, || self.expert.search_similar(&question.text, &expert_ctx))
            .await?;
        self.check_cancel(ctx).await?;

        let sql = self
            .stage(ctx, || self.expert.generate_sql(&question.text, &tables, &prior))
            .await?;
        flight.sql = Some(sql.clone());

        // Same SQL from a different phrasing: serve the cached result and
        // skip warehouse execution.
        let key = CacheKey::derive(&sql, &expert_ctx);
        if let Some(payload) = self.cached_payload(&key).await? {
            flight.stage = Stage::CacheHit;
            ctx.progress.emit(&ctx.query_id, Stage::CacheHit);
            return self
                .complete(question, ctx, flight, &session.id, &sql, payload, None, true)
                .await;
        }

        self.check_cancel(ctx).await?;

        // Execution against the warehouse, bounded by what is left of the
        // request deadline.
        flight.stage = Stage::Executing;
        ctx.progress.emit(&ctx.query_id, Stage::Executing);
        self.store_op(query_records::set_executed_at(
            &self.db,
            &ctx.query_id,
            &now_iso(),
        ))
        .await?;

        let execution = self
            .stage(ctx, || {
                let remaining = ctx.remaining().unwrap_or(Duration::ZERO);
                self.expert.execute(&sql, &expert_ctx, remaining)
            })
            .await?;
        self.check_cancel(ctx).await?;

        flight.stage = Stage::Formatting;
        ctx.progress.emit(&ctx.query_id, Stage::Formatting);

        let mut rows = execution.rows;
        if rows.len() > self.query_config.max_result_rows {
            debug!(
                query_id = %ctx.query_id,
                total = rows.len(),
                cap = self.query_config.max_result_rows,
                "truncating result rows"
            );
            rows.truncate(self.query_config.max_result_rows);
        }
        let payload = ResultPayload {
            columns: execution.columns,
            rows,
        };

        self.complete(
            question,
            ctx,
            flight,
            &session.id,
            &sql,
            payload,
            Some((&key, execution.duration_ms, tables.as_slice())),
            false,
        )
        .await
    }

    /// Look up a cache key and decode its payload. A corrupt payload is
    /// invalidated and treated as a miss rather than failing the request.
    async fn cached_payload(&self, key: &CacheKey) -> Result<Option<ResultPayload>, SibylError> {
        match self.store_op(self.cache.lookup(key)).await? {
            Lookup::Hit(entry) => match serde_json::from_str::<ResultPayload>(&entry.payload) {
                Ok(payload) => Ok(Some(payload)),
                Err(e) => {
                    self.cache
                        .invalidate(key, &format!("undecodable payload: {e}"))
                        .await?;
                    Ok(None)
                }
            },
            Lookup::Miss => Ok(None),
        }
    }

    /// Terminal success: persist the record, populate the cache (unless
    /// this request was itself served from it), update session context,
    /// audit, and emit the final stages.
    #[allow(clippy::too_many_arguments)]
    async fn complete(
        &self,
        question: &Question,
        ctx: &RunCtx,
        flight: &Flight,
        session_id: &str,
        sql: &str,
        payload: ResultPayload,
        store_as: Option<(&CacheKey, u64, &[TableRef])>,
        from_cache: bool,
    ) -> Result<Answer, SibylError> {
        let payload_text = serde_json::to_string(&payload)
            .map_err(|e| SibylError::Internal(format!("payload serialization: {e}")))?;
        let row_count = payload.rows.len() as i64;
        let elapsed_ms = ctx.elapsed_ms();

        self.store_op(query_records::advance_status(
            &self.db,
            &ctx.query_id,
            QueryStatus::Succeeded,
            Some(sql.to_string()),
            Some(payload_text.clone()),
            Some(row_count),
            Some(elapsed_ms as i64),
            None,
            None,
            Some(now_iso()),
        ))
        .await?;

        let mut context = serde_json::json!({});
        if let Some(warehouse) = &self.warehouse.warehouse {
            context["warehouse"] = serde_json::json!(warehouse);
        }
        if let Some((key, exec_ms, tables)) = store_as {
            self.store_op(self.cache.store(
                key,
                sql,
                &payload_text,
                row_count,
                exec_ms as i64,
            ))
            .await?;
            if let Some(first) = tables.first() {
                context["last_table"] = serde_json::json!(first.name);
            }
        }
        self.store_op(self.sessions.touch(session_id, Some(&context)))
            .await?;

        self.audit
            .record_or_degrade(self.terminal_entry(
                question,
                ctx,
                flight,
                QueryStatus::Succeeded,
                None,
                row_count,
                from_cache,
            ))
            .await;

        ctx.progress.emit(&ctx.query_id, Stage::Completed);
        info!(
            query_id = %ctx.query_id,
            row_count,
            from_cache,
            duration_ms = elapsed_ms,
            "question answered"
        );

        Ok(Answer {
            query_id: ctx.query_id.clone(),
            status: QueryStatus::Succeeded,
            columns: payload.columns,
            rows: payload.rows,
            sql: Some(sql.to_string()),
            duration_ms: elapsed_ms,
            error_reason: None,
            from_cache,
        })
    }

    /// Terminal failure: one audit entry, the record frozen at a terminal
    /// status, and a user-facing reason that hides infrastructure detail.
    async fn finish_error(
        &self,
        question: &Question,
        ctx: &RunCtx,
        flight: &Flight,
        err: SibylError,
    ) -> Answer {
        let status = match &err {
            SibylError::Timeout { .. } => QueryStatus::TimedOut,
            SibylError::Cancelled => QueryStatus::Cancelled,
            _ => QueryStatus::Failed,
        };
        let terminal_stage = match status {
            QueryStatus::TimedOut => Stage::TimedOut,
            QueryStatus::Cancelled => Stage::Cancelled,
            _ => Stage::Failed,
        };

        if flight.record_created {
            // Record freeze is best-effort on the error path; a store
            // failure here must not mask the original error.
            let _ = query_records::advance_status(
                &self.db,
                &ctx.query_id,
                status,
                flight.sql.clone(),
                None,
                None,
                Some(ctx.elapsed_ms() as i64),
                Some(err.to_string()),
                None,
                Some(now_iso()),
            )
            .await;
        }

        self.audit
            .record_or_degrade(self.terminal_entry(
                question,
                ctx,
                flight,
                status,
                Some(err.to_string()),
                0,
                false,
            ))
            .await;

        ctx.progress.emit(&ctx.query_id, terminal_stage);

        let error_reason = if err.is_user_facing() {
            err.to_string()
        } else {
            format!(
                "Something went wrong on our side. Please try again later (ref {}).",
                ctx.query_id
            )
        };
        info!(
            query_id = %ctx.query_id,
            status = %status,
            reached = %flight.stage,
            error = %err,
            "question terminated"
        );

        Answer {
            query_id: ctx.query_id.clone(),
            status,
            columns: Vec::new(),
            rows: Vec::new(),
            sql: flight.sql.clone(),
            duration_ms: ctx.elapsed_ms(),
            error_reason: Some(error_reason),
            from_cache: false,
        }
    }

    /// The single audit entry every terminal state writes. Carries status
    /// and reason, never result rows.
    #[allow(clippy::too_many_arguments)]
    fn terminal_entry(
        &self,
        question: &Question,
        ctx: &RunCtx,
        flight: &Flight,
        status: QueryStatus,
        reason: Option<String>,
        row_count: i64,
        from_cache: bool,
    ) -> AuditEntry {
        let (category, severity) = match status {
            QueryStatus::Succeeded | QueryStatus::Cancelled => {
                (AuditCategory::Query, AuditSeverity::Info)
            }
            _ => (AuditCategory::Error, AuditSeverity::Warning),
        };
        let mut entry = sibyl_audit::entry(
            &format!("query_{status}"),
            category,
            severity,
            question.principal.as_str(),
        );
        entry.session_id = flight.session_id.clone();
        entry.payload = Some(
            serde_json::json!({
                "query_id": ctx.query_id,
                "status": status.to_string(),
                "stage_reached": flight.stage.to_string(),
                "reason": reason,
                "row_count": row_count,
                "from_cache": from_cache,
                "duration_ms": ctx.elapsed_ms(),
            })
            .to_string(),
        );
        entry
    }

    /// One expert stage: bounded by the remaining request deadline, with
    /// infrastructure errors retried on backoff.
    async fn stage<T, F, Fut>(&self, ctx: &RunCtx, f: F) -> Result<T, SibylError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, SibylError>>,
    {
        let deadline = ctx.deadline;
        retry::with_retry(
            self.query_config.max_retries,
            Duration::from_millis(self.query_config.retry_base_delay_ms),
            &ctx.cancel,
            || {
                let inner = f();
                let remaining = ctx.remaining();
                async move {
                    match remaining {
                        Some(rem) => tokio::time::timeout(rem, inner)
                            .await
                            .map_err(|_| SibylError::Timeout { duration: deadline })?,
                        None => Err(SibylError::Timeout { duration: deadline }),
                    }
                }
            },
        )
        .await
    }

    /// Cooperative cancellation check between stages. On cancel, forward
    /// downstream so remote work can stop early; the in-flight stage (if
    /// any) was already allowed to finish.
    async fn check_cancel(&self, ctx: &RunCtx) -> Result<(), SibylError> {
        if ctx.cancel.is_cancelled() {
            let forwarded = self.expert.cancel(&ctx.query_id).await;
            debug!(query_id = %ctx.query_id, forwarded, "cancellation observed between stages");
            return Err(SibylError::Cancelled);
        }
        Ok(())
    }

    /// Shared-store round trip with its own short timeout, distinct from
    /// the request deadline.
    async fn store_op<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, SibylError>>,
    ) -> Result<T, SibylError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| SibylError::Storage {
                source: format!("store operation exceeded {:?}", self.op_timeout).into(),
            })?
    }

    // --- Administrative surface (each action audited) ---

    /// Clear a principal's rate counters immediately.
    pub async fn reset_rate_limit(
        &self,
        principal: &Principal,
        operator: &str,
    ) -> Result<u64, SibylError> {
        self.limiter.reset(principal, operator).await
    }

    /// Invalidate a cache entry by raw key, recording the reason.
    pub async fn invalidate_cache(
        &self,
        key: &str,
        reason: &str,
        operator: &str,
    ) -> Result<bool, SibylError> {
        let existed = self
            .cache
            .invalidate(&CacheKey::from_raw(key), reason)
            .await?;

        let mut entry = sibyl_audit::entry(
            "cache_invalidated",
            AuditCategory::System,
            AuditSeverity::Info,
            operator,
        );
        entry.payload = Some(
            serde_json::json!({"key": key, "reason": reason, "existed": existed}).to_string(),
        );
        self.audit.record(entry).await?;
        Ok(existed)
    }

    /// Flag sessions idle longer than `threshold` as inactive.
    pub async fn expire_sessions_older_than(
        &self,
        threshold: Duration,
        operator: &str,
    ) -> Result<Option<u64>, SibylError> {
        self.sessions.expire_older_than(threshold, operator).await
    }

    /// A principal's own recent query history (requires the history
    /// capability).
    pub async fn history(
        &self,
        principal: &Principal,
        limit: i64,
    ) -> Result<Vec<QueryRecord>, SibylError> {
        self.guard
            .authorize(principal, Capability::QueryHistory)
            .await?;
        query_records::recent_for_principal(&self.db, principal.as_str(), limit).await
    }

    /// Recent audit entries (requires the audit-view capability).
    pub async fn recent_audit(
        &self,
        requester: &Principal,
        category: Option<AuditCategory>,
        limit: i64,
    ) -> Result<Vec<AuditEntry>, SibylError> {
        self.guard
            .authorize(requester, Capability::AuditView)
            .await?;
        self.audit.recent(category, None, limit).await
    }
}
