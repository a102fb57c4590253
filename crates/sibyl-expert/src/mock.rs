// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Canned in-process expert for development and tests.
//!
//! Serves a fixed revenue-analytics dataset with configurable latency,
//! per-stage failure injection, and call counters so tests can assert
//! which stages actually ran (the cache fast path must run none).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sibyl_core::traits::QueryExpert;
use sibyl_core::types::{Execution, ExpertContext, PriorQuery, TableRef};
use sibyl_core::SibylError;

/// Failure to inject into a specific stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inject {
    /// Service-failure on `find_tables`.
    FindTablesUnavailable,
    /// Semantic failure on `execute`.
    ExecuteInvalidSql,
    /// Empty result on `execute`.
    ExecuteNoRows,
    /// `execute` never returns within any sane deadline.
    ExecuteHang,
}

/// Per-stage invocation counts.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub find_tables: usize,
    pub search_similar: usize,
    pub generate_sql: usize,
    pub execute: usize,
    pub cancel: usize,
}

#[derive(Default)]
struct Counters {
    find_tables: AtomicUsize,
    search_similar: AtomicUsize,
    generate_sql: AtomicUsize,
    execute: AtomicUsize,
    cancel: AtomicUsize,
}

/// In-process mock of the expert service.
pub struct MockExpert {
    delay: Duration,
    sql: String,
    inject: Mutex<Option<Inject>>,
    counters: Counters,
}

impl MockExpert {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            sql: "SELECT product_category, SUM(revenue) AS total_revenue \
                  FROM ANALYTICS.SALES.REVENUE_BY_CATEGORY GROUP BY product_category"
                .to_string(),
            inject: Mutex::new(None),
            counters: Counters::default(),
        }
    }

    /// Override the SQL the mock "generates".
    pub fn with_sql(mut self, sql: &str) -> Self {
        self.sql = sql.to_string();
        self
    }

    /// Arm a failure for the next matching stage call (sticky until
    /// cleared).
    pub fn inject(&self, failure: Option<Inject>) {
        *self.inject.lock().unwrap_or_else(|e| e.into_inner()) = failure;
    }

    fn armed(&self) -> Option<Inject> {
        *self.inject.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of per-stage invocation counts.
    pub fn calls(&self) -> CallCounts {
        CallCounts {
            find_tables: self.counters.find_tables.load(Ordering::SeqCst),
            search_similar: self.counters.search_similar.load(Ordering::SeqCst),
            generate_sql: self.counters.generate_sql.load(Ordering::SeqCst),
            execute: self.counters.execute.load(Ordering::SeqCst),
            cancel: self.counters.cancel.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl QueryExpert for MockExpert {
    async fn find_tables(
        &self,
        _question: &str,
        _ctx: &ExpertContext,
    ) -> Result<Vec<TableRef>, SibylError> {
        self.counters.find_tables.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        if self.armed() == Some(Inject::FindTablesUnavailable) {
            return Err(SibylError::ExpertUnavailable {
                message: "injected metadata outage".to_string(),
                source: None,
            });
        }
        Ok(vec![
            TableRef {
                name: "ANALYTICS.SALES.REVENUE_BY_CATEGORY".to_string(),
                description: Some("Daily revenue aggregated by product category".to_string()),
                columns: vec![
                    "date".to_string(),
                    "product_category".to_string(),
                    "revenue".to_string(),
                    "transaction_count".to_string(),
                ],
                verification_status: Some("VERIFIED".to_string()),
                owners: vec!["data-platform".to_string()],
            },
            TableRef {
                name: "ANALYTICS.SALES.CUSTOMER_METRICS".to_string(),
                description: Some("Customer acquisition and retention metrics".to_string()),
                columns: vec![
                    "customer_id".to_string(),
                    "acquisition_date".to_string(),
                    "ltv".to_string(),
                ],
                verification_status: Some("VERIFIED".to_string()),
                owners: vec![],
            },
        ])
    }

    async fn search_similar(
        &self,
        _question: &str,
        _ctx: &ExpertContext,
    ) -> Result<Vec<PriorQuery>, SibylError> {
        self.counters.search_similar.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(vec![PriorQuery {
            sql: self.sql.clone(),
            author: Some("john.doe".to_string()),
            description: Some("Revenue analysis by product category".to_string()),
            similarity: 0.95,
        }])
    }

    async fn generate_sql(
        &self,
        _question: &str,
        _tables: &[TableRef],
        _prior: &[PriorQuery],
    ) -> Result<String, SibylError> {
        self.counters.generate_sql.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(self.sql.clone())
    }

    async fn execute(
        &self,
        _sql: &str,
        _ctx: &ExpertContext,
        deadline: Duration,
    ) -> Result<Execution, SibylError> {
        self.counters.execute.fetch_add(1, Ordering::SeqCst);
        match self.armed() {
            Some(Inject::ExecuteHang) => {
                // Outlive any deadline the orchestrator could reasonably set.
                tokio::time::sleep(deadline + Duration::from_secs(3600)).await;
                Err(SibylError::Internal("hang elapsed".to_string()))
            }
            Some(Inject::ExecuteInvalidSql) => Err(SibylError::InvalidSql {
                detail: "injected: unknown column".to_string(),
            }),
            Some(Inject::ExecuteNoRows) => Err(SibylError::NoRows),
            _ => {
                tokio::time::sleep(self.delay).await;
                Ok(Execution {
                    columns: vec![
                        "product_category".to_string(),
                        "total_revenue".to_string(),
                    ],
                    rows: vec![
                        vec![
                            serde_json::json!("Electronics"),
                            serde_json::json!(1_250_000.50),
                        ],
                        vec![
                            serde_json::json!("Clothing"),
                            serde_json::json!(890_000.25),
                        ],
                    ],
                    duration_ms: 2_340,
                })
            }
        }
    }

    async fn cancel(&self, _query_id: &str) -> bool {
        self.counters.cancel.fetch_add(1, Ordering::SeqCst);
        true
    }
}
