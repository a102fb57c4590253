// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the query-expert service.
//!
//! Provides [`HttpExpert`], which handles envelope construction, transient
//! error retry, per-call deadlines, and throttled health probing.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use sibyl_core::traits::QueryExpert;
use sibyl_core::types::{Execution, ExpertContext, PriorQuery, TableRef};
use sibyl_core::SibylError;
use tracing::{debug, warn};

use crate::types::{
    ExecuteResult, GenerateResult, SimilarResult, TablesResult, ToolCall, ToolResponse,
};

const TOOL_FIND_TABLES: &str = "queryexpert__find_table_metadata";
const TOOL_SEARCH_SIMILAR: &str = "queryexpert__search_similar_queries";
const TOOL_GENERATE_SQL: &str = "queryexpert__generate_sql";
const TOOL_EXECUTE: &str = "queryexpert__execute_query";
const TOOL_CANCEL: &str = "queryexpert__cancel_query";

/// How many tables / prior queries to request per search, mirroring what
/// the generation service can usefully consume.
const TABLE_SEARCH_LIMIT: u32 = 5;
const SIMILAR_SEARCH_LIMIT: u32 = 3;

/// HTTP client for the expert service's tool-call endpoint.
pub struct HttpExpert {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    health_interval: Duration,
    last_health_check: Mutex<Option<Instant>>,
}

impl HttpExpert {
    /// Creates a client with the given base URL, per-call timeout, and
    /// health probe interval.
    pub fn new(
        base_url: String,
        timeout: Duration,
        health_interval: Duration,
    ) -> Result<Self, SibylError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SibylError::Config(format!("failed to build expert client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            max_retries: 1,
            health_interval,
            last_health_check: Mutex::new(None),
        })
    }

    /// Probe the service health endpoint, at most once per configured
    /// interval; intermediate calls reuse the last verdict implicitly by
    /// skipping the probe.
    pub async fn ensure_healthy(&self) -> Result<(), SibylError> {
        {
            let last = self.last_health_check.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(at) = *last {
                if at.elapsed() < self.health_interval {
                    return Ok(());
                }
            }
        }

        let url = format!("{}/health", self.base_url);
        let healthy = match self.client.get(&url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                warn!(error = %e, "expert health probe failed");
                false
            }
        };
        if !healthy {
            return Err(SibylError::ExpertUnavailable {
                message: "expert service failed health check".to_string(),
                source: None,
            });
        }

        let mut last = self.last_health_check.lock().unwrap_or_else(|e| e.into_inner());
        *last = Some(Instant::now());
        Ok(())
    }

    /// POST one tool call, retrying once on transient errors (429/5xx),
    /// and decode the `result` payload.
    async fn call_tool<T: DeserializeOwned>(
        &self,
        tool: &'static str,
        arguments: serde_json::Value,
        deadline: Option<Duration>,
    ) -> Result<T, SibylError> {
        self.ensure_healthy().await?;
        let url = format!("{}/rpc", self.base_url);

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                warn!(tool, attempt, "retrying expert call after transient error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }

            let call = ToolCall::new(tool, arguments.clone());
            let mut request = self.client.post(&url).json(&call);
            if let Some(deadline) = deadline {
                request = request.timeout(deadline);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if e.is_timeout() => {
                    return Err(SibylError::Timeout {
                        duration: deadline.unwrap_or_default(),
                    });
                }
                Err(e) => {
                    return Err(SibylError::ExpertUnavailable {
                        message: format!("expert request failed: {e}"),
                        source: Some(Box::new(e)),
                    });
                }
            };

            let status = response.status();
            debug!(tool, status = %status, attempt, "expert response received");

            if is_transient(status) && attempt < self.max_retries {
                let body = response.text().await.unwrap_or_default();
                last_error = Some(SibylError::ExpertUnavailable {
                    message: format!("expert returned {status}: {body}"),
                    source: None,
                });
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(SibylError::ExpertUnavailable {
                    message: format!("expert returned {status}: {body}"),
                    source: None,
                });
            }

            let envelope: ToolResponse =
                response
                    .json()
                    .await
                    .map_err(|e| SibylError::ExpertUnavailable {
                        message: format!("expert response malformed: {e}"),
                        source: Some(Box::new(e)),
                    })?;

            if let Some(error) = envelope.error {
                return Err(map_wire_error(&error.kind, &error.message));
            }
            let result = envelope.result.ok_or_else(|| SibylError::ExpertUnavailable {
                message: "expert response carried neither result nor error".to_string(),
                source: None,
            })?;
            return serde_json::from_value(result).map_err(|e| SibylError::ExpertUnavailable {
                message: format!("expert result malformed: {e}"),
                source: Some(Box::new(e)),
            });
        }

        Err(last_error.unwrap_or_else(|| SibylError::ExpertUnavailable {
            message: "expert retries exhausted".to_string(),
            source: None,
        }))
    }
}

fn is_transient(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Map a typed wire error to the error taxonomy. "No result" kinds are
/// semantic; everything unrecognized is treated as a service failure.
fn map_wire_error(kind: &str, message: &str) -> SibylError {
    match kind {
        "invalid_sql" => SibylError::InvalidSql {
            detail: message.to_string(),
        },
        "no_rows" | "no_result" => SibylError::NoRows,
        "access_denied" => SibylError::WarehouseDenied {
            detail: message.to_string(),
        },
        other => SibylError::ExpertUnavailable {
            message: format!("expert error ({other}): {message}"),
            source: None,
        },
    }
}

#[async_trait]
impl QueryExpert for HttpExpert {
    async fn find_tables(
        &self,
        question: &str,
        ctx: &ExpertContext,
    ) -> Result<Vec<TableRef>, SibylError> {
        let mut arguments = serde_json::json!({
            "search_text": question,
            "limit": TABLE_SEARCH_LIMIT,
            "table_verification_status": "VERIFIED",
        });
        if let Some(database) = &ctx.database {
            arguments["table_database"] = serde_json::json!(database);
        }
        if let Some(schema) = &ctx.schema {
            arguments["table_schema"] = serde_json::json!(schema);
        }
        let result: TablesResult = self.call_tool(TOOL_FIND_TABLES, arguments, None).await?;
        Ok(result.tables.into_iter().map(Into::into).collect())
    }

    async fn search_similar(
        &self,
        question: &str,
        ctx: &ExpertContext,
    ) -> Result<Vec<PriorQuery>, SibylError> {
        let mut arguments = serde_json::json!({
            "search_text": question,
            "limit": SIMILAR_SEARCH_LIMIT,
        });
        if let Some(user_name) = &ctx.user_name {
            arguments["user_name"] = serde_json::json!(user_name);
        }
        let result: SimilarResult = self
            .call_tool(TOOL_SEARCH_SIMILAR, arguments, None)
            .await?;
        Ok(result.queries.into_iter().map(Into::into).collect())
    }

    async fn generate_sql(
        &self,
        question: &str,
        tables: &[TableRef],
        prior: &[PriorQuery],
    ) -> Result<String, SibylError> {
        let arguments = serde_json::json!({
            "question": question,
            "tables": tables.iter().map(|t| &t.name).collect::<Vec<_>>(),
            "prior_queries": prior.iter().map(|p| &p.sql).collect::<Vec<_>>(),
        });
        let result: GenerateResult = self.call_tool(TOOL_GENERATE_SQL, arguments, None).await?;
        Ok(result.sql)
    }

    async fn execute(
        &self,
        sql: &str,
        ctx: &ExpertContext,
        deadline: Duration,
    ) -> Result<Execution, SibylError> {
        let mut arguments = serde_json::json!({ "query": sql });
        for (field, value) in [
            ("database", &ctx.database),
            ("schema", &ctx.schema),
            ("warehouse", &ctx.warehouse),
        ] {
            if let Some(value) = value {
                arguments[field] = serde_json::json!(value);
            }
        }
        let result: ExecuteResult = self
            .call_tool(TOOL_EXECUTE, arguments, Some(deadline))
            .await?;
        let row_count = result.row_count.unwrap_or(result.rows.len() as i64);
        if row_count == 0 && result.rows.is_empty() {
            return Err(SibylError::NoRows);
        }
        Ok(Execution {
            columns: result.columns,
            rows: result.rows,
            duration_ms: result.execution_ms.unwrap_or(0),
        })
    }

    async fn cancel(&self, query_id: &str) -> bool {
        let arguments = serde_json::json!({ "query_id": query_id });
        match self
            .call_tool::<serde_json::Value>(TOOL_CANCEL, arguments, None)
            .await
        {
            Ok(_) => true,
            Err(e) => {
                debug!(query_id, error = %e, "remote cancel not applied");
                false
            }
        }
    }
}
