// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client trait for the external query-generation service.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SibylError;
use crate::types::{Execution, ExpertContext, PriorQuery, TableRef};

/// The external service that turns questions into SQL and runs it.
///
/// Each call is independently timeoutable and returns a typed error that
/// distinguishes "no result" from "service failure". The orchestrator
/// drives these sequentially: `find_tables` -> `search_similar` ->
/// `generate_sql` -> `execute`.
#[async_trait]
pub trait QueryExpert: Send + Sync {
    /// Searches warehouse metadata for tables relevant to the question.
    async fn find_tables(
        &self,
        question: &str,
        ctx: &ExpertContext,
    ) -> Result<Vec<TableRef>, SibylError>;

    /// Searches for previously-run queries similar to the question.
    async fn search_similar(
        &self,
        question: &str,
        ctx: &ExpertContext,
    ) -> Result<Vec<PriorQuery>, SibylError>;

    /// Generates SQL from the question plus discovered tables and priors.
    async fn generate_sql(
        &self,
        question: &str,
        tables: &[TableRef],
        prior: &[PriorQuery],
    ) -> Result<String, SibylError>;

    /// Executes SQL against the warehouse with an explicit deadline.
    async fn execute(
        &self,
        sql: &str,
        ctx: &ExpertContext,
        deadline: Duration,
    ) -> Result<Execution, SibylError>;

    /// Best-effort out-of-band cancellation of a running remote query.
    ///
    /// Returns `false` when the remote protocol does not support it, in
    /// which case the in-flight call completes or times out on its own.
    async fn cancel(&self, _query_id: &str) -> bool {
        false
    }
}
