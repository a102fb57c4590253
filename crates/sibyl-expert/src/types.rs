// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the query-expert tool-call protocol.
//!
//! The service speaks a JSON tool-call envelope: requests name a tool and
//! carry an `arguments` object; responses carry either `result` or a typed
//! `error` distinguishing semantic failures from service failures.

use serde::{Deserialize, Serialize};
use sibyl_core::types::{PriorQuery, TableRef};

/// Outbound tool-call envelope.
#[derive(Debug, Serialize)]
pub struct ToolCall {
    pub method: &'static str,
    pub params: ToolParams,
}

#[derive(Debug, Serialize)]
pub struct ToolParams {
    pub name: &'static str,
    pub arguments: serde_json::Value,
}

impl ToolCall {
    pub fn new(tool: &'static str, arguments: serde_json::Value) -> Self {
        Self {
            method: "tools/call",
            params: ToolParams {
                name: tool,
                arguments,
            },
        }
    }
}

/// Inbound envelope: exactly one of `result` or `error` is set.
#[derive(Debug, Deserialize)]
pub struct ToolResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<WireError>,
}

/// Typed error from the expert service.
#[derive(Debug, Deserialize)]
pub struct WireError {
    pub kind: String,
    #[serde(default)]
    pub message: String,
}

/// `find_table_metadata` result payload.
#[derive(Debug, Deserialize)]
pub struct TablesResult {
    #[serde(default)]
    pub tables: Vec<WireTable>,
}

#[derive(Debug, Deserialize)]
pub struct WireTable {
    pub table_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub verification_status: Option<String>,
    #[serde(default)]
    pub table_owners: Vec<String>,
}

impl From<WireTable> for TableRef {
    fn from(w: WireTable) -> Self {
        TableRef {
            name: w.table_name,
            description: w.description,
            columns: w.columns,
            verification_status: w.verification_status,
            owners: w.table_owners,
        }
    }
}

/// `search_similar_queries` result payload.
#[derive(Debug, Deserialize)]
pub struct SimilarResult {
    #[serde(default)]
    pub queries: Vec<WireQuery>,
}

#[derive(Debug, Deserialize)]
pub struct WireQuery {
    pub query_text: String,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub query_description: Option<String>,
    #[serde(default)]
    pub similarity_score: f64,
}

impl From<WireQuery> for PriorQuery {
    fn from(w: WireQuery) -> Self {
        PriorQuery {
            sql: w.query_text,
            author: w.user_name,
            description: w.query_description,
            similarity: w.similarity_score,
        }
    }
}

/// `generate_sql` result payload.
#[derive(Debug, Deserialize)]
pub struct GenerateResult {
    pub sql: String,
}

/// `execute_query` result payload.
#[derive(Debug, Deserialize)]
pub struct ExecuteResult {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<serde_json::Value>>,
    #[serde(default)]
    pub row_count: Option<i64>,
    #[serde(default)]
    pub execution_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_call_serializes_envelope_shape() {
        let call = ToolCall::new(
            "queryexpert__execute_query",
            serde_json::json!({"query": "select 1"}),
        );
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["name"], "queryexpert__execute_query");
        assert_eq!(json["params"]["arguments"]["query"], "select 1");
    }

    #[test]
    fn response_with_error_deserializes() {
        let text = r#"{"error":{"kind":"invalid_sql","message":"syntax error"}}"#;
        let resp: ToolResponse = serde_json::from_str(text).unwrap();
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().kind, "invalid_sql");
    }

    #[test]
    fn wire_table_maps_to_table_ref() {
        let wire: WireTable = serde_json::from_str(
            r#"{"table_name":"ANALYTICS.SALES.REVENUE","table_owners":["jdoe"]}"#,
        )
        .unwrap();
        let table: TableRef = wire.into();
        assert_eq!(table.name, "ANALYTICS.SALES.REVENUE");
        assert_eq!(table.owners, vec!["jdoe"]);
        assert!(table.columns.is_empty());
    }
}
