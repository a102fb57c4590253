// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the HTTP expert client against a mock server.

use std::time::Duration;

use sibyl_core::traits::QueryExpert;
use sibyl_core::types::ExpertContext;
use sibyl_core::SibylError;
use sibyl_expert::HttpExpert;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn server_with_health() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn client_for(server: &MockServer) -> HttpExpert {
    HttpExpert::new(
        server.uri(),
        Duration::from_secs(5),
        Duration::from_secs(30),
    )
    .unwrap()
}

#[tokio::test]
async fn execute_round_trips_columns_and_rows() {
    let server = server_with_health().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .and(body_partial_json(serde_json::json!({
            "params": {"name": "queryexpert__execute_query"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {
                "columns": ["region", "revenue"],
                "rows": [["emea", 120.5], ["amer", 340.0]],
                "row_count": 2,
                "execution_ms": 1840
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let execution = client
        .execute(
            "select region, sum(revenue) from sales group by region",
            &ExpertContext::default(),
            Duration::from_secs(5),
        )
        .await
        .unwrap();

    assert_eq!(execution.columns, vec!["region", "revenue"]);
    assert_eq!(execution.rows.len(), 2);
    assert_eq!(execution.duration_ms, 1840);
}

#[tokio::test]
async fn semantic_wire_errors_map_to_typed_variants() {
    let server = server_with_health().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "error": {"kind": "invalid_sql", "message": "unknown column `reven`"}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .execute("select reven from sales", &ExpertContext::default(), Duration::from_secs(5))
        .await
        .unwrap_err();

    match err {
        SibylError::InvalidSql { detail } => assert!(detail.contains("reven")),
        other => panic!("expected InvalidSql, got {other}"),
    }
    assert!(!SibylError::NoRows.is_retryable());
}

#[tokio::test]
async fn transient_5xx_is_retried_once_then_succeeds() {
    let server = server_with_health().await;
    // First attempt: 503. Retry: success. Expect exactly 2 calls.
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"tables": [{"table_name": "ANALYTICS.SALES.REVENUE"}]}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let tables = client
        .find_tables("revenue by region", &ExpertContext::default())
        .await
        .unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "ANALYTICS.SALES.REVENUE");
}

#[tokio::test]
async fn failing_health_probe_blocks_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .find_tables("anything", &ExpertContext::default())
        .await
        .unwrap_err();
    assert!(matches!(err, SibylError::ExpertUnavailable { .. }));
}

#[tokio::test]
async fn empty_execution_maps_to_no_rows() {
    let server = server_with_health().await;
    Mock::given(method("POST"))
        .and(path("/rpc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "result": {"columns": ["a"], "rows": [], "row_count": 0}
        })))
        .mount(&server)
        .await;

    let client = client_for(&server);
    let err = client
        .execute("select a from empty", &ExpertContext::default(), Duration::from_secs(5))
        .await
        .unwrap_err();
    assert!(matches!(err, SibylError::NoRows));
}
