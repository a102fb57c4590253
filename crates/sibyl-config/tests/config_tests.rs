// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Sibyl configuration system.

use sibyl_config::diagnostic::ConfigError;
use sibyl_config::model::ResolverKind;
use sibyl_config::{load_and_validate_str, load_config_from_str};

/// Valid TOML with all known sections deserializes successfully.
#[test]
fn valid_toml_deserializes_into_sibyl_config() {
    let toml = r#"
[agent]
name = "sibyl-staging"
log_level = "debug"

[expert]
base_url = "http://expert.internal:8000"
timeout_secs = 120
mock_mode = true

[warehouse]
database = "ANALYTICS"
schema = "PUBLIC"
warehouse = "COMPUTE_WH"

[storage]
database_path = "/var/lib/sibyl/sibyl.db"
wal_mode = true

[auth]
resolver = "directory"
directory_url = "http://directory.internal:9000"
directory_timeout_ms = 2000

[limits]
per_principal = 20
per_principal_window_secs = 60
global = 200
global_window_secs = 60

[cache]
ttl_secs = 900
sweep_interval_secs = 120

[session]
idle_threshold_secs = 3600
reap_interval_secs = 300

[query]
deadline_secs = 180
max_retries = 1
max_result_rows = 5000
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.agent.name, "sibyl-staging");
    assert_eq!(config.agent.log_level, "debug");
    assert_eq!(config.expert.base_url, "http://expert.internal:8000");
    assert_eq!(config.expert.timeout_secs, 120);
    assert!(config.expert.mock_mode);
    assert_eq!(config.warehouse.database.as_deref(), Some("ANALYTICS"));
    assert_eq!(config.warehouse.warehouse.as_deref(), Some("COMPUTE_WH"));
    assert_eq!(config.storage.database_path, "/var/lib/sibyl/sibyl.db");
    assert_eq!(config.auth.resolver, ResolverKind::Directory);
    assert_eq!(
        config.auth.directory_url.as_deref(),
        Some("http://directory.internal:9000")
    );
    assert_eq!(config.limits.per_principal, 20);
    assert_eq!(config.limits.global, 200);
    assert_eq!(config.cache.ttl_secs, 900);
    assert_eq!(config.session.idle_threshold_secs, 3600);
    assert_eq!(config.query.deadline_secs, 180);
    assert_eq!(config.query.max_result_rows, 5000);
}

/// Empty TOML yields pure defaults.
#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config should use defaults");
    assert_eq!(config.agent.name, "sibyl");
    assert_eq!(config.limits.per_principal, 10);
    assert_eq!(config.limits.global, 100);
    assert_eq!(config.cache.ttl_secs, 1800);
    assert_eq!(config.auth.resolver, ResolverKind::Local);
}

/// Unknown key in a section produces an error rather than being ignored.
#[test]
fn unknown_key_is_rejected() {
    let toml = r#"
[limits]
per_principle = 10
"#;
    let err = load_config_from_str(toml).expect_err("unknown key must be rejected");
    let msg = err.to_string();
    assert!(
        msg.contains("per_principle"),
        "error should name the bad key: {msg}"
    );
}

/// A typo'd key renders with a fuzzy-match suggestion through the
/// diagnostic bridge.
#[test]
fn typo_produces_suggestion_diagnostic() {
    let toml = r#"
[cache]
ttl_sces = 600
"#;
    let errors = load_and_validate_str(toml).expect_err("typo must be rejected");
    let has_suggestion = errors.iter().any(|e| match e {
        ConfigError::UnknownKey { suggestion, .. } => {
            suggestion.as_deref() == Some("ttl_secs")
        }
        _ => false,
    });
    assert!(has_suggestion, "expected a `ttl_secs` suggestion: {errors:?}");
}

/// Wrong value type produces an InvalidType diagnostic.
#[test]
fn wrong_type_is_rejected() {
    let toml = r#"
[limits]
per_principal = "lots"
"#;
    assert!(load_config_from_str(toml).is_err());
}

/// Validation failures from a well-formed file are reported together.
#[test]
fn validation_errors_are_collected_not_fail_fast() {
    let toml = r#"
[agent]
log_level = "loud"

[limits]
per_principal = 0
"#;
    let errors = load_and_validate_str(toml).expect_err("invalid values must be rejected");
    assert!(errors.len() >= 2, "expected both errors, got {errors:?}");
}

/// Directory resolver without a URL fails validation.
#[test]
fn directory_resolver_without_url_fails_validation() {
    let toml = r#"
[auth]
resolver = "directory"
"#;
    let errors = load_and_validate_str(toml).expect_err("missing directory_url");
    assert!(errors.iter().any(|e| e.to_string().contains("directory_url")));
}
