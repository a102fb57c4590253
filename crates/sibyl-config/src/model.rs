// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Sibyl query assistant.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Sibyl configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SibylConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// External query-generation service settings.
    #[serde(default)]
    pub expert: ExpertConfig,

    /// Default warehouse execution context.
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Identity resolution and authorization settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Rate-limiting windows and limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Session lifecycle settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// Per-request orchestration settings.
    #[serde(default)]
    pub query: QueryConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the service instance.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "sibyl".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// External query-generation service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExpertConfig {
    /// Base URL of the query-expert service.
    #[serde(default = "default_expert_base_url")]
    pub base_url: String,

    /// Per-call HTTP timeout in seconds.
    #[serde(default = "default_expert_timeout_secs")]
    pub timeout_secs: u64,

    /// Minimum interval between health probes in seconds.
    #[serde(default = "default_health_interval_secs")]
    pub health_check_interval_secs: u64,

    /// Use the canned in-process mock instead of the HTTP client.
    #[serde(default)]
    pub mock_mode: bool,

    /// Artificial latency for the mock, in milliseconds.
    #[serde(default = "default_mock_delay_ms")]
    pub mock_delay_ms: u64,
}

impl Default for ExpertConfig {
    fn default() -> Self {
        Self {
            base_url: default_expert_base_url(),
            timeout_secs: default_expert_timeout_secs(),
            health_check_interval_secs: default_health_interval_secs(),
            mock_mode: false,
            mock_delay_ms: default_mock_delay_ms(),
        }
    }
}

fn default_expert_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_expert_timeout_secs() -> u64 {
    300
}

fn default_health_interval_secs() -> u64 {
    30
}

fn default_mock_delay_ms() -> u64 {
    200
}

/// Default warehouse execution context forwarded to the expert service.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WarehouseConfig {
    /// Target database name.
    #[serde(default)]
    pub database: Option<String>,

    /// Target schema name.
    #[serde(default)]
    pub schema: Option<String>,

    /// Compute warehouse to execute against.
    #[serde(default)]
    pub warehouse: Option<String>,
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// Timeout for a single store round-trip, in milliseconds. Distinct
    /// from (and much shorter than) the overall request deadline.
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            op_timeout_ms: default_op_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    "sibyl.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

fn default_op_timeout_ms() -> u64 {
    5_000
}

/// Which identity resolver backs the permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverKind {
    /// Read the user-mapping table in local storage.
    Local,
    /// Call an external directory service over HTTP.
    Directory,
}

/// Identity resolution and authorization configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// Resolver implementation to wire in.
    #[serde(default = "default_resolver")]
    pub resolver: ResolverKind,

    /// Base URL of the directory service (required for `directory`).
    #[serde(default)]
    pub directory_url: Option<String>,

    /// Directory service request timeout in milliseconds.
    #[serde(default = "default_directory_timeout_ms")]
    pub directory_timeout_ms: u64,

    /// API key sent to the directory service, if it requires one.
    #[serde(default)]
    pub directory_api_key: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            resolver: default_resolver(),
            directory_url: None,
            directory_timeout_ms: default_directory_timeout_ms(),
            directory_api_key: None,
        }
    }
}

fn default_resolver() -> ResolverKind {
    ResolverKind::Local
}

fn default_directory_timeout_ms() -> u64 {
    5_000
}

/// Rate-limiting configuration.
///
/// Both windows are fixed (bucketed) windows; see `sibyl-limiter` for the
/// burst-at-boundary tradeoff that choice accepts.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Maximum admitted requests per principal per window.
    #[serde(default = "default_per_principal")]
    pub per_principal: u64,

    /// Per-principal window length in seconds.
    #[serde(default = "default_window_secs")]
    pub per_principal_window_secs: u64,

    /// Maximum admitted requests across all principals per window.
    #[serde(default = "default_global")]
    pub global: u64,

    /// Global window length in seconds.
    #[serde(default = "default_window_secs")]
    pub global_window_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            per_principal: default_per_principal(),
            per_principal_window_secs: default_window_secs(),
            global: default_global(),
            global_window_secs: default_window_secs(),
        }
    }
}

fn default_per_principal() -> u64 {
    10
}

fn default_global() -> u64 {
    100
}

fn default_window_secs() -> u64 {
    60
}

/// Result cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    /// Absolute TTL for cached results, in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between background purge sweeps, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_cache_ttl_secs() -> u64 {
    1_800
}

fn default_sweep_interval_secs() -> u64 {
    300
}

/// Session lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Idle time after which a session is flagged inactive, in seconds.
    #[serde(default = "default_idle_threshold_secs")]
    pub idle_threshold_secs: u64,

    /// Interval between reaper runs, in seconds.
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: default_idle_threshold_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

fn default_idle_threshold_secs() -> u64 {
    86_400
}

fn default_reap_interval_secs() -> u64 {
    600
}

/// Per-request orchestration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Overall deadline ceiling for one request, in seconds.
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Maximum automatic retries for infrastructure errors.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff between retries, in milliseconds.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Cap on rows returned to the caller.
    #[serde(default = "default_max_result_rows")]
    pub max_result_rows: usize,

    /// Progress channel capacity per request.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            deadline_secs: default_deadline_secs(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            max_result_rows: default_max_result_rows(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

fn default_deadline_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_max_result_rows() -> usize {
    10_000
}

fn default_progress_buffer() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = SibylConfig::default();
        assert_eq!(config.agent.name, "sibyl");
        assert_eq!(config.agent.log_level, "info");
        assert_eq!(config.limits.per_principal, 10);
        assert_eq!(config.limits.global, 100);
        assert_eq!(config.limits.per_principal_window_secs, 60);
        assert_eq!(config.cache.ttl_secs, 1_800);
        assert_eq!(config.session.idle_threshold_secs, 86_400);
        assert_eq!(config.query.deadline_secs, 300);
        assert_eq!(config.query.max_retries, 2);
        assert_eq!(config.auth.resolver, ResolverKind::Local);
        assert!(config.storage.wal_mode);
    }

    #[test]
    fn resolver_kind_deserializes_lowercase() {
        let kind: ResolverKind = serde_json::from_str("\"directory\"").unwrap();
        assert_eq!(kind, ResolverKind::Directory);
    }
}
