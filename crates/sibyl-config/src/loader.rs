// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./sibyl.toml` > `~/.config/sibyl/sibyl.toml` >
//! `/etc/sibyl/sibyl.toml` with environment variable overrides via the
//! `SIBYL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::SibylConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/sibyl/sibyl.toml` (system-wide)
/// 3. `~/.config/sibyl/sibyl.toml` (user XDG config)
/// 4. `./sibyl.toml` (local directory)
/// 5. `SIBYL_*` environment variables
pub fn load_config() -> Result<SibylConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SibylConfig::default()))
        .merge(Toml::file("/etc/sibyl/sibyl.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("sibyl/sibyl.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("sibyl.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<SibylConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SibylConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<SibylConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(SibylConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `SIBYL_LIMITS_PER_PRINCIPAL` must map
/// to `limits.per_principal`, not `limits.per.principal`.
fn env_provider() -> Env {
    Env::prefixed("SIBYL_").map(|key| {
        // `key` is the lowercased env var name with the prefix stripped.
        // Example: SIBYL_STORAGE_DATABASE_PATH -> "storage_database_path"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("expert_", "expert.", 1)
            .replacen("warehouse_", "warehouse.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("auth_", "auth.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("cache_", "cache.", 1)
            .replacen("session_", "session.", 1)
            .replacen("query_", "query.", 1);
        mapped.into()
    })
}
