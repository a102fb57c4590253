// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes: positive windows and limits, resolver wiring requirements,
//! recognized log levels.

use crate::diagnostic::ConfigError;
use crate::model::{ResolverKind, SibylConfig};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &SibylConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !VALID_LOG_LEVELS.contains(&config.agent.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "agent.log_level `{}` is not one of: {}",
                config.agent.log_level,
                VALID_LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    if config.expert.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "expert.base_url must not be empty".to_string(),
        });
    }

    for (name, value) in [
        ("limits.per_principal", config.limits.per_principal),
        (
            "limits.per_principal_window_secs",
            config.limits.per_principal_window_secs,
        ),
        ("limits.global", config.limits.global),
        ("limits.global_window_secs", config.limits.global_window_secs),
        ("cache.ttl_secs", config.cache.ttl_secs),
        ("session.idle_threshold_secs", config.session.idle_threshold_secs),
        ("query.deadline_secs", config.query.deadline_secs),
        ("expert.timeout_secs", config.expert.timeout_secs),
    ] {
        if value == 0 {
            errors.push(ConfigError::Validation {
                message: format!("{name} must be greater than zero"),
            });
        }
    }

    // The per-principal limit exceeding the global limit would make the
    // per-principal window unreachable; almost certainly a misconfiguration.
    if config.limits.per_principal > config.limits.global {
        errors.push(ConfigError::Validation {
            message: format!(
                "limits.per_principal ({}) must not exceed limits.global ({})",
                config.limits.per_principal, config.limits.global
            ),
        });
    }

    if config.auth.resolver == ResolverKind::Directory
        && config
            .auth
            .directory_url
            .as_deref()
            .is_none_or(|u| u.trim().is_empty())
    {
        errors.push(ConfigError::Validation {
            message: "auth.directory_url is required when auth.resolver = \"directory\""
                .to_string(),
        });
    }

    if config.query.progress_buffer == 0 {
        errors.push(ConfigError::Validation {
            message: "query.progress_buffer must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates_clean() {
        assert!(validate_config(&SibylConfig::default()).is_ok());
    }

    #[test]
    fn zero_window_is_rejected() {
        let mut config = SibylConfig::default();
        config.limits.per_principal_window_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("per_principal_window_secs")));
    }

    #[test]
    fn directory_resolver_requires_url() {
        let mut config = SibylConfig::default();
        config.auth.resolver = ResolverKind::Directory;
        config.auth.directory_url = None;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.to_string().contains("directory_url")));
    }

    #[test]
    fn per_principal_above_global_is_rejected() {
        let mut config = SibylConfig::default();
        config.limits.per_principal = 500;
        config.limits.global = 100;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn bogus_log_level_is_rejected() {
        let mut config = SibylConfig::default();
        config.agent.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }
}
