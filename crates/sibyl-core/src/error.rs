// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Sibyl query assistant.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Sibyl components.
///
/// Variants fall into four classes with different handling policies:
/// admission errors are returned to the user immediately and never retried;
/// infrastructure errors are retried a bounded number of times and then
/// surfaced generically; semantic errors carry a specific reason so the
/// caller can reformulate; timeouts are terminal and distinct from failure.
#[derive(Debug, Error)]
pub enum SibylError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The principal is mapped but lacks the required capability.
    #[error("permission denied: {reason}")]
    Denied { capability: String, reason: String },

    /// The principal has no identity mapping at all. Distinct from
    /// [`SibylError::Denied`], which means mapped but insufficient.
    #[error("no identity mapping for principal {principal}")]
    IdentityNotFound { principal: String },

    /// The identity resolver timed out or was unreachable. Requests fail
    /// closed on this error; it is retryable.
    #[error("identity resolver unavailable: {message}")]
    ResolverUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Admission rejected by the rate limiter.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// The query-generation service failed or was unreachable.
    #[error("query expert unavailable: {message}")]
    ExpertUnavailable {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The generated SQL was rejected by the warehouse.
    #[error("invalid SQL: {detail}")]
    InvalidSql { detail: String },

    /// The query executed but produced no result.
    #[error("query returned no rows")]
    NoRows,

    /// The warehouse denied access to a referenced object.
    #[error("warehouse access denied: {detail}")]
    WarehouseDenied { detail: String },

    /// Operation exceeded its deadline.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// The caller requested cancellation before completion.
    #[error("cancelled by caller")]
    Cancelled,

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SibylError {
    /// Infrastructure-class errors are the only ones eligible for automatic
    /// retry (bounded exponential backoff). Everything else is surfaced.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SibylError::Storage { .. }
                | SibylError::ResolverUnavailable { .. }
                | SibylError::ExpertUnavailable { .. }
        )
    }

    /// Semantic errors carry a specific reason the caller can act on.
    pub fn is_semantic(&self) -> bool {
        matches!(
            self,
            SibylError::InvalidSql { .. } | SibylError::NoRows | SibylError::WarehouseDenied { .. }
        )
    }

    /// Whether the specific error detail may be shown to the end user.
    ///
    /// Infrastructure detail goes to the audit log only; users get a generic
    /// "try again later" with a correlation id.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            SibylError::Denied { .. }
                | SibylError::RateLimited { .. }
                | SibylError::Timeout { .. }
                | SibylError::Cancelled
        ) || self.is_semantic()
    }
}
