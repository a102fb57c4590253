// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity resolver trait for mapping principals to capability sets.

use async_trait::async_trait;

use crate::error::SibylError;
use crate::types::{Identity, Principal};

/// Resolves a principal to its identity (roles, capability grants).
///
/// Implementations are selected by configuration at wiring time: a
/// local-table resolver reads the user-mapping store, a directory resolver
/// calls an external directory service. The permission guard never branches
/// on which implementation it holds.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Resolves the principal, or fails with
    /// [`SibylError::IdentityNotFound`] when no mapping exists and
    /// [`SibylError::ResolverUnavailable`] when the backing service is
    /// unreachable or timed out.
    async fn resolve(&self, principal: &Principal) -> Result<Identity, SibylError>;

    /// Short name used in logs and audit payloads.
    fn name(&self) -> &str;
}
