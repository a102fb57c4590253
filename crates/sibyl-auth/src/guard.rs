// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The permission guard consulted before admission.
//!
//! Side-effect-free except for one audit entry on denial. Resolver
//! failures fail closed: an unreachable resolver means the request is
//! refused, never waved through.

use std::sync::Arc;

use sibyl_audit::AuditLog;
use sibyl_core::traits::IdentityResolver;
use sibyl_core::types::{AuditCategory, AuditSeverity, Identity, Principal};
use sibyl_core::SibylError;
use tracing::{debug, warn};

use crate::capability::{Capability, CapabilitySet};

/// Authorizes principals against capabilities via the injected resolver.
pub struct PermissionGuard {
    resolver: Arc<dyn IdentityResolver>,
    audit: AuditLog,
}

impl PermissionGuard {
    pub fn new(resolver: Arc<dyn IdentityResolver>, audit: AuditLog) -> Self {
        Self { resolver, audit }
    }

    /// Authorize `principal` for `capability`.
    ///
    /// Returns the resolved identity on success so callers can reuse it
    /// (e.g. the directory id forwarded to the expert service). Error
    /// cases are distinct: [`SibylError::Denied`] means mapped but
    /// insufficient, [`SibylError::IdentityNotFound`] means no mapping,
    /// [`SibylError::ResolverUnavailable`] means the resolver could not
    /// answer and the request fails closed.
    pub async fn authorize(
        &self,
        principal: &Principal,
        capability: Capability,
    ) -> Result<Identity, SibylError> {
        let identity = self.resolver.resolve(principal).await?;

        if !identity.active {
            return self
                .deny(principal, capability, "identity is deactivated")
                .await;
        }

        let caps = CapabilitySet::from_identity(&identity.roles, &identity.capabilities);
        if !caps.grants(capability) {
            return self
                .deny(principal, capability, "capability not granted")
                .await;
        }

        debug!(
            principal = %principal,
            capability = %capability,
            resolver = self.resolver.name(),
            "authorized"
        );
        Ok(identity)
    }

    async fn deny(
        &self,
        principal: &Principal,
        capability: Capability,
        reason: &str,
    ) -> Result<Identity, SibylError> {
        warn!(principal = %principal, capability = %capability, reason, "authorization denied");

        let mut entry = sibyl_audit::entry(
            "authorization_denied",
            AuditCategory::Security,
            AuditSeverity::Warning,
            principal.as_str(),
        );
        entry.payload = Some(
            serde_json::json!({
                "capability": capability.to_string(),
                "reason": reason,
                "resolver": self.resolver.name(),
            })
            .to_string(),
        );
        self.audit.record_or_degrade(entry).await;

        Err(SibylError::Denied {
            capability: capability.to_string(),
            reason: reason.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolvers::LocalTableResolver;
    use sibyl_storage::queries::user_mappings;
    use sibyl_storage::time::now_iso;
    use sibyl_storage::{Database, UserMapping};
    use std::time::Duration;
    use tempfile::tempdir;

    async fn guard_with_users() -> (PermissionGuard, AuditLog, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Arc::new(
            Database::open(dir.path().join("t.db").to_str().unwrap())
                .await
                .unwrap(),
        );
        for (chat, principal, roles, active) in [
            ("U1", "analyst-1", vec!["analyst"], true),
            ("U2", "viewer-1", vec!["viewer"], true),
            ("U3", "root", vec!["super_admin"], true),
            ("U4", "ghost", vec!["analyst"], false),
        ] {
            let mapping = UserMapping {
                chat_user_id: chat.to_string(),
                principal: principal.to_string(),
                directory_id: None,
                email: None,
                full_name: None,
                roles: roles.into_iter().map(String::from).collect(),
                capabilities: vec![],
                active,
                created_at: now_iso(),
                updated_at: now_iso(),
            };
            user_mappings::upsert_mapping(&db, &mapping).await.unwrap();
        }
        let audit = AuditLog::new(db.clone());
        let resolver = Arc::new(LocalTableResolver::new(db, Duration::from_secs(5)));
        (PermissionGuard::new(resolver, audit.clone()), audit, dir)
    }

    #[tokio::test]
    async fn analyst_may_execute_queries() {
        let (guard, _audit, _dir) = guard_with_users().await;
        let identity = guard
            .authorize(&Principal::from("analyst-1"), Capability::QueryExecute)
            .await
            .unwrap();
        assert_eq!(identity.principal, "analyst-1");
    }

    #[tokio::test]
    async fn viewer_is_denied_execute_and_denial_is_audited() {
        let (guard, audit, _dir) = guard_with_users().await;
        let err = guard
            .authorize(&Principal::from("viewer-1"), Capability::QueryExecute)
            .await
            .unwrap_err();
        assert!(matches!(err, SibylError::Denied { .. }));

        let entries = audit
            .recent(Some(AuditCategory::Security), Some("viewer-1"), 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, "authorization_denied");
    }

    #[tokio::test]
    async fn allowed_requests_write_no_audit_entries() {
        let (guard, audit, _dir) = guard_with_users().await;
        guard
            .authorize(&Principal::from("analyst-1"), Capability::QueryExecute)
            .await
            .unwrap();
        let entries = audit.recent(None, None, 10).await.unwrap();
        assert!(entries.is_empty(), "authorize must be side-effect-free on allow");
    }

    #[tokio::test]
    async fn super_admin_is_granted_everything() {
        let (guard, _audit, _dir) = guard_with_users().await;
        for cap in [
            Capability::QueryExecute,
            Capability::UserAdmin,
            Capability::AuditView,
        ] {
            guard
                .authorize(&Principal::from("root"), cap)
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn deactivated_identity_is_denied_not_missing() {
        let (guard, _audit, _dir) = guard_with_users().await;
        let err = guard
            .authorize(&Principal::from("ghost"), Capability::QueryExecute)
            .await
            .unwrap_err();
        // The local resolver only surfaces active mappings, so a
        // deactivated user resolves to IdentityNotFound there; both paths
        // must refuse.
        assert!(matches!(
            err,
            SibylError::Denied { .. } | SibylError::IdentityNotFound { .. }
        ));
    }

    #[tokio::test]
    async fn unmapped_principal_is_identity_not_found() {
        let (guard, _audit, _dir) = guard_with_users().await;
        let err = guard
            .authorize(&Principal::from("nobody"), Capability::QueryExecute)
            .await
            .unwrap_err();
        assert!(matches!(err, SibylError::IdentityNotFound { .. }));
    }
}
