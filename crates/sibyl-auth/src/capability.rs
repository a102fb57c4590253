// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capabilities and the role-to-capability mapping.
//!
//! Roles are convenience bundles resolved to capabilities at authorization
//! time; direct capability grants on an identity are unioned in. The
//! `admin` capability implies every other capability.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::warn;

/// Actions a principal can be authorized to perform.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Run questions against the warehouse.
    QueryExecute,
    /// View own query history.
    QueryHistory,
    /// Share query results with others.
    QueryShare,
    /// Manage user mappings.
    UserAdmin,
    /// Read the audit log.
    AuditView,
    /// Implies every other capability.
    Admin,
}

/// Named role bundles.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Viewer,
    Analyst,
    Admin,
    SuperAdmin,
}

impl Role {
    /// Capabilities granted by this role.
    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            Role::Viewer => &[Capability::QueryHistory],
            Role::Analyst => &[
                Capability::QueryExecute,
                Capability::QueryHistory,
                Capability::QueryShare,
            ],
            Role::Admin => &[
                Capability::QueryExecute,
                Capability::QueryHistory,
                Capability::QueryShare,
                Capability::UserAdmin,
                Capability::AuditView,
            ],
            Role::SuperAdmin => &[Capability::Admin],
        }
    }
}

/// The effective capability set derived from an identity's roles and
/// direct grants.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
}

impl CapabilitySet {
    /// Build from the string-typed roles and grants carried on an identity.
    ///
    /// Unrecognized role or capability names are skipped with a warning
    /// rather than failing the request; a stale directory entry must not
    /// lock a user out of the capabilities it does name correctly.
    pub fn from_identity(roles: &[String], grants: &[String]) -> Self {
        let mut caps = Vec::new();
        for name in roles {
            match Role::from_str(name) {
                Ok(role) => caps.extend_from_slice(role.capabilities()),
                Err(_) => warn!(role = %name, "unrecognized role name, skipping"),
            }
        }
        for name in grants {
            match Capability::from_str(name) {
                Ok(cap) => caps.push(cap),
                Err(_) => warn!(capability = %name, "unrecognized capability name, skipping"),
            }
        }
        caps.sort_by_key(|c| *c as u8);
        caps.dedup();
        Self { caps }
    }

    /// Whether the set grants `cap`, directly or via `admin`.
    pub fn grants(&self, cap: Capability) -> bool {
        self.caps.contains(&cap) || self.caps.contains(&Capability::Admin)
    }

    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// The concrete capabilities in the set (admin not expanded).
    pub fn as_slice(&self) -> &[Capability] {
        &self.caps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyst_can_execute_but_not_view_audit() {
        let set = CapabilitySet::from_identity(&["analyst".to_string()], &[]);
        assert!(set.grants(Capability::QueryExecute));
        assert!(set.grants(Capability::QueryHistory));
        assert!(!set.grants(Capability::AuditView));
        assert!(!set.grants(Capability::UserAdmin));
    }

    #[test]
    fn admin_capability_implies_everything() {
        let set = CapabilitySet::from_identity(&["super_admin".to_string()], &[]);
        for cap in [
            Capability::QueryExecute,
            Capability::QueryHistory,
            Capability::QueryShare,
            Capability::UserAdmin,
            Capability::AuditView,
            Capability::Admin,
        ] {
            assert!(set.grants(cap), "{cap} should be implied by admin");
        }
    }

    #[test]
    fn direct_grants_union_with_roles() {
        let set = CapabilitySet::from_identity(
            &["viewer".to_string()],
            &["query_execute".to_string()],
        );
        assert!(set.grants(Capability::QueryHistory));
        assert!(set.grants(Capability::QueryExecute));
        assert!(!set.grants(Capability::QueryShare));
    }

    #[test]
    fn unknown_names_are_skipped_not_fatal() {
        let set = CapabilitySet::from_identity(
            &["wizard".to_string(), "viewer".to_string()],
            &["fly".to_string()],
        );
        assert!(set.grants(Capability::QueryHistory));
        assert!(!set.is_empty());
    }
}
