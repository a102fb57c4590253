// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain model types for storage entities.
//!
//! The canonical types are defined in `sibyl-core::types` for use across
//! crate boundaries. This module re-exports them for convenience within
//! the storage crate.

pub use sibyl_core::types::{
    AuditCategory, AuditEntry, AuditSeverity, CacheEntry, QueryRecord, QueryStatus, Session,
    UserMapping,
};
