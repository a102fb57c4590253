// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Sibyl query assistant.
//!
//! This crate provides the foundational trait definitions, error type, and
//! common types used throughout the Sibyl workspace: the inbound/outbound
//! message shapes, storage models, and the traits behind which the identity
//! resolver, shared counter store, and query-expert service sit.

pub mod error;
pub mod traits;
pub mod types;

pub use error::SibylError;
pub use types::{
    Answer, AuditCategory, AuditEntry, AuditSeverity, CacheEntry, Principal, ProgressUpdate,
    Question, QueryRecord, QueryStatus, Session, Stage,
};

pub use traits::{CounterStore, IdentityResolver, QueryExpert};
