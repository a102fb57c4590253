// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cache key derivation.
//!
//! Keys are content-addressed on the *generated SQL*, not the natural
//! language question: two differently-phrased questions that generate
//! identical SQL share one entry. Normalization is whitespace collapsing
//! and case folding only. Syntactically different but semantically
//! identical SQL does NOT collide; that canonicalization is out of scope
//! here, by decision, not oversight.

use sha2::{Digest, Sha256};
use sibyl_core::types::ExpertContext;

/// A stable cache key: sha-256 over normalized SQL plus execution context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for `sql` executed under `ctx`.
    pub fn derive(sql: &str, ctx: &ExpertContext) -> Self {
        let normalized = normalize_sql(sql);
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        for part in [&ctx.database, &ctx.schema, &ctx.warehouse] {
            hasher.update([0u8]);
            if let Some(value) = part {
                hasher.update(value.to_lowercase().as_bytes());
            }
        }
        CacheKey(hex::encode(hasher.finalize()))
    }

    /// Wrap an already-derived key (operator tooling passes raw hashes).
    pub fn from_raw(key: &str) -> Self {
        CacheKey(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Collapse runs of whitespace to single spaces and fold case.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
