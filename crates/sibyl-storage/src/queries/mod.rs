// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per collection.

pub mod audit;
pub mod cache_entries;
pub mod counters;
pub mod query_records;
pub mod sessions;
pub mod user_mappings;
