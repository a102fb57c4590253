// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Sibyl query assistant.
//!
//! Provides WAL-mode SQLite storage with embedded migrations, a
//! single-writer concurrency model via `tokio-rusqlite`, and typed
//! operations for sessions, query records, the result cache, rate
//! counters, the audit log, and user mappings.

pub mod database;
pub mod migrations;
pub mod models;
pub mod queries;
pub mod time;

pub use database::Database;
pub use models::*;
