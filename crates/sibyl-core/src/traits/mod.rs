// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for Sibyl's pluggable collaborators.
//!
//! All traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod counters;
pub mod expert;
pub mod resolver;

pub use counters::CounterStore;
pub use expert::QueryExpert;
pub use resolver::IdentityResolver;
