// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Client for the external query-generation service.
//!
//! The service owns natural-language understanding and SQL generation;
//! this crate only speaks its tool-call protocol. [`HttpExpert`] is the
//! production client; [`MockExpert`] is the canned in-process stand-in
//! selected by `expert.mock_mode` and used throughout the test suites.

pub mod client;
pub mod mock;
pub mod types;

pub use client::HttpExpert;
pub use mock::{Inject, MockExpert};
