// SPDX-FileCopyrightText: 2026 Sibyl Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Authorization for the Sibyl query assistant.
//!
//! A [`PermissionGuard`] resolves a principal through a pluggable
//! [`IdentityResolver`](sibyl_core::traits::IdentityResolver) and checks
//! the derived capability set. Two resolver implementations ship: one
//! backed by the local user-mapping table, one by an external directory
//! service; configuration picks which gets wired in.

pub mod capability;
pub mod guard;
pub mod resolvers;

pub use capability::{Capability, CapabilitySet, Role};
pub use guard::PermissionGuard;
pub use resolvers::{resolver_from_config, DirectoryResolver, LocalTableResolver};
