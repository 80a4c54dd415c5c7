// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! flowpod Egress - outbound request guard
//!
//! Tenant flow graphs running inside a pod may issue arbitrary HTTP calls.
//! This crate makes sure none of them reaches private infrastructure
//! (server-side request forgery).
//!
//! ```text
//!   flow node ──► GuardedClient::send ──► EgressGuard::check ──► socket
//!                       │                        │
//!                       │ pinned resolver        ├─ internal suffix?  → SSRF_BLOCKED
//!                       │ (re-validates,         ├─ private literal?  → SSRF_BLOCKED
//!                       │  returns only          ├─ A + AAAA lookup   (bounded)
//!                       │  checked addresses)    ├─ nothing resolved? → SSRF_BLOCKED
//!                       ▼                        └─ any private?      → SSRF_BLOCKED
//!                   reqwest
//! ```
//!
//! # Blocked ranges
//!
//! | Family | Ranges |
//! |--------|--------|
//! | IPv4 | `127/8`, `10/8`, `172.16/12`, `192.168/16`, `169.254/16`, `0/8` |
//! | IPv6 | `::1`, `::`, `fe80::/10`, `fc00::/7`, and `::ffff:<blocked v4>` |
//!
//! Exact addresses listed in [`EgressConfig::allowed_addresses`] are exempt.
//! The list is empty unless the operator configures it.
//!
//! # Modules
//!
//! - [`classifier`]: IP range classification
//! - [`guard`]: the resolve-then-validate check
//! - [`resolver`]: DNS backends (system, static)
//! - [`client`]: reqwest client wired through the guard
//! - [`error`]: error types

#![deny(missing_docs)]

/// IP range classification.
pub mod classifier;

/// Guarded HTTP client for flow nodes.
pub mod client;

/// Error types for egress checks.
pub mod error;

/// Resolve-then-validate SSRF guard.
pub mod guard;

/// Hostname resolution backends.
pub mod resolver;

pub use classifier::{is_private, is_private_addr};
pub use client::{
    GuardedClient, GuardedClientConfig, OutboundError, OutboundRequest, OutboundResponse,
};
pub use error::{BlockReason, EgressError, SSRF_BLOCKED};
pub use guard::{EgressConfig, EgressDecision, EgressGuard};
pub use resolver::{FamilyLookup, HostResolver, StaticResolver, SystemResolver};
