// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for flowpod-egress.

use std::net::IpAddr;

use thiserror::Error;

/// Wire code reported for every blocked outbound call.
pub const SSRF_BLOCKED: &str = "SSRF_BLOCKED";

/// Why an outbound target was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockReason {
    /// Hostname carries an internal-only DNS suffix.
    #[error("hostname {0} is internal-only")]
    InternalHostname(String),

    /// The target is, or resolves to, a private address.
    #[error("address {0} is private")]
    PrivateAddress(IpAddr),

    /// Neither A nor AAAA lookups produced an address.
    #[error("hostname {0} did not resolve to any address")]
    Unresolvable(String),

    /// DNS resolution did not finish within the configured bound.
    #[error("resolution of {0} timed out")]
    ResolutionTimeout(String),
}

/// Egress guard errors.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EgressError {
    /// The target is not allowed. Fatal for the call that triggered it.
    #[error("SSRF_BLOCKED: outbound request to {target} blocked: {reason}")]
    Blocked {
        /// URL or hostname that was checked.
        target: String,
        /// Which rule refused it.
        reason: BlockReason,
    },

    /// The URL could not be parsed or has no host.
    #[error("invalid URL {url}: {message}")]
    InvalidUrl {
        /// The offending input.
        url: String,
        /// Parser message.
        message: String,
    },
}

impl EgressError {
    /// Build a [`EgressError::Blocked`].
    pub fn blocked(target: impl Into<String>, reason: BlockReason) -> Self {
        EgressError::Blocked {
            target: target.into(),
            reason,
        }
    }

    /// Whether this error is a policy block (as opposed to bad input).
    pub fn is_blocked(&self) -> bool {
        matches!(self, EgressError::Blocked { .. })
    }

    /// Stable error code for wire responses.
    pub fn code(&self) -> &'static str {
        match self {
            EgressError::Blocked { .. } => SSRF_BLOCKED,
            EgressError::InvalidUrl { .. } => "INVALID_URL",
        }
    }
}

/// Result type for egress checks.
pub type Result<T> = std::result::Result<T, EgressError>;
