// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolve-then-validate egress guard.
//!
//! Every outbound target goes through [`EgressGuard::check`] before a
//! socket is opened:
//!
//! 1. internal-only DNS suffixes are refused without resolution
//! 2. IP literals are classified directly
//! 3. hostnames are resolved (A and AAAA); nothing resolved means blocked
//! 4. one private address among the results blocks the whole request
//!
//! Decisions are never cached. DNS answers can change between calls.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, warn};
use url::{Host, Url};

use crate::classifier::is_private_addr;
use crate::error::{BlockReason, EgressError, Result};
use crate::resolver::{HostResolver, SystemResolver};

/// Hostname suffixes that are internal by definition.
pub const INTERNAL_SUFFIXES: &[&str] = &[
    ".svc.cluster.local",
    ".cluster.local",
    ".internal",
    ".localhost",
];

/// Default bound on a single resolution (both record types together).
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(5);

/// Guard configuration.
#[derive(Debug, Clone)]
pub struct EgressConfig {
    /// Upper bound for resolving one hostname. A timeout blocks the call.
    pub dns_timeout: Duration,
    /// Suffixes refused without resolution, lower-case with leading dot.
    pub internal_suffixes: Vec<String>,
    /// Exact addresses exempt from the private-range check, such as a
    /// sanctioned in-cluster egress gateway. Empty by default.
    pub allowed_addresses: Vec<IpAddr>,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self {
            dns_timeout: DEFAULT_DNS_TIMEOUT,
            internal_suffixes: INTERNAL_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            allowed_addresses: Vec::new(),
        }
    }
}

impl EgressConfig {
    /// Set the resolution timeout.
    pub fn with_dns_timeout(mut self, timeout: Duration) -> Self {
        self.dns_timeout = timeout;
        self
    }

    /// Exempt exact addresses from the private-range check.
    pub fn with_allowed_addresses(mut self, addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        self.allowed_addresses = addrs.into_iter().map(|ip| ip.to_canonical()).collect();
        self
    }
}

/// Outcome of an allowed check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EgressDecision {
    /// URL (or bare host) that was checked.
    pub target_url: String,
    /// Every address the target resolved to.
    pub resolved_addresses: Vec<IpAddr>,
    /// Always `false` for a returned decision; blocks are errors.
    pub blocked: bool,
}

/// SSRF guard for outbound calls made by tenant graphs.
#[derive(Clone)]
pub struct EgressGuard {
    resolver: Arc<dyn HostResolver>,
    config: EgressConfig,
}

impl std::fmt::Debug for EgressGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EgressGuard")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for EgressGuard {
    fn default() -> Self {
        Self::new(EgressConfig::default())
    }
}

impl EgressGuard {
    /// Create a guard that resolves through the operating system.
    pub fn new(config: EgressConfig) -> Self {
        Self::with_resolver(Arc::new(SystemResolver), config)
    }

    /// Create a guard with a custom resolver.
    pub fn with_resolver(resolver: Arc<dyn HostResolver>, config: EgressConfig) -> Self {
        Self { resolver, config }
    }

    /// Guard configuration.
    pub fn config(&self) -> &EgressConfig {
        &self.config
    }

    /// Check a URL string.
    pub async fn check(&self, url: &str) -> Result<EgressDecision> {
        let parsed = Url::parse(url).map_err(|e| EgressError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        self.check_url(&parsed).await
    }

    /// Check a parsed URL.
    pub async fn check_url(&self, url: &Url) -> Result<EgressDecision> {
        let target = url.as_str();
        let addrs = match url.host() {
            Some(Host::Ipv4(ip)) => vec![self.check_literal(target, IpAddr::V4(ip))?],
            Some(Host::Ipv6(ip)) => vec![self.check_literal(target, IpAddr::V6(ip))?],
            Some(Host::Domain(domain)) => self.resolve_domain(target, domain).await?,
            None => {
                return Err(EgressError::InvalidUrl {
                    url: target.to_string(),
                    message: "URL has no host".to_string(),
                });
            }
        };

        debug!(target = %target, addresses = ?addrs, "Egress allowed");

        Ok(EgressDecision {
            target_url: target.to_string(),
            resolved_addresses: addrs,
            blocked: false,
        })
    }

    /// Resolve and validate a bare hostname or IP literal.
    ///
    /// Used by the pinning resolver of the guarded client, which sees hosts
    /// rather than URLs.
    pub async fn resolve_host(&self, host: &str) -> Result<Vec<IpAddr>> {
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            return Ok(vec![self.check_literal(host, ip)?]);
        }
        self.resolve_domain(host, host).await
    }

    /// Checks that need no network I/O: internal suffixes and IP literals.
    ///
    /// Redirect hops are validated with this, since the redirect policy
    /// callback is synchronous. Hostnames on a hop are still resolved and
    /// validated when the connection is made.
    pub fn check_static(&self, url: &Url) -> Result<()> {
        let target = url.as_str();
        match url.host() {
            Some(Host::Ipv4(ip)) => self.check_literal(target, IpAddr::V4(ip)).map(|_| ()),
            Some(Host::Ipv6(ip)) => self.check_literal(target, IpAddr::V6(ip)).map(|_| ()),
            Some(Host::Domain(domain)) => self.check_suffix(target, &normalize_host(domain)),
            None => Err(EgressError::InvalidUrl {
                url: target.to_string(),
                message: "URL has no host".to_string(),
            }),
        }
    }

    fn is_refused(&self, ip: &IpAddr) -> bool {
        is_private_addr(ip) && !self.config.allowed_addresses.contains(&ip.to_canonical())
    }

    fn check_literal(&self, target: &str, ip: IpAddr) -> Result<IpAddr> {
        if self.is_refused(&ip) {
            return Err(block(target, BlockReason::PrivateAddress(ip)));
        }
        Ok(ip)
    }

    fn check_suffix(&self, target: &str, host: &str) -> Result<()> {
        let internal = self.config.internal_suffixes.iter().any(|suffix| {
            host.ends_with(suffix.as_str()) || host == suffix.trim_start_matches('.')
        });
        if internal {
            return Err(block(target, BlockReason::InternalHostname(host.to_string())));
        }
        Ok(())
    }

    async fn resolve_domain(&self, target: &str, domain: &str) -> Result<Vec<IpAddr>> {
        let host = normalize_host(domain);
        self.check_suffix(target, &host)?;

        let lookup = self.resolver.lookup_ip(&host);
        let (v4, v6) = match tokio::time::timeout(self.config.dns_timeout, lookup).await {
            Ok(results) => results,
            Err(_) => return Err(block(target, BlockReason::ResolutionTimeout(host))),
        };

        let mut addrs: Vec<IpAddr> = Vec::new();
        match v4 {
            Ok(list) => addrs.extend(list.into_iter().map(IpAddr::V4)),
            Err(e) => debug!(host = %host, error = %e, "A lookup failed"),
        }
        match v6 {
            Ok(list) => addrs.extend(list.into_iter().map(IpAddr::V6)),
            Err(e) => debug!(host = %host, error = %e, "AAAA lookup failed"),
        }

        if addrs.is_empty() {
            return Err(block(target, BlockReason::Unresolvable(host)));
        }

        if let Some(private) = addrs.iter().find(|ip| self.is_refused(ip)) {
            return Err(block(target, BlockReason::PrivateAddress(*private)));
        }

        Ok(addrs)
    }
}

/// Lower-case and drop the trailing root dot (`example.com.`).
fn normalize_host(host: &str) -> String {
    host.trim_end_matches('.').to_lowercase()
}

fn block(target: &str, reason: BlockReason) -> EgressError {
    warn!(target = %target, reason = %reason, "Outbound request blocked");
    EgressError::blocked(target, reason)
}
