// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! DNS resolution backends for the egress guard.
//!
//! A and AAAA results are reported separately so that the guard can treat a
//! failure of one record type as "no addresses of that type".

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Per-family results of one resolution.
pub type FamilyLookup = (io::Result<Vec<Ipv4Addr>>, io::Result<Vec<Ipv6Addr>>);

/// Trait for hostname resolvers.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Resolve IPv4 (A) addresses.
    async fn lookup_a(&self, host: &str) -> io::Result<Vec<Ipv4Addr>>;

    /// Resolve IPv6 (AAAA) addresses.
    async fn lookup_aaaa(&self, host: &str) -> io::Result<Vec<Ipv6Addr>>;

    /// Resolve both record types. The guard calls this once per check.
    ///
    /// The default runs both lookups concurrently; backends that answer both
    /// families from one query override it.
    async fn lookup_ip(&self, host: &str) -> FamilyLookup {
        tokio::join!(self.lookup_a(host), self.lookup_aaaa(host))
    }
}

fn split_families(addrs: Vec<IpAddr>) -> (Vec<Ipv4Addr>, Vec<Ipv6Addr>) {
    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for ip in addrs {
        match ip {
            IpAddr::V4(addr) => v4.push(addr),
            IpAddr::V6(addr) => v6.push(addr),
        }
    }
    (v4, v6)
}

/// Resolver backed by the operating system (`getaddrinfo` via tokio).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl SystemResolver {
    async fn lookup_all(host: &str) -> io::Result<Vec<IpAddr>> {
        let addrs = tokio::net::lookup_host((host, 0)).await?;
        Ok(addrs.map(|addr| addr.ip()).collect())
    }
}

#[async_trait]
impl HostResolver for SystemResolver {
    async fn lookup_a(&self, host: &str) -> io::Result<Vec<Ipv4Addr>> {
        Ok(split_families(Self::lookup_all(host).await?).0)
    }

    async fn lookup_aaaa(&self, host: &str) -> io::Result<Vec<Ipv6Addr>> {
        Ok(split_families(Self::lookup_all(host).await?).1)
    }

    /// One `getaddrinfo` call answers both families.
    async fn lookup_ip(&self, host: &str) -> FamilyLookup {
        match Self::lookup_all(host).await {
            Ok(addrs) => {
                let (v4, v6) = split_families(addrs);
                (Ok(v4), Ok(v6))
            }
            Err(e) => {
                let copy = io::Error::new(e.kind(), e.to_string());
                (Err(e), Err(copy))
            }
        }
    }
}

/// Fixed host table, used in tests and for air-gapped deployments.
///
/// Unknown hosts fail both lookups with `NotFound`, like NXDOMAIN.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, Vec<IpAddr>>,
    failing_v4: Vec<String>,
    failing_v6: Vec<String>,
    delay: Option<Duration>,
}

impl StaticResolver {
    /// Create an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a hostname to addresses of either family.
    pub fn with_host(mut self, host: &str, addrs: &[&str]) -> Self {
        let parsed = addrs.iter().filter_map(|a| a.parse().ok()).collect();
        self.hosts.insert(host.to_lowercase(), parsed);
        self
    }

    /// Make the A lookup for `host` fail with an I/O error.
    pub fn with_failing_a(mut self, host: &str) -> Self {
        self.failing_v4.push(host.to_lowercase());
        self
    }

    /// Make the AAAA lookup for `host` fail with an I/O error.
    pub fn with_failing_aaaa(mut self, host: &str) -> Self {
        self.failing_v6.push(host.to_lowercase());
        self
    }

    /// Delay every lookup, to exercise resolution timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    async fn lookup(&self, host: &str, failing: &[String]) -> io::Result<Vec<IpAddr>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let host = host.to_lowercase();
        if failing.contains(&host) {
            return Err(io::Error::other(format!("lookup of {host} failed")));
        }
        self.hosts
            .get(&host)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("{host}: NXDOMAIN")))
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn lookup_a(&self, host: &str) -> io::Result<Vec<Ipv4Addr>> {
        Ok(split_families(self.lookup(host, &self.failing_v4).await?).0)
    }

    async fn lookup_aaaa(&self, host: &str) -> io::Result<Vec<Ipv6Addr>> {
        Ok(split_families(self.lookup(host, &self.failing_v6).await?).1)
    }
}
