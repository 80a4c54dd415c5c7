// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! IP address classification.
//!
//! Decides whether an already-resolved address points into reserved,
//! private, loopback or link-local space. IPv4-mapped IPv6 addresses
//! (`::ffff:a.b.c.d`) are normalized to IPv4 before any range check.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Blocked IPv4 ranges as `(network, prefix length)`.
const BLOCKED_V4: [(Ipv4Addr, u8); 6] = [
    (Ipv4Addr::new(127, 0, 0, 0), 8),   // loopback
    (Ipv4Addr::new(10, 0, 0, 0), 8),    // RFC 1918
    (Ipv4Addr::new(172, 16, 0, 0), 12), // RFC 1918
    (Ipv4Addr::new(192, 168, 0, 0), 16), // RFC 1918
    (Ipv4Addr::new(169, 254, 0, 0), 16), // link-local, cloud metadata
    (Ipv4Addr::new(0, 0, 0, 0), 8),     // "this network"
];

/// Check whether an IP literal is private.
///
/// Strings that do not parse as an IP address are treated as private, so a
/// malformed value can never widen what is reachable. Brackets around IPv6
/// literals (`[::1]`) are accepted.
pub fn is_private(ip: &str) -> bool {
    let trimmed = ip.trim().trim_start_matches('[').trim_end_matches(']');
    match trimmed.parse::<IpAddr>() {
        Ok(addr) => is_private_addr(&addr),
        Err(_) => true,
    }
}

/// Check whether a parsed address is private.
pub fn is_private_addr(addr: &IpAddr) -> bool {
    match normalize(*addr) {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => is_private_v6(v6),
    }
}

/// Collapse an IPv4-mapped IPv6 address into its IPv4 form.
pub fn normalize(addr: IpAddr) -> IpAddr {
    match addr {
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map(IpAddr::V4)
            .unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    }
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let bits = u32::from(ip);
    BLOCKED_V4.iter().any(|(network, prefix)| {
        let mask = u32::MAX << (32 - u32::from(*prefix));
        bits & mask == u32::from(*network) & mask
    })
}

fn is_private_v6(ip: Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // fe80::/10
        || (first & 0xffc0) == 0xfe80
        // fc00::/7
        || (first & 0xfe00) == 0xfc00
}
