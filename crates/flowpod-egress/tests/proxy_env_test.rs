// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Proxy variables in the pod environment must not reroute guarded calls.
//!
//! Kept in its own test binary: the variables are process-wide.

use flowpod_egress::{
    EgressConfig, EgressGuard, GuardedClient, GuardedClientConfig, OutboundRequest,
    StaticResolver,
};
use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const PROXY_VARS: &[&str] = &[
    "HTTP_PROXY",
    "http_proxy",
    "HTTPS_PROXY",
    "https_proxy",
    "ALL_PROXY",
    "all_proxy",
];

#[tokio::test]
async fn test_proxy_environment_is_ignored() {
    // SAFETY: the only test in this binary; set before any client is built
    unsafe {
        for var in PROXY_VARS {
            env::set_var(var, "http://proxy.corp.internal:3128");
        }
        env::remove_var("NO_PROXY");
        env::remove_var("no_proxy");
    }

    let server = MockServer::start().await;
    Mock::given(path("/v1/rates"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;
    let port = server.address().port();

    let guard = EgressGuard::with_resolver(
        Arc::new(StaticResolver::new().with_host("api.example.com", &["127.0.0.1"])),
        EgressConfig::default().with_allowed_addresses([IpAddr::V4(Ipv4Addr::LOCALHOST)]),
    );
    let client = GuardedClient::new(guard, GuardedClientConfig::default()).unwrap();

    let response = client
        .send(OutboundRequest::get(format!("http://api.example.com:{port}/v1/rates")))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body, "ok");
}
