// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared helpers for flowpod-runtime integration tests.

#![allow(dead_code)]

use serde_json::{Value, json};
use std::sync::Arc;

use flowpod_egress::{EgressConfig, EgressGuard, GuardedClient, GuardedClientConfig, StaticResolver};
use flowpod_runtime::Pod;
use flowpod_runtime::engine::MockEngine;
use flowpod_runtime::pod::LoadRequest;
use flowpod_runtime::store::Graph;

pub const SECRET: &str = "test-pod-secret";
pub const GATEWAY: &str = "http://gateway.flowpod.svc.cluster.local:8080";

/// Guarded client with deterministic DNS.
pub fn outbound(resolver: StaticResolver) -> GuardedClient {
    let guard = EgressGuard::with_resolver(Arc::new(resolver), EgressConfig::default());
    GuardedClient::new(guard, GuardedClientConfig::default()).unwrap()
}

/// A pod over `engine` with no resolvable hosts.
pub fn test_pod(engine: Arc<MockEngine>) -> Pod {
    Pod::new("pod-test-0", SECRET, engine, outbound(StaticResolver::new()))
}

/// A graph with `n` nodes.
pub fn graph(n: usize) -> Graph {
    Graph(Value::Array(
        (0..n).map(|i| json!({"id": format!("n{i}"), "type": "inject"})).collect(),
    ))
}

/// A valid load request for `tenant`.
pub fn load_request(tenant: &str, nodes: usize) -> LoadRequest {
    LoadRequest {
        user_id: Some(tenant.to_string()),
        flows: graph(nodes),
        gateway_url: Some(GATEWAY.to_string()),
        pod_secret: SECRET.to_string(),
        credentials: json!({ "owner": tenant }),
        settings: json!({ "tenant": tenant }),
    }
}
