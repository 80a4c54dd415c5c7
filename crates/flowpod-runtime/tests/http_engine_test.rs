// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the admin-API engine adapter.

mod common;

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use flowpod_egress::StaticResolver;
use flowpod_runtime::engine::{
    DeployContext, DeployIdentity, Deployment, EngineError, FlowEngine, HttpEngine,
};
use flowpod_runtime::store::Graph;

fn deployment(identity: DeployIdentity, graph: Graph) -> Deployment {
    Deployment {
        identity,
        graph,
        credentials: json!({ "k": "v" }),
        settings: json!({}),
        context: DeployContext {
            outbound: common::outbound(StaticResolver::new()),
            bridge: None,
        },
    }
}

#[tokio::test]
async fn test_ready_when_settings_answers() {
    let admin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&admin)
        .await;

    let engine = HttpEngine::new(admin.uri(), Duration::from_secs(2)).unwrap();
    assert_eq!(engine.engine_type(), "http");
    assert!(engine.is_ready().await);
}

#[tokio::test]
async fn test_not_ready_while_booting() {
    let admin = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&admin)
        .await;

    let engine = HttpEngine::new(admin.uri(), Duration::from_secs(2)).unwrap();
    assert!(!engine.is_ready().await);

    let unreachable = HttpEngine::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    assert!(!unreachable.is_ready().await);
}

#[tokio::test]
async fn test_deploy_is_full_replacement_under_identity() {
    let admin = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows"))
        .and(header("x-deployment-type", "full"))
        .and(header("x-deploy-identity", "tenant:u1"))
        .and(body_partial_json(json!({ "credentials": { "k": "v" } })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&admin)
        .await;

    let engine = HttpEngine::new(format!("{}/", admin.uri()), Duration::from_secs(2)).unwrap();
    let graph = Graph(json!([{ "id": "a" }, { "id": "b" }, { "id": "c" }]));

    let nodes = engine
        .deploy(deployment(DeployIdentity::Tenant("u1".to_string()), graph))
        .await
        .unwrap();
    assert_eq!(nodes, 3);
}

#[tokio::test]
async fn test_system_deploy_identity() {
    let admin = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows"))
        .and(header("x-deploy-identity", "system"))
        .and(body_partial_json(json!({ "flows": [] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&admin)
        .await;

    let engine = HttpEngine::new(admin.uri(), Duration::from_secs(2)).unwrap();
    let nodes = engine
        .deploy(deployment(DeployIdentity::System, Graph::empty()))
        .await
        .unwrap();
    assert_eq!(nodes, 0);
}

#[tokio::test]
async fn test_rejected_deploy() {
    let admin = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/flows"))
        .respond_with(ResponseTemplate::new(400).set_body_string("unknown node type"))
        .mount(&admin)
        .await;

    let engine: Arc<dyn FlowEngine> =
        Arc::new(HttpEngine::new(admin.uri(), Duration::from_secs(2)).unwrap());
    let err = engine
        .deploy(deployment(DeployIdentity::System, Graph::empty()))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Rejected(_)));
    assert!(err.to_string().contains("unknown node type"));
    assert!(engine.subscribe().is_none());
}

#[tokio::test]
async fn test_unreachable_engine() {
    let engine = HttpEngine::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
    let err = engine
        .deploy(deployment(DeployIdentity::System, Graph::empty()))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unreachable(_)));
}
