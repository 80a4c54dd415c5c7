// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end tests for the embeddable runtime.

mod common;

use common::{GATEWAY, SECRET};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

use flowpod_egress::StaticResolver;
use flowpod_runtime::engine::{FlowEvent, MockEngine};
use flowpod_runtime::runtime::PodRuntime;

async fn start(engine: Arc<MockEngine>) -> PodRuntime {
    PodRuntime::builder()
        .pod_name("pod-e2e")
        .pod_secret(SECRET)
        .engine(engine)
        .bind_addr("127.0.0.1:0".parse().unwrap())
        .resolver(Arc::new(StaticResolver::new()))
        .ready_poll_interval(Duration::from_millis(10))
        .build()
        .unwrap()
        .start()
        .await
        .unwrap()
}

/// Poll `check` until it holds or a second passes.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[test]
fn test_builder_requires_secret_and_engine() {
    let no_secret = PodRuntime::builder()
        .engine(Arc::new(MockEngine::new()))
        .build();
    assert!(no_secret.is_err());

    let no_engine = PodRuntime::builder().pod_secret(SECRET).build();
    assert!(no_engine.is_err());
}

#[tokio::test]
async fn test_readiness_follows_engine() {
    let engine = Arc::new(MockEngine::booting());
    let runtime = start(engine.clone()).await;
    let pod = runtime.pod().clone();

    assert!(!pod.is_ready());
    engine.set_ready(true);
    assert!(eventually(|| pod.is_ready()).await);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_engine_events_reach_the_pod() {
    let engine = Arc::new(MockEngine::new());
    let runtime = start(engine.clone()).await;
    let pod = runtime.pod().clone();

    engine.emit(FlowEvent::started("f1"));
    assert!(eventually(|| pod.tracker().running_count() == 1).await);

    engine.emit(FlowEvent::stopped("f1"));
    assert!(eventually(|| pod.tracker().running_count() == 0).await);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_pool_manager_round_trip_over_http() {
    let engine = Arc::new(MockEngine::new());
    let runtime = start(engine.clone()).await;
    assert!(runtime.is_running());
    let base = format!("http://{}", runtime.local_addr());
    let client = reqwest::Client::new();

    let flows: Vec<Value> = (0..12).map(|i| json!({ "id": format!("n{i}") })).collect();
    let loaded: Value = client
        .post(format!("{base}/load-flows"))
        .json(&json!({
            "userId": "u1",
            "flows": flows,
            "gatewayUrl": GATEWAY,
            "podSecret": SECRET,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(loaded, json!({ "ok": true, "nodeCount": 12 }));

    let activity: Value = client
        .get(format!("{base}/activity"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(activity["userId"], "u1");
    assert_eq!(activity["flowsRunning"], 0);

    engine.emit(FlowEvent::started("f1"));
    let pod = runtime.pod().clone();
    assert!(eventually(|| pod.tracker().running_count() == 1).await);

    let unloaded = client
        .post(format!("{base}/unload-flows"))
        .json(&json!({ "podSecret": SECRET }))
        .send()
        .await
        .unwrap();
    assert!(unloaded.status().is_success());

    let health: Value = client
        .get(format!("{base}/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["userId"], Value::Null);
    assert_eq!(health["podName"], "pod-e2e");
    assert_eq!(pod.activity().flows_running, 0);

    runtime.shutdown().await.unwrap();
}
