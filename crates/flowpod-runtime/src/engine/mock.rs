// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Mock engine for testing.
//!
//! Keeps deployments in memory and lets callers push lifecycle events by
//! hand, so pod behavior can be exercised without a real engine process.

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast};

use super::traits::*;

/// A deployment as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedDeployment {
    /// Identity the graph was deployed under
    pub identity: DeployIdentity,
    /// Node count of the graph
    pub node_count: usize,
    /// Tenant credentials
    pub credentials: serde_json::Value,
    /// Whether a bridge was attached
    pub had_bridge: bool,
}

/// Mock engine for testing.
pub struct MockEngine {
    deployments: Arc<Mutex<Vec<RecordedDeployment>>>,
    events: broadcast::Sender<FlowEvent>,
    ready: AtomicBool,
    /// If true, every deploy is rejected
    pub fail_deploys: AtomicBool,
    deploy_delay: Option<Duration>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a ready mock engine.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            deployments: Arc::new(Mutex::new(Vec::new())),
            events,
            ready: AtomicBool::new(true),
            fail_deploys: AtomicBool::new(false),
            deploy_delay: None,
        }
    }

    /// Create a mock engine that rejects every deploy.
    pub fn failing() -> Self {
        let engine = Self::new();
        engine.fail_deploys.store(true, Ordering::SeqCst);
        engine
    }

    /// Create a mock engine that reports itself as still booting.
    pub fn booting() -> Self {
        let engine = Self::new();
        engine.ready.store(false, Ordering::SeqCst);
        engine
    }

    /// Make every deploy take `delay` before it succeeds or fails.
    pub fn with_deploy_delay(mut self, delay: Duration) -> Self {
        self.deploy_delay = Some(delay);
        self
    }

    /// Flip readiness.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Toggle deploy failures.
    pub fn set_failing(&self, failing: bool) {
        self.fail_deploys.store(failing, Ordering::SeqCst);
    }

    /// Push a lifecycle event to subscribers.
    pub fn emit(&self, event: FlowEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// All deployments seen so far, oldest first.
    pub async fn deployments(&self) -> Vec<RecordedDeployment> {
        self.deployments.lock().await.clone()
    }

    /// The most recent deployment.
    pub async fn last_deployment(&self) -> Option<RecordedDeployment> {
        self.deployments.lock().await.last().cloned()
    }
}

#[async_trait]
impl FlowEngine for MockEngine {
    fn engine_type(&self) -> &'static str {
        "mock"
    }

    async fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn deploy(&self, deployment: Deployment) -> Result<usize> {
        if let Some(delay) = self.deploy_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_deploys.load(Ordering::SeqCst) {
            return Err(EngineError::Rejected("Mock failure".to_string()));
        }

        let node_count = deployment.graph.node_count();
        self.deployments.lock().await.push(RecordedDeployment {
            identity: deployment.identity,
            node_count,
            credentials: deployment.credentials,
            had_bridge: deployment.context.bridge.is_some(),
        });
        Ok(node_count)
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<FlowEvent>> {
        Some(self.events.subscribe())
    }
}
