// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pod runtime controller.
//!
//! A [`Pod`] owns everything tied to the tenant it currently hosts: the
//! assignment itself, the ephemeral store, the activity tracker, and the
//! Gateway bridge. All of it changes only through [`Pod::load_graph`],
//! [`Pod::unload_graph`], and engine lifecycle events.
//!
//! ```text
//!                 load_graph(success)
//!   UNASSIGNED ─────────────────────────► ASSIGNED(tenant)
//!       ▲  │                                │      │
//!       │  └─ unload_graph (no-op) ─┐       │      └─ load_graph(other, success)
//!       │                           │       │             → ASSIGNED(other)
//!       └───────────────────────────┴───────┘
//!                  unload_graph
//! ```
//!
//! Load and unload are serialized behind one lifecycle lock. Reads
//! (health, activity) never take it. A load changes nothing until the engine
//! accepts the deployment; the tenant, its running flows and its store are
//! then swapped under the assignment lock, which reads also hold, so no
//! reader sees a mix of two tenants.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};
use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::{error, info, warn};

use flowpod_egress::GuardedClient;

use crate::bridge::{BridgeConfig, GatewayBridge};
use crate::engine::{
    DeployContext, DeployIdentity, Deployment, FlowEngine, FlowEvent, FlowEventKind,
};
use crate::error::PodError;
use crate::store::{EphemeralState, EphemeralStore, Graph};
use crate::tracker::ActivityTracker;

/// Default per-call timeout for the Gateway bridge.
pub const DEFAULT_BRIDGE_TIMEOUT: Duration = Duration::from_secs(15);

/// Request to load a tenant's graph.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadRequest {
    /// Tenant taking the pod
    #[serde(default, alias = "tenantId")]
    pub user_id: Option<String>,
    /// Graph to deploy
    #[serde(default)]
    pub flows: Graph,
    /// Gateway the bridge calls back into
    #[serde(default)]
    pub gateway_url: Option<String>,
    /// Shared pod secret
    #[serde(default)]
    pub pod_secret: String,
    /// Tenant credentials
    #[serde(default)]
    pub credentials: Value,
    /// Tenant settings
    #[serde(default)]
    pub settings: Value,
}

/// Point-in-time health view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// Engine finished booting
    pub ready: bool,
    /// Current tenant, if any
    pub tenant: Option<String>,
    /// Seconds since the pod started
    pub uptime_secs: u64,
    /// Pod identity
    pub pod_name: String,
}

/// Point-in-time activity view for eviction decisions.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySnapshot {
    /// Epoch milliseconds of the last interaction
    pub last_activity: i64,
    /// Current tenant, if any
    pub tenant: Option<String>,
    /// Flows currently executing
    pub flows_running: usize,
    /// Milliseconds since the last interaction
    pub idle_ms: i64,
    /// Resident memory of this process in MiB
    pub memory_mb: u64,
}

#[derive(Default)]
struct Assignment {
    tenant: Option<String>,
    bridge: Option<Arc<GatewayBridge>>,
}

/// One pod: at most one tenant at a time.
pub struct Pod {
    name: String,
    secret: String,
    started: Instant,
    engine: Arc<dyn FlowEngine>,
    outbound: GuardedClient,
    bridge_timeout: Duration,
    ready: AtomicBool,
    tracker: ActivityTracker,
    store: EphemeralStore,
    assignment: RwLock<Assignment>,
    lifecycle: tokio::sync::Mutex<()>,
    system: Mutex<System>,
}

impl Pod {
    /// Create an unassigned, not-yet-ready pod.
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        engine: Arc<dyn FlowEngine>,
        outbound: GuardedClient,
    ) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            started: Instant::now(),
            engine,
            outbound,
            bridge_timeout: DEFAULT_BRIDGE_TIMEOUT,
            ready: AtomicBool::new(false),
            tracker: ActivityTracker::new(),
            store: EphemeralStore::new(),
            assignment: RwLock::new(Assignment::default()),
            lifecycle: tokio::sync::Mutex::new(()),
            system: Mutex::new(System::new()),
        }
    }

    /// Set the Gateway bridge timeout.
    pub fn with_bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Pod identity.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The engine this pod drives.
    pub fn engine(&self) -> &Arc<dyn FlowEngine> {
        &self.engine
    }

    /// Guarded client for outbound calls made by flow nodes.
    pub fn outbound(&self) -> &GuardedClient {
        &self.outbound
    }

    /// Current tenant, if any.
    pub fn current_tenant(&self) -> Option<String> {
        self.assignment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .tenant
            .clone()
    }

    /// Bridge of the current tenant, if any.
    pub fn current_bridge(&self) -> Option<Arc<GatewayBridge>> {
        self.assignment
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .bridge
            .clone()
    }

    /// Copy of the loaded tenant state.
    pub fn state(&self) -> Option<EphemeralState> {
        self.store.snapshot()
    }

    /// Activity tracker.
    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Mark the engine as booted (or not).
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Whether the engine has booted.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Record editor or interaction traffic.
    pub fn touch_activity(&self) {
        self.tracker.touch();
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Assign the pod to a tenant and deploy its graph.
    ///
    /// Returns the deployed node count. On any error the pod is left exactly
    /// as it was: same tenant, same store, same running flows.
    pub async fn load_graph(&self, request: LoadRequest) -> Result<usize, PodError> {
        self.verify_secret(&request.pod_secret)?;

        let tenant_id = non_empty(request.user_id)
            .ok_or_else(|| PodError::BadRequest("userId is required".to_string()))?;
        let gateway_url = non_empty(request.gateway_url)
            .ok_or_else(|| PodError::BadRequest("gatewayUrl is required".to_string()))?;

        let _guard = self.lifecycle.lock().await;

        let bridge = GatewayBridge::connect(BridgeConfig {
            gateway_url,
            tenant_id: tenant_id.clone(),
            pod_secret: self.secret.clone(),
            timeout: self.bridge_timeout,
        })
        .map_err(|e| {
            error!(tenant_id = %tenant_id, error = %e, "Bridge initialization failed");
            PodError::BridgeInit(e)
        })?;
        let bridge = Arc::new(bridge);

        let node_count = self
            .engine
            .deploy(Deployment {
                identity: DeployIdentity::Tenant(tenant_id.clone()),
                graph: request.flows.clone(),
                credentials: request.credentials.clone(),
                settings: request.settings.clone(),
                context: DeployContext {
                    outbound: self.outbound.clone(),
                    bridge: Some(bridge.clone()),
                },
            })
            .await
            .map_err(|e| {
                error!(tenant_id = %tenant_id, error = %e, "Deploy failed");
                PodError::Deploy(e)
            })?;

        {
            let mut assignment = self.assignment.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = &assignment.tenant
                && *previous != tenant_id
            {
                info!(
                    previous_tenant = %previous,
                    tenant_id = %tenant_id,
                    "Tenant switch, clearing previous tenant state"
                );
                self.tracker.clear_running();
            }
            self.store.replace(EphemeralState::new(
                request.flows,
                request.credentials,
                request.settings,
            ));
            assignment.tenant = Some(tenant_id.clone());
            assignment.bridge = Some(bridge);
        }
        self.tracker.touch();

        info!(tenant_id = %tenant_id, node_count, "Graph loaded");
        Ok(node_count)
    }

    /// Release the pod. Idempotent.
    ///
    /// The engine is cleared with an empty system deployment; if that deploy
    /// fails the pod is still released and the failure is logged.
    pub async fn unload_graph(&self, pod_secret: &str) -> Result<(), PodError> {
        self.verify_secret(pod_secret)?;

        let _guard = self.lifecycle.lock().await;

        let previous = {
            let mut assignment = self.assignment.write().unwrap_or_else(PoisonError::into_inner);
            self.tracker.clear_running();
            self.store.clear();
            assignment.bridge = None;
            assignment.tenant.take()
        };

        let cleared = self
            .engine
            .deploy(Deployment {
                identity: DeployIdentity::System,
                graph: Graph::empty(),
                credentials: Value::Null,
                settings: Value::Null,
                context: DeployContext {
                    outbound: self.outbound.clone(),
                    bridge: None,
                },
            })
            .await;

        if let Err(e) = cleared {
            error!(error = %e, "Failed to clear engine after unload");
        }

        info!(previous_tenant = ?previous, "Graph unloaded");
        Ok(())
    }

    /// Apply an engine lifecycle event to the running-flow set.
    pub fn handle_flow_event(&self, event: &FlowEvent) {
        match event.kind {
            FlowEventKind::Started => {
                self.tracker.flow_started(event.flow_id.clone());
            }
            FlowEventKind::Stopped => {
                if !self.tracker.flow_stopped(event.flow_id.as_deref()) {
                    warn!(flow_id = ?event.flow_id, "Stop event for a flow that was not running");
                }
            }
        }
    }

    // ========================================================================
    // Read-only views
    // ========================================================================

    /// Health view.
    pub fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            ready: self.is_ready(),
            tenant: self.current_tenant(),
            uptime_secs: self.started.elapsed().as_secs(),
            pod_name: self.name.clone(),
        }
    }

    /// Activity view. Does not count as activity.
    ///
    /// Tenant and running count are read under the assignment lock, so they
    /// always belong to the same tenant.
    pub fn activity(&self) -> ActivitySnapshot {
        let memory_mb = self.memory_mb();
        let assignment = self.assignment.read().unwrap_or_else(PoisonError::into_inner);
        ActivitySnapshot {
            last_activity: self.tracker.last_activity(),
            tenant: assignment.tenant.clone(),
            flows_running: self.tracker.running_count(),
            idle_ms: self.tracker.idle_ms(),
            memory_mb,
        }
    }

    fn memory_mb(&self) -> u64 {
        let Ok(pid) = sysinfo::get_current_pid() else {
            return 0;
        };
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::new().with_memory(),
        );
        system
            .process(pid)
            .map_or(0, |process| process.memory() / (1024 * 1024))
    }

    /// Check a presented pod secret.
    ///
    /// Management calls carry it in the body; engine callbacks carry it as a
    /// bearer token.
    pub fn verify_secret(&self, presented: &str) -> Result<(), PodError> {
        if secrets_match(presented.as_bytes(), self.secret.as_bytes()) {
            Ok(())
        } else {
            warn!("Rejected call with invalid pod secret");
            Err(PodError::AuthFailed)
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}

/// Exact match without an early exit on the first differing byte.
fn secrets_match(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match(b"s3cret", b"s3cret"));
        assert!(!secrets_match(b"s3cret", b"s3creT"));
        assert!(!secrets_match(b"s3cret", b"s3cret!"));
        assert!(!secrets_match(b"", b"s3cret"));
    }

    #[test]
    fn test_non_empty() {
        assert_eq!(non_empty(Some("u1".to_string())).as_deref(), Some("u1"));
        assert!(non_empty(Some("  ".to_string())).is_none());
        assert!(non_empty(None).is_none());
    }

    #[test]
    fn test_load_request_accepts_tenant_alias() {
        let request: LoadRequest = serde_json::from_value(serde_json::json!({
            "tenantId": "t1",
            "flows": [{"id": "n1"}],
            "gatewayUrl": "http://gateway:8080",
            "podSecret": "x",
        }))
        .unwrap();
        assert_eq!(request.user_id.as_deref(), Some("t1"));
        assert_eq!(request.flows.node_count(), 1);
        assert_eq!(request.credentials, Value::Null);
    }
}
