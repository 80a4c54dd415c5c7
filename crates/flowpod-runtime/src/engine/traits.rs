// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine trait definitions.
//!
//! Defines the capability set the pod needs from an embedded flow engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use flowpod_egress::GuardedClient;

use crate::bridge::GatewayBridge;
use crate::store::Graph;

/// Errors from engine operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The engine has not finished booting.
    #[error("Engine not ready")]
    NotReady,

    /// The engine refused the graph.
    #[error("Graph rejected: {0}")]
    Rejected(String),

    /// The engine could not be reached.
    #[error("Engine unreachable: {0}")]
    Unreachable(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("Other: {0}")]
    Other(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Identity a deployment runs under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeployIdentity {
    /// A tenant's graph.
    Tenant(String),
    /// The pod itself (used to clear the engine on release).
    System,
}

impl fmt::Display for DeployIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployIdentity::Tenant(id) => write!(f, "tenant:{id}"),
            DeployIdentity::System => f.write_str("system"),
        }
    }
}

/// Per-deployment capabilities handed to the engine.
#[derive(Clone)]
pub struct DeployContext {
    /// Client every outbound call from graph logic must go through
    pub outbound: GuardedClient,
    /// Callback channel into the Gateway, absent for system deployments
    pub bridge: Option<Arc<GatewayBridge>>,
}

impl fmt::Debug for DeployContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeployContext")
            .field("bridge", &self.bridge.as_ref().map(|b| b.tenant_id().to_string()))
            .finish_non_exhaustive()
    }
}

/// A full replacement deployment.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Who the graph runs as
    pub identity: DeployIdentity,
    /// The graph to deploy, replacing whatever runs now
    pub graph: Graph,
    /// Tenant credentials
    pub credentials: Value,
    /// Tenant settings
    pub settings: Value,
    /// Outbound capabilities
    pub context: DeployContext,
}

/// Flow lifecycle event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowEventKind {
    /// A flow instance began executing.
    Started,
    /// A flow instance finished.
    Stopped,
}

/// A lifecycle event from the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowEvent {
    /// What happened
    #[serde(rename = "event")]
    pub kind: FlowEventKind,
    /// Flow instance id, when the engine provides one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flow_id: Option<String>,
}

impl FlowEvent {
    /// A "started" event.
    pub fn started(flow_id: impl Into<String>) -> Self {
        Self {
            kind: FlowEventKind::Started,
            flow_id: Some(flow_id.into()),
        }
    }

    /// A "stopped" event.
    pub fn stopped(flow_id: impl Into<String>) -> Self {
        Self {
            kind: FlowEventKind::Stopped,
            flow_id: Some(flow_id.into()),
        }
    }
}

/// Trait for flow engines.
///
/// The pod only ever asks an engine for full replacement deployments. Running
/// flow state is reported back through [`FlowEvent`]s, either via
/// [`subscribe`](FlowEngine::subscribe) for in-process engines or via the
/// `/flow-events` route for engines living in another process.
#[async_trait]
pub trait FlowEngine: Send + Sync {
    /// Engine type identifier (e.g., "http", "mock")
    fn engine_type(&self) -> &'static str;

    /// Whether the engine has finished booting.
    async fn is_ready(&self) -> bool;

    /// Replace whatever is deployed with `deployment`.
    ///
    /// Returns the number of deployed nodes.
    async fn deploy(&self, deployment: Deployment) -> Result<usize>;

    /// Lifecycle event stream, for engines that can push events in-process.
    fn subscribe(&self) -> Option<broadcast::Receiver<FlowEvent>> {
        None
    }
}
