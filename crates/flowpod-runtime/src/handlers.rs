// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pod management handlers.
//!
//! Transport-independent request handling: each `handle_*` function takes the
//! pod and a decoded request, and returns the wire response or an
//! [`ApiError`]. The axum layer in [`crate::server`] only does routing and
//! encoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use flowpod_egress::{OutboundError, OutboundRequest, OutboundResponse};

use crate::bridge::BridgeError;
use crate::engine::FlowEvent;
use crate::error::PodError;
use crate::pod::{LoadRequest, Pod};

/// Structured error returned at the endpoint boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// Stable error code
    pub code: &'static str,
    /// Human-readable message
    pub message: String,
}

impl ApiError {
    /// Build an error.
    pub fn new(status: u16, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Wire body for this error.
    pub fn body(&self) -> ErrorResponse {
        ErrorResponse {
            ok: false,
            error: self.message.clone(),
            code: self.code,
        }
    }
}

impl From<PodError> for ApiError {
    fn from(err: PodError) -> Self {
        let status = match &err {
            PodError::AuthFailed => 403,
            PodError::BadRequest(_) => 400,
            PodError::Unassigned => 409,
            _ => 500,
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<OutboundError> for ApiError {
    fn from(err: OutboundError) -> Self {
        let status = match &err {
            OutboundError::Blocked(_) => 403,
            OutboundError::InvalidRequest(_) => 400,
            _ => 502,
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        ApiError::new(502, "GATEWAY_ERROR", err.to_string())
    }
}

/// Error body: `{ok: false, error, code}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub ok: bool,
    /// Message
    pub error: String,
    /// Stable error code
    pub code: &'static str,
}

/// Plain success body: `{ok: true}`.
#[derive(Debug, Clone, Serialize)]
pub struct OkResponse {
    /// Always true
    pub ok: bool,
}

impl OkResponse {
    fn new() -> Self {
        Self { ok: true }
    }
}

// ============================================================================
// Health Check
// ============================================================================

/// Health response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// Process is alive
    pub ok: bool,
    /// Engine finished booting
    pub nr_ready: bool,
    /// Current tenant
    pub user_id: Option<String>,
    /// Uptime in seconds
    pub uptime: u64,
    /// Pod identity
    pub pod_name: String,
}

/// Handle health check request.
pub fn handle_health(pod: &Pod) -> HealthResponse {
    let health = pod.health();
    HealthResponse {
        ok: true,
        nr_ready: health.ready,
        user_id: health.tenant,
        uptime: health.uptime_secs,
        pod_name: health.pod_name,
    }
}

// ============================================================================
// Activity
// ============================================================================

/// Activity response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    /// Epoch milliseconds of the last interaction
    pub last_activity: i64,
    /// Current tenant
    pub user_id: Option<String>,
    /// Flows currently executing
    pub flows_running: usize,
    /// Milliseconds since the last interaction
    pub idle_ms: i64,
    /// Resident memory in MiB
    pub memory_mb: u64,
}

/// Handle activity query.
pub fn handle_activity(pod: &Pod) -> ActivityResponse {
    let activity = pod.activity();
    ActivityResponse {
        last_activity: activity.last_activity,
        user_id: activity.tenant,
        flows_running: activity.flows_running,
        idle_ms: activity.idle_ms,
        memory_mb: activity.memory_mb,
    }
}

// ============================================================================
// Load / Unload
// ============================================================================

/// Load response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadFlowsResponse {
    /// Always true
    pub ok: bool,
    /// Deployed node count
    pub node_count: usize,
}

/// Handle graph load.
pub async fn handle_load_flows(
    pod: &Pod,
    request: LoadRequest,
) -> Result<LoadFlowsResponse, ApiError> {
    let node_count = pod.load_graph(request).await?;
    Ok(LoadFlowsResponse {
        ok: true,
        node_count,
    })
}

/// Unload request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnloadFlowsRequest {
    /// Shared pod secret
    #[serde(default)]
    pub pod_secret: String,
}

/// Handle graph unload.
pub async fn handle_unload_flows(
    pod: &Pod,
    request: UnloadFlowsRequest,
) -> Result<OkResponse, ApiError> {
    pod.unload_graph(&request.pod_secret).await?;
    Ok(OkResponse::new())
}

// ============================================================================
// Engine callbacks
// ============================================================================

/// Handle a lifecycle event pushed by an out-of-process engine.
pub fn handle_flow_event(pod: &Pod, event: FlowEvent) -> OkResponse {
    pod.handle_flow_event(&event);
    OkResponse::new()
}

/// Handle an outbound call made by a flow node.
pub async fn handle_egress_request(
    pod: &Pod,
    request: OutboundRequest,
) -> Result<OutboundResponse, ApiError> {
    debug!(method = %request.method, "Outbound request from flow node");
    Ok(pod.outbound().send(request).await?)
}

/// Tool invocation request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolInvokeRequest {
    /// Tool name
    pub tool: String,
    /// Tool arguments
    #[serde(default)]
    pub arguments: Value,
}

/// Handle a tool invocation through the current tenant's bridge.
pub async fn handle_tool_invoke(pod: &Pod, request: ToolInvokeRequest) -> Result<Value, ApiError> {
    let bridge = pod.current_bridge().ok_or(PodError::Unassigned)?;
    Ok(bridge.invoke_tool(&request.tool, request.arguments).await?)
}
