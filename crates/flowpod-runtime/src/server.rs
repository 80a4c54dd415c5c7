// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface of the pod.
//!
//! | Route | Caller | Auth | Counts as activity |
//! |-------|--------|------|--------------------|
//! | `GET /health` | Pool Manager | none | no |
//! | `GET /activity` | Pool Manager | none | no |
//! | `POST /load-flows` | Pool Manager | `podSecret` in body | no |
//! | `POST /unload-flows` | Pool Manager | `podSecret` in body | no |
//! | `POST /flow-events` | engine | bearer pod secret | no |
//! | `POST /egress/request` | engine | bearer pod secret | no |
//! | `POST /tools/invoke` | engine | bearer pod secret | no |
//! | anything else | editor | none | yes |
//!
//! Engine callbacks share the listener with editor traffic, so they require
//! `Authorization: Bearer <pod secret>` and answer 403 `AUTH_FAILED`
//! otherwise.

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use flowpod_egress::OutboundRequest;

use crate::engine::FlowEvent;
use crate::handlers::{self, ApiError, ToolInvokeRequest, UnloadFlowsRequest};
use crate::pod::{LoadRequest, Pod};

/// Largest editor request body forwarded upstream.
const MAX_PROXY_BODY: usize = 16 * 1024 * 1024;

/// Shared state for the router.
#[derive(Clone)]
pub struct ServerState {
    /// The pod served by this router
    pub pod: Arc<Pod>,
    /// Editor upstream, if the engine serves one
    pub editor: Option<EditorProxy>,
}

impl ServerState {
    /// State without an editor upstream.
    pub fn new(pod: Arc<Pod>) -> Self {
        Self { pod, editor: None }
    }

    /// Forward unmatched traffic to `editor`.
    pub fn with_editor(mut self, editor: EditorProxy) -> Self {
        self.editor = Some(editor);
        self
    }
}

/// Forwards editor traffic to the engine's own HTTP server.
#[derive(Debug, Clone)]
pub struct EditorProxy {
    upstream: String,
    client: reqwest::Client,
}

impl EditorProxy {
    /// Proxy to `upstream` (scheme, host, port, optional base path).
    pub fn new(upstream: impl Into<String>) -> Self {
        Self {
            upstream: upstream.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn forward(&self, request: Request) -> Result<Response, ApiError> {
        let (parts, body) = request.into_parts();
        let path = parts
            .uri
            .path_and_query()
            .map_or("/", |pq| pq.as_str());
        let url = format!("{}{}", self.upstream, path);

        let body = axum::body::to_bytes(body, MAX_PROXY_BODY)
            .await
            .map_err(|e| ApiError::new(413, "BAD_REQUEST", e.to_string()))?;

        let mut headers = parts.headers;
        strip_hop_headers(&mut headers);
        headers.remove(header::HOST);

        let upstream = self
            .client
            .request(parts.method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(|e| ApiError::new(502, "EDITOR_UNAVAILABLE", e.to_string()))?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_headers(&mut headers);
        headers.remove(header::CONTENT_LENGTH);
        let bytes: Bytes = upstream
            .bytes()
            .await
            .map_err(|e| ApiError::new(502, "EDITOR_UNAVAILABLE", e.to_string()))?;

        Ok((status, headers, Body::from(bytes)).into_response())
    }
}

fn strip_hop_headers(headers: &mut HeaderMap) {
    for name in [
        header::CONNECTION,
        header::TRANSFER_ENCODING,
        header::UPGRADE,
        header::TE,
        header::TRAILER,
        header::PROXY_AUTHORIZATION,
    ] {
        headers.remove(name);
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.body())).into_response()
    }
}

/// Build the pod router.
pub fn router(state: ServerState) -> Router {
    let engine_callbacks = Router::new()
        .route("/flow-events", post(flow_event))
        .route("/egress/request", post(egress_request))
        .route("/tools/invoke", post(tool_invoke))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_pod_secret));

    Router::new()
        .route("/health", get(health))
        .route("/activity", get(activity))
        .route("/load-flows", post(load_flows))
        .route("/unload-flows", post(unload_flows))
        .merge(engine_callbacks)
        .fallback(editor)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown_rx` flips to true.
pub async fn run_server_with_shutdown(
    listener: TcpListener,
    state: ServerState,
    mut shutdown_rx: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, "Pod HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    info!("Pod HTTP server stopped");
    Ok(())
}

/// Reject engine callbacks that do not present the pod secret.
async fn require_pod_secret(
    State(state): State<ServerState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default();

    match state.pod.verify_secret(presented) {
        Ok(()) => next.run(request).await,
        Err(e) => ApiError::from(e).into_response(),
    }
}

fn decode<T: DeserializeOwned>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::new(400, "BAD_REQUEST", rejection.body_text()))
}

async fn health(State(state): State<ServerState>) -> impl IntoResponse {
    Json(handlers::handle_health(&state.pod))
}

async fn activity(State(state): State<ServerState>) -> impl IntoResponse {
    Json(handlers::handle_activity(&state.pod))
}

async fn load_flows(
    State(state): State<ServerState>,
    payload: Result<Json<LoadRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = decode(payload)?;
    let response = handlers::handle_load_flows(&state.pod, request).await?;
    Ok(Json(response))
}

async fn unload_flows(
    State(state): State<ServerState>,
    payload: Result<Json<UnloadFlowsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = decode(payload)?;
    let response = handlers::handle_unload_flows(&state.pod, request).await?;
    Ok(Json(response))
}

async fn flow_event(
    State(state): State<ServerState>,
    payload: Result<Json<FlowEvent>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let event = decode(payload)?;
    Ok(Json(handlers::handle_flow_event(&state.pod, event)))
}

async fn egress_request(
    State(state): State<ServerState>,
    payload: Result<Json<OutboundRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = decode(payload)?;
    let response = handlers::handle_egress_request(&state.pod, request).await?;
    Ok(Json(response))
}

async fn tool_invoke(
    State(state): State<ServerState>,
    payload: Result<Json<ToolInvokeRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let request = decode(payload)?;
    let result = handlers::handle_tool_invoke(&state.pod, request).await?;
    Ok(Json(result))
}

async fn editor(State(state): State<ServerState>, request: Request) -> Response {
    state.pod.touch_activity();

    let Some(proxy) = &state.editor else {
        return ApiError::new(404, "NOT_FOUND", format!("no route for {}", request.uri().path()))
            .into_response();
    };

    match proxy.forward(request).await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e.message, "Editor proxy failed");
            e.into_response()
        }
    }
}
