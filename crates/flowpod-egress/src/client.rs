// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Guarded HTTP client for outbound calls made by flow nodes.
//!
//! The client closes the gap between check and connect: its DNS resolver
//! re-runs the guard and hands reqwest exactly the addresses that passed,
//! so no second, unchecked lookup happens inside the HTTP stack. Redirect
//! hops are validated as well.

use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::error::{EgressError, SSRF_BLOCKED};
use crate::guard::EgressGuard;

/// Errors surfaced to the calling flow node.
#[derive(Debug, Error)]
pub enum OutboundError {
    /// The egress guard refused the target.
    #[error("request blocked: {0}")]
    Blocked(EgressError),

    /// The request itself is malformed.
    #[error("invalid outbound request: {0}")]
    InvalidRequest(String),

    /// Connection, TLS, timeout or body errors.
    #[error("network error: {0}")]
    Transport(String),
}

impl OutboundError {
    /// Stable error code, distinct for policy blocks and network faults.
    pub fn code(&self) -> &'static str {
        match self {
            OutboundError::Blocked(_) => SSRF_BLOCKED,
            OutboundError::InvalidRequest(_) => "INVALID_REQUEST",
            OutboundError::Transport(_) => "NETWORK_ERROR",
        }
    }

    /// Whether the call was refused by the guard.
    pub fn is_blocked(&self) -> bool {
        matches!(self, OutboundError::Blocked(_))
    }
}

impl From<EgressError> for OutboundError {
    fn from(err: EgressError) -> Self {
        if err.is_blocked() {
            OutboundError::Blocked(err)
        } else {
            OutboundError::InvalidRequest(err.to_string())
        }
    }
}

/// An outbound HTTP call requested by a flow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundRequest {
    /// HTTP method (default `GET`).
    #[serde(default = "default_method")]
    pub method: String,
    /// Absolute http(s) URL.
    pub url: String,
    /// Request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Optional text body.
    #[serde(default)]
    pub body: Option<String>,
    /// Per-call timeout override in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl OutboundRequest {
    /// A GET request to `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: default_method(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            timeout_ms: None,
        }
    }
}

/// Response handed back to the flow node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers (non-UTF-8 values dropped).
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    pub body: String,
}

/// Client configuration.
#[derive(Debug, Clone)]
pub struct GuardedClientConfig {
    /// Total request timeout.
    pub request_timeout: Duration,
    /// TCP/TLS connect timeout.
    pub connect_timeout: Duration,
    /// Maximum redirect hops followed.
    pub max_redirects: usize,
}

impl Default for GuardedClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            max_redirects: 5,
        }
    }
}

/// DNS resolver that only ever returns guard-approved addresses.
struct PinnedResolver {
    guard: EgressGuard,
}

impl Resolve for PinnedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let guard = self.guard.clone();
        let host = name.as_str().to_string();
        Box::pin(async move {
            let ips = guard
                .resolve_host(&host)
                .await
                .map_err(|e| -> Box<dyn StdError + Send + Sync> { Box::new(e) })?;
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

/// HTTP client whose every connection has passed the egress guard.
#[derive(Clone)]
pub struct GuardedClient {
    guard: EgressGuard,
    http: reqwest::Client,
}

impl std::fmt::Debug for GuardedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedClient")
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl GuardedClient {
    /// Build a client around `guard`.
    pub fn new(guard: EgressGuard, config: GuardedClientConfig) -> Result<Self, OutboundError> {
        let redirect_guard = guard.clone();
        let max_redirects = config.max_redirects;
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= max_redirects {
                return attempt.error(format!("more than {max_redirects} redirects"));
            }
            match redirect_guard.check_static(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(err) => attempt.error(err),
            }
        });

        let http = reqwest::Client::builder()
            .redirect(redirect_policy)
            .dns_resolver(Arc::new(PinnedResolver {
                guard: guard.clone(),
            }))
            // A proxy would resolve the target itself, outside the pinned resolver.
            .no_proxy()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            // Pooled connections would skip re-validation of the host.
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| OutboundError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { guard, http })
    }

    /// The guard backing this client.
    pub fn guard(&self) -> &EgressGuard {
        &self.guard
    }

    /// Check the target, then perform the call.
    pub async fn send(&self, request: OutboundRequest) -> Result<OutboundResponse, OutboundError> {
        let url = Url::parse(&request.url)
            .map_err(|e| OutboundError::InvalidRequest(format!("{}: {e}", request.url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(OutboundError::InvalidRequest(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        self.guard.check_url(&url).await?;

        let method = reqwest::Method::from_bytes(request.method.to_uppercase().as_bytes())
            .map_err(|_| OutboundError::InvalidRequest(format!("bad method: {}", request.method)))?;

        let mut builder = self.http.request(method, url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }
        if let Some(timeout_ms) = request.timeout_ms {
            builder = builder.timeout(Duration::from_millis(timeout_ms));
        }

        let response = builder.send().await.map_err(classify_error)?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.to_string(), v.to_string()))
            })
            .collect();
        let body = response.text().await.map_err(classify_error)?;

        debug!(status, "Outbound request completed");

        Ok(OutboundResponse {
            status,
            headers,
            body,
        })
    }
}

/// Pull a guard refusal out of a reqwest error chain, if there is one.
fn classify_error(err: reqwest::Error) -> OutboundError {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(inner) = source {
        if let Some(egress) = inner.downcast_ref::<EgressError>() {
            return OutboundError::Blocked(egress.clone());
        }
        source = inner.source();
    }
    OutboundError::Transport(err.to_string())
}
