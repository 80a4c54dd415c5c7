// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authenticated channel back into the Gateway.
//!
//! A bridge is bound to one `(gateway URL, tenant, pod secret)` triple and
//! lives exactly as long as that tenant's assignment. Running flows use it
//! to invoke Gateway tools on the tenant's behalf.
//!
//! The Gateway is operator-configured infrastructure, frequently on a
//! cluster-internal address, so bridge traffic does not pass the egress
//! guard.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Header naming the tenant on every bridge call.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Errors from the Gateway bridge.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BridgeError {
    /// The gateway URL is unusable.
    #[error("invalid gateway URL {url}: {message}")]
    InvalidUrl {
        /// URL as given
        url: String,
        /// Why it was refused
        message: String,
    },

    /// Credentials could not be turned into headers.
    #[error("invalid bridge credentials: {0}")]
    InvalidCredentials(String),

    /// The Gateway could not be reached.
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The Gateway answered with an error status.
    #[error("gateway returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

/// Parameters for [`GatewayBridge::connect`].
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Gateway base URL
    pub gateway_url: String,
    /// Tenant the bridge acts for
    pub tenant_id: String,
    /// Pod secret presented as a bearer token
    pub pod_secret: String,
    /// Per-call timeout
    pub timeout: Duration,
}

/// Gateway client bound to a single tenant.
#[derive(Debug, Clone)]
pub struct GatewayBridge {
    base: Url,
    tenant_id: String,
    client: reqwest::Client,
}

impl GatewayBridge {
    /// Validate the configuration and build the bridge.
    pub fn connect(config: BridgeConfig) -> Result<Self, BridgeError> {
        let base = Url::parse(&config.gateway_url).map_err(|e| BridgeError::InvalidUrl {
            url: config.gateway_url.clone(),
            message: e.to_string(),
        })?;
        if !matches!(base.scheme(), "http" | "https") || base.host_str().is_none() {
            return Err(BridgeError::InvalidUrl {
                url: config.gateway_url,
                message: "expected an http(s) URL with a host".to_string(),
            });
        }

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.pod_secret))
            .map_err(|e| BridgeError::InvalidCredentials(e.to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        let tenant = HeaderValue::from_str(&config.tenant_id)
            .map_err(|e| BridgeError::InvalidCredentials(e.to_string()))?;
        headers.insert(TENANT_HEADER, tenant);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        debug!(tenant_id = %config.tenant_id, gateway = %base, "Gateway bridge initialized");

        Ok(Self {
            base,
            tenant_id: config.tenant_id,
            client,
        })
    }

    /// Tenant this bridge acts for.
    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    /// Gateway base URL.
    pub fn gateway_url(&self) -> &Url {
        &self.base
    }

    /// Invoke a Gateway tool and return its JSON result.
    pub async fn invoke_tool(&self, tool: &str, arguments: Value) -> Result<Value, BridgeError> {
        let url = format!(
            "{}/internal/tools/invoke",
            self.base.as_str().trim_end_matches('/')
        );

        let response = self
            .client
            .post(url)
            .json(&json!({
                "tenantId": self.tenant_id,
                "tool": tool,
                "arguments": arguments,
            }))
            .send()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(
                tenant_id = %self.tenant_id,
                tool,
                status = status.as_u16(),
                "Gateway tool call failed"
            );
            return Err(BridgeError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BridgeError::Transport(e.to_string()))
    }
}
