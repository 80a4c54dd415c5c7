// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Engine adapter for an out-of-process engine with an admin HTTP API.
//!
//! Deployments go to `POST {admin}/flows` as full replacements. Readiness is
//! `GET {admin}/settings` answering 2xx. Lifecycle events come back through
//! the pod's `/flow-events` route, authenticated with the pod secret as a
//! bearer token, so [`FlowEngine::subscribe`] is not used.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, warn};

use super::traits::*;

/// Header telling the engine to replace, not merge.
pub const DEPLOYMENT_TYPE_HEADER: &str = "X-Deployment-Type";

/// Header carrying the deploy identity.
pub const DEPLOY_IDENTITY_HEADER: &str = "X-Deploy-Identity";

/// Engine reached through its admin API.
pub struct HttpEngine {
    admin_url: String,
    client: reqwest::Client,
}

impl HttpEngine {
    /// Create an adapter for the admin API at `admin_url`.
    pub fn new(admin_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            admin_url: admin_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Base URL of the admin API.
    pub fn admin_url(&self) -> &str {
        &self.admin_url
    }
}

#[async_trait]
impl FlowEngine for HttpEngine {
    fn engine_type(&self) -> &'static str {
        "http"
    }

    async fn is_ready(&self) -> bool {
        match self
            .client
            .get(format!("{}/settings", self.admin_url))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Engine admin API not reachable yet");
                false
            }
        }
    }

    async fn deploy(&self, deployment: Deployment) -> Result<usize> {
        let node_count = deployment.graph.node_count();
        let body = json!({
            "flows": deployment.graph,
            "credentials": deployment.credentials,
            "settings": deployment.settings,
        });

        let response = self
            .client
            .post(format!("{}/flows", self.admin_url))
            .header(DEPLOYMENT_TYPE_HEADER, "full")
            .header(DEPLOY_IDENTITY_HEADER, deployment.identity.to_string())
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %text, "Engine rejected deployment");
            return Err(EngineError::Rejected(format!("{status}: {text}")));
        }

        debug!(identity = %deployment.identity, node_count, "Deployment accepted");
        Ok(node_count)
    }
}
