// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! flowpod Runtime - Pod Runtime Controller
//!
//! An HTTP server responsible for:
//! - Tenant assignment (load / unload a tenant's flow graph)
//! - Health and activity reporting for the Pool Manager
//! - Running-flow tracking from engine lifecycle events
//! - Guarded outbound calls on behalf of flow nodes

use std::sync::Arc;
use tracing::{info, warn};

use flowpod_egress::{EgressConfig, GuardedClientConfig};
use flowpod_runtime::config::{Config, EngineKind};
use flowpod_runtime::engine::{FlowEngine, HttpEngine, MockEngine};
use flowpod_runtime::runtime::PodRuntime;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowpod_runtime=info,flowpod_egress=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    // Load configuration
    let config = Config::from_env()?;

    info!(
        pod_name = %config.pod_name,
        http_addr = %config.http_addr,
        engine = ?config.engine,
        "Starting flowpod runtime"
    );

    let engine: Arc<dyn FlowEngine> = match config.engine {
        EngineKind::Http => Arc::new(HttpEngine::new(
            &config.engine_admin_url,
            config.bridge_timeout,
        )?),
        EngineKind::Mock => Arc::new(MockEngine::new()),
    };
    info!(engine_type = engine.engine_type(), "Engine adapter initialized");

    let mut builder = PodRuntime::builder()
        .pod_name(&config.pod_name)
        .pod_secret(&config.pod_secret)
        .engine(engine)
        .bind_addr(config.http_addr)
        .egress_config(
            EgressConfig::default()
                .with_dns_timeout(config.egress_dns_timeout)
                .with_allowed_addresses(config.egress_allowed_addresses.iter().copied()),
        )
        .outbound_config(GuardedClientConfig {
            request_timeout: config.egress_request_timeout,
            ..GuardedClientConfig::default()
        })
        .bridge_timeout(config.bridge_timeout)
        .ready_poll_interval(config.ready_poll_interval);
    if let Some(url) = &config.engine_editor_url {
        builder = builder.editor_url(url);
    }

    let runtime = builder.build()?.start().await?;

    info!(addr = %runtime.local_addr(), "Pod ready for assignment");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    // Graceful shutdown
    runtime.shutdown().await?;

    info!("flowpod runtime shut down");

    Ok(())
}
