// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for flowpod-runtime.
//!
//! [`PodRuntime`] runs a pod inside an existing tokio application: the HTTP
//! server, the engine readiness watcher, and the engine event listener.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use flowpod_runtime::engine::MockEngine;
//! use flowpod_runtime::runtime::PodRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = PodRuntime::builder()
//!         .pod_name("pod-0")
//!         .pod_secret("s3cret")
//!         .engine(Arc::new(MockEngine::new()))
//!         .bind_addr("127.0.0.1:1880".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     // ... Pool Manager talks to the pod ...
//!
//!     runtime.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use flowpod_egress::{
    EgressConfig, EgressGuard, GuardedClient, GuardedClientConfig, HostResolver, SystemResolver,
};

use crate::engine::{FlowEngine, FlowEvent};
use crate::pod::{DEFAULT_BRIDGE_TIMEOUT, Pod};
use crate::server::{EditorProxy, ServerState, run_server_with_shutdown};

/// Builder for creating a [`PodRuntime`].
pub struct PodRuntimeBuilder {
    pod_name: String,
    pod_secret: Option<String>,
    engine: Option<Arc<dyn FlowEngine>>,
    bind_addr: SocketAddr,
    egress_config: EgressConfig,
    outbound_config: GuardedClientConfig,
    resolver: Option<Arc<dyn HostResolver>>,
    bridge_timeout: Duration,
    ready_poll_interval: Duration,
    editor_url: Option<String>,
}

impl Default for PodRuntimeBuilder {
    fn default() -> Self {
        Self {
            pod_name: "flowpod-local".to_string(),
            pod_secret: None,
            engine: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 1880)),
            egress_config: EgressConfig::default(),
            outbound_config: GuardedClientConfig::default(),
            resolver: None,
            bridge_timeout: DEFAULT_BRIDGE_TIMEOUT,
            ready_poll_interval: Duration::from_millis(500),
            editor_url: None,
        }
    }
}

impl PodRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pod identity reported on `/health`.
    ///
    /// Default: `flowpod-local`
    pub fn pod_name(mut self, name: impl Into<String>) -> Self {
        self.pod_name = name.into();
        self
    }

    /// Set the shared management secret (required).
    pub fn pod_secret(mut self, secret: impl Into<String>) -> Self {
        self.pod_secret = Some(secret.into());
        self
    }

    /// Set the flow engine (required).
    pub fn engine(mut self, engine: Arc<dyn FlowEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Set the HTTP bind address. Port 0 picks a free port.
    ///
    /// Default: `0.0.0.0:1880`
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the egress guard configuration.
    pub fn egress_config(mut self, config: EgressConfig) -> Self {
        self.egress_config = config;
        self
    }

    /// Set the outbound client configuration.
    pub fn outbound_config(mut self, config: GuardedClientConfig) -> Self {
        self.outbound_config = config;
        self
    }

    /// Override the DNS backend used by the egress guard.
    ///
    /// Default: [`SystemResolver`]
    pub fn resolver(mut self, resolver: Arc<dyn HostResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the Gateway bridge timeout.
    ///
    /// Default: 15 seconds
    pub fn bridge_timeout(mut self, timeout: Duration) -> Self {
        self.bridge_timeout = timeout;
        self
    }

    /// Set how often engine readiness is polled.
    ///
    /// Default: 500 milliseconds
    pub fn ready_poll_interval(mut self, interval: Duration) -> Self {
        self.ready_poll_interval = interval;
        self
    }

    /// Proxy unmatched (editor) traffic to this upstream.
    pub fn editor_url(mut self, url: impl Into<String>) -> Self {
        self.editor_url = Some(url.into());
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<PodRuntimeConfig> {
        let pod_secret = self
            .pod_secret
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow::anyhow!("pod_secret is required"))?;
        let engine = self
            .engine
            .ok_or_else(|| anyhow::anyhow!("engine is required"))?;

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(SystemResolver));
        let guard = EgressGuard::with_resolver(resolver, self.egress_config);
        let outbound = GuardedClient::new(guard, self.outbound_config)?;

        let pod = Pod::new(self.pod_name, pod_secret, engine, outbound)
            .with_bridge_timeout(self.bridge_timeout);

        Ok(PodRuntimeConfig {
            pod: Arc::new(pod),
            bind_addr: self.bind_addr,
            ready_poll_interval: self.ready_poll_interval,
            editor_url: self.editor_url,
        })
    }
}

/// Configuration for a [`PodRuntime`].
pub struct PodRuntimeConfig {
    pod: Arc<Pod>,
    bind_addr: SocketAddr,
    ready_poll_interval: Duration,
    editor_url: Option<String>,
}

impl PodRuntimeConfig {
    /// The pod that will be served.
    pub fn pod(&self) -> &Arc<Pod> {
        &self.pod
    }

    /// Start the runtime, spawning the HTTP server and background tasks.
    pub async fn start(self) -> Result<PodRuntime> {
        let pod = self.pod;

        // Readiness watcher
        let ready_shutdown = Arc::new(Notify::new());
        let ready_handle = tokio::spawn(watch_readiness(
            pod.clone(),
            self.ready_poll_interval,
            ready_shutdown.clone(),
        ));

        // Engine event listener, for engines that push events in-process
        let events_shutdown = Arc::new(Notify::new());
        let events_handle = pod.engine().subscribe().map(|events| {
            tokio::spawn(listen_flow_events(
                pod.clone(),
                events,
                events_shutdown.clone(),
            ))
        });

        // HTTP server
        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let mut state = ServerState::new(pod.clone());
        if let Some(url) = &self.editor_url {
            state = state.with_editor(EditorProxy::new(url));
        }

        let (server_shutdown_tx, server_shutdown_rx) = watch::channel(false);
        let server_handle = tokio::spawn(run_server_with_shutdown(
            listener,
            state,
            server_shutdown_rx,
        ));

        info!(
            pod_name = %pod.name(),
            addr = %local_addr,
            engine = pod.engine().engine_type(),
            editor_proxy = self.editor_url.is_some(),
            "PodRuntime started"
        );

        Ok(PodRuntime {
            server_handle,
            ready_handle,
            events_handle,
            server_shutdown_tx,
            ready_shutdown,
            events_shutdown,
            pod,
            local_addr,
        })
    }
}

/// A running pod that can be embedded in an application.
///
/// The runtime manages:
/// - HTTP server for management, engine callbacks, and editor traffic
/// - Readiness watcher polling the engine
/// - Event listener feeding engine lifecycle events into the pod
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct PodRuntime {
    server_handle: JoinHandle<Result<()>>,
    ready_handle: JoinHandle<()>,
    events_handle: Option<JoinHandle<()>>,
    server_shutdown_tx: watch::Sender<bool>,
    ready_shutdown: Arc<Notify>,
    events_shutdown: Arc<Notify>,
    pod: Arc<Pod>,
    local_addr: SocketAddr,
}

impl PodRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> PodRuntimeBuilder {
        PodRuntimeBuilder::new()
    }

    /// Address the HTTP server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The pod being served.
    pub fn pod(&self) -> &Arc<Pod> {
        &self.pod
    }

    /// Gracefully shut down the runtime.
    pub async fn shutdown(self) -> Result<()> {
        info!("PodRuntime shutting down...");

        let _ = self.server_shutdown_tx.send(true);
        self.ready_shutdown.notify_one();
        self.events_shutdown.notify_one();

        if let Err(e) = self.ready_handle.await {
            error!("Readiness watcher task panicked: {}", e);
        }

        if let Some(handle) = self.events_handle
            && let Err(e) = handle.await
        {
            error!("Event listener task panicked: {}", e);
        }

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("PodRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("PodRuntime server error during shutdown: {}", e);
                Err(e)
            }
            Err(e) => {
                error!("PodRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        let events_running = self.events_handle.as_ref().is_none_or(|h| !h.is_finished());
        !self.server_handle.is_finished() && !self.ready_handle.is_finished() && events_running
    }
}

async fn watch_readiness(pod: Arc<Pod>, interval: Duration, shutdown: Arc<Notify>) {
    loop {
        let ready = pod.engine().is_ready().await;
        if ready != pod.is_ready() {
            pod.set_ready(ready);
            if ready {
                info!(engine = pod.engine().engine_type(), "Engine ready");
            } else {
                warn!(engine = pod.engine().engine_type(), "Engine no longer ready");
            }
        }

        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                debug!("Readiness watcher received shutdown signal");
                break;
            }

            _ = tokio::time::sleep(interval) => {}
        }
    }
}

async fn listen_flow_events(
    pod: Arc<Pod>,
    mut events: broadcast::Receiver<FlowEvent>,
    shutdown: Arc<Notify>,
) {
    loop {
        tokio::select! {
            biased;

            _ = shutdown.notified() => {
                debug!("Event listener received shutdown signal");
                break;
            }

            received = events.recv() => match received {
                Ok(event) => pod.handle_flow_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event listener lagged, running-flow count may drift");
                }
                Err(RecvError::Closed) => {
                    debug!("Engine event stream closed");
                    break;
                }
            },
        }
    }
}
