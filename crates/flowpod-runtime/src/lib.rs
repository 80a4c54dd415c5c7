// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! flowpod Runtime - per-pod runtime controller
//!
//! Each pod hosts at most one tenant's flow graph at a time. This crate
//! accepts tenant assignment from the Pool Manager, drives the embedded flow
//! engine, tracks activity and running flows, and reports health.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐         ┌──────────────────────────────────┐
//! │     Pool Manager     │  HTTP   │          flowpod-runtime         │
//! │ (assign / evict)     │────────►│  /health /activity               │
//! └──────────────────────┘         │  /load-flows /unload-flows       │
//!                                  │                                  │
//! ┌──────────────────────┐         │  ┌────────┐ ┌────────┐ ┌───────┐ │
//! │       Editor         │────────►│  │  Pod   │─│ Store  │ │Tracker│ │
//! │ (counts as activity) │ proxied │  └───┬────┘ └────────┘ └───▲───┘ │
//! └──────────────────────┘         │      │ deploy              │     │
//!                                  │      ▼              events │     │
//!                                  │  ┌──────────────────────────┐    │
//!                                  │  │   FlowEngine adapter     │    │
//!                                  │  └───┬──────────────────┬───┘    │
//!                                  └──────┼──────────────────┼────────┘
//!                                         │ GuardedClient    │ GatewayBridge
//!                                         ▼                  ▼
//!                                     internet            Gateway
//!                                  (egress guard)
//! ```
//!
//! # HTTP Surface
//!
//! | Operation | Route | Auth | Success |
//! |-----------|-------|------|---------|
//! | Health | `GET /health` | none | `{ok, nrReady, userId, uptime, podName}` |
//! | Activity | `GET /activity` | none | `{lastActivity, userId, flowsRunning, idleMs, memoryMb}` |
//! | Load | `POST /load-flows` | secret in body | `{ok, nodeCount}` |
//! | Unload | `POST /unload-flows` | secret in body | `{ok}` |
//! | Flow event | `POST /flow-events` | bearer secret | `{ok}` |
//! | Outbound call | `POST /egress/request` | bearer secret | `{status, headers, body}` |
//! | Tool call | `POST /tools/invoke` | bearer secret | tool result |
//!
//! Errors are `{ok: false, error, code}` with one of `AUTH_FAILED` (403),
//! `BAD_REQUEST` (400), `BRIDGE_INIT_FAILED` (500), `DEPLOY_FAILED` (500).
//!
//! # Engines
//!
//! | Engine | Description |
//! |--------|-------------|
//! | `http` (default) | Out-of-process engine driven through its admin API |
//! | `mock` | In-memory engine for development and tests |

#![deny(missing_docs)]

/// Gateway bridge.
pub mod bridge;

/// Configuration loaded from environment variables.
pub mod config;

/// Flow engine adapters.
pub mod engine;

/// Error types.
pub mod error;

/// Transport-independent request handlers.
pub mod handlers;

/// The pod controller.
pub mod pod;

/// Embeddable runtime.
pub mod runtime;

/// HTTP server.
pub mod server;

/// Ephemeral tenant state.
pub mod store;

/// Activity and running-flow tracking.
pub mod tracker;

pub use error::{Error, PodError, Result};
pub use pod::Pod;
pub use runtime::PodRuntime;
