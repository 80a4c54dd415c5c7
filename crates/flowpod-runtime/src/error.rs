// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for flowpod-runtime.

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::engine::EngineError;

/// Errors returned by pod management operations.
///
/// None of these change the pod's tenant assignment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PodError {
    /// The presented pod secret does not match.
    #[error("invalid pod secret")]
    AuthFailed,

    /// Required fields are missing from the request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The Gateway bridge could not be initialized. Safe to retry.
    #[error("bridge initialization failed: {0}")]
    BridgeInit(#[from] BridgeError),

    /// The engine rejected the graph.
    #[error("deploy failed: {0}")]
    Deploy(#[from] EngineError),

    /// No tenant is loaded for an operation that needs one.
    #[error("no tenant is loaded on this pod")]
    Unassigned,
}

impl PodError {
    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            PodError::AuthFailed => "AUTH_FAILED",
            PodError::BadRequest(_) => "BAD_REQUEST",
            PodError::BridgeInit(_) => "BRIDGE_INIT_FAILED",
            PodError::Deploy(_) => "DEPLOY_FAILED",
            PodError::Unassigned => "UNASSIGNED",
        }
    }
}

/// Runtime errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pod management operation failed.
    #[error("Pod error: {0}")]
    Pod(#[from] PodError),

    /// Engine adapter failed.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    /// Outbound client setup failed.
    #[error("Egress error: {0}")]
    Egress(#[from] flowpod_egress::OutboundError),
}

/// Result type using the runtime Error.
pub type Result<T> = std::result::Result<T, Error>;
