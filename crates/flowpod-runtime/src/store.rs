// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process ephemeral store.
//!
//! Holds the graph, credentials, and settings of whichever tenant owns the
//! pod. Nothing is persisted. The whole state is swapped on load and dropped
//! on unload; there is no partial update path.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};

/// A tenant's flow graph, opaque beyond its node count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Graph(pub Value);

impl Graph {
    /// The empty graph deployed when a pod is released.
    pub fn empty() -> Self {
        Graph(Value::Array(Vec::new()))
    }

    /// Number of nodes in the graph.
    ///
    /// Accepts either a bare array of nodes or an object with a `nodes` array.
    /// Anything else counts as zero nodes.
    pub fn node_count(&self) -> usize {
        match &self.0 {
            Value::Array(nodes) => nodes.len(),
            Value::Object(map) => map
                .get("nodes")
                .and_then(Value::as_array)
                .map_or(0, Vec::len),
            _ => 0,
        }
    }
}

/// Everything a tenant brings into the pod.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EphemeralState {
    /// Deployed flow graph
    pub graph: Graph,
    /// Tenant credentials handed to the engine
    pub credentials: Value,
    /// Tenant-level engine settings
    pub settings: Value,
}

impl EphemeralState {
    /// Build a state from its parts.
    pub fn new(graph: Graph, credentials: Value, settings: Value) -> Self {
        Self {
            graph,
            credentials,
            settings,
        }
    }
}

/// Memory-resident holder for the current [`EphemeralState`].
///
/// Cloning shares the same underlying slot.
#[derive(Debug, Clone, Default)]
pub struct EphemeralStore {
    inner: Arc<RwLock<Option<EphemeralState>>>,
}

impl EphemeralStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole state.
    pub fn replace(&self, state: EphemeralState) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(state);
    }

    /// Drop the whole state.
    pub fn clear(&self) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Copy of the current state, if any.
    pub fn snapshot(&self) -> Option<EphemeralState> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether a state is held.
    pub fn is_empty(&self) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}
