// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activity and running-flow tracking.

use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Last-interaction timestamp plus the set of flows executing in the engine.
#[derive(Debug)]
pub struct ActivityTracker {
    last_activity_ms: AtomicI64,
    running: Mutex<HashSet<String>>,
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityTracker {
    /// Create a tracker with activity stamped now and no running flows.
    pub fn new() -> Self {
        Self {
            last_activity_ms: AtomicI64::new(now_ms()),
            running: Mutex::new(HashSet::new()),
        }
    }

    /// Record an interaction.
    pub fn touch(&self) {
        self.last_activity_ms.store(now_ms(), Ordering::SeqCst);
    }

    /// Epoch milliseconds of the last interaction.
    pub fn last_activity(&self) -> i64 {
        self.last_activity_ms.load(Ordering::SeqCst)
    }

    /// Milliseconds since the last interaction.
    pub fn idle_ms(&self) -> i64 {
        (now_ms() - self.last_activity()).max(0)
    }

    /// Add a started flow. Synthesizes an id when the engine sends none.
    pub fn flow_started(&self, flow_id: Option<String>) -> String {
        let id = flow_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
        debug!(flow_id = %id, "Flow started");
        id
    }

    /// Remove a stopped flow.
    ///
    /// Without an id, one arbitrary member is removed. If the engine cannot
    /// correlate start and stop events, the count can drift.
    pub fn flow_stopped(&self, flow_id: Option<&str>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        let removed = match flow_id {
            Some(id) => running.remove(id),
            None => match running.iter().next().cloned() {
                Some(any) => running.remove(&any),
                None => false,
            },
        };
        debug!(flow_id = ?flow_id, removed, "Flow stopped");
        removed
    }

    /// Number of flows currently executing.
    pub fn running_count(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether a given flow is tracked as running.
    pub fn is_running(&self, flow_id: &str) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(flow_id)
    }

    /// Forget every running flow (forced termination).
    pub fn clear_running(&self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_stop_by_id() {
        let tracker = ActivityTracker::new();
        tracker.flow_started(Some("f1".to_string()));
        tracker.flow_started(Some("f2".to_string()));
        assert_eq!(tracker.running_count(), 2);

        assert!(tracker.flow_stopped(Some("f1")));
        assert!(!tracker.is_running("f1"));
        assert!(tracker.is_running("f2"));
        assert!(!tracker.flow_stopped(Some("unknown")));
        assert_eq!(tracker.running_count(), 1);
    }

    #[test]
    fn test_synthesized_ids_are_distinct() {
        let tracker = ActivityTracker::new();
        let a = tracker.flow_started(None);
        let b = tracker.flow_started(None);
        assert_ne!(a, b);
        assert_eq!(tracker.running_count(), 2);
    }

    #[test]
    fn test_stop_without_id_removes_one() {
        let tracker = ActivityTracker::new();
        tracker.flow_started(Some("f1".to_string()));
        tracker.flow_started(Some("f2".to_string()));
        assert!(tracker.flow_stopped(None));
        assert_eq!(tracker.running_count(), 1);
        assert!(tracker.flow_stopped(None));
        assert!(!tracker.flow_stopped(None));
        assert_eq!(tracker.running_count(), 0);
    }

    #[test]
    fn test_touch_and_idle() {
        let tracker = ActivityTracker::new();
        let before = tracker.last_activity();
        tracker.touch();
        assert!(tracker.last_activity() >= before);
        assert!(tracker.idle_ms() >= 0);
    }

    #[test]
    fn test_clear_running() {
        let tracker = ActivityTracker::new();
        tracker.flow_started(None);
        tracker.clear_running();
        assert_eq!(tracker.running_count(), 0);
    }
}
