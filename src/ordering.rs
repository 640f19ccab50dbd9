//! Ordering Manager (C2)
//!
//! Assigns monotonically increasing step numbers and per-agent/per-tool call
//! indices, and tracks parent/child step context for nested operations. The
//! `Recorder` (C6) persists events through its own dedicated writer thread;
//! this manager is the single source of truth for step and call-index
//! bookkeeping that thread's output is ordered by.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A single event in write order, carrying its ordering metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderedEvent {
    pub event_id: Uuid,
    pub step: u64,
    pub parent_step: Option<u64>,
    pub agent_id: String,
    pub call_index: u64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub payload: Value,
}

struct Counters {
    global_step: u64,
    call_indices: HashMap<(String, String), u64>,
    step_stack: Vec<u64>,
}

/// Owns the global step counter and per-agent/tool call-index counters.
pub struct OrderingManager {
    counters: Mutex<Counters>,
}

impl OrderingManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            counters: Mutex::new(Counters {
                global_step: 0,
                call_indices: HashMap::new(),
                step_stack: Vec::new(),
            }),
        })
    }

    /// Create a new ordered event under the single counters mutex. `step` is
    /// strictly increasing; `call_index` counts prior events sharing
    /// `(agent_id, tool_name)` starting at 0; `parent_step` defaults to the
    /// top of the step stack when not supplied explicitly.
    pub fn create_event(
        &self,
        event_type: &str,
        agent_id: &str,
        tool_name: &str,
        payload: Value,
        parent_step: Option<u64>,
    ) -> OrderedEvent {
        let mut counters = self.counters.lock().unwrap();
        counters.global_step += 1;
        let step = counters.global_step;

        let key = (agent_id.to_string(), tool_name.to_string());
        let call_index = *counters.call_indices.get(&key).unwrap_or(&0);
        counters.call_indices.insert(key, call_index + 1);

        let parent_step = parent_step.or_else(|| counters.step_stack.last().copied());

        OrderedEvent {
            event_id: Uuid::new_v4(),
            step,
            parent_step,
            agent_id: agent_id.to_string(),
            call_index,
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            payload,
        }
    }

    pub fn push_step_context(&self, step: u64) {
        self.counters.lock().unwrap().step_stack.push(step);
    }

    pub fn pop_step_context(&self) -> Option<u64> {
        self.counters.lock().unwrap().step_stack.pop()
    }

    pub fn call_index(&self, agent_id: &str, tool_name: &str) -> u64 {
        let counters = self.counters.lock().unwrap();
        *counters
            .call_indices
            .get(&(agent_id.to_string(), tool_name.to_string()))
            .unwrap_or(&0)
    }

    pub fn reset(&self) {
        let mut counters = self.counters.lock().unwrap();
        counters.global_step = 0;
        counters.call_indices.clear();
        counters.step_stack.clear();
    }
}

/// RAII guard pushing a step context on construction and popping it on drop,
/// used to track parent/child relationships across nested operations.
pub struct StepContext<'a> {
    manager: &'a OrderingManager,
}

impl<'a> StepContext<'a> {
    pub fn new(manager: &'a OrderingManager, step: u64) -> Self {
        manager.push_step_context(step);
        Self { manager }
    }
}

impl<'a> Drop for StepContext<'a> {
    fn drop(&mut self) {
        self.manager.pop_step_context();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn steps_strictly_increase() {
        let mgr = OrderingManager::new();
        let e1 = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        let e2 = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        assert!(e2.step > e1.step);
    }

    #[test]
    fn call_index_counts_per_agent_tool() {
        let mgr = OrderingManager::new();
        let e0 = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        let e1 = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        let other = mgr.create_event("tool_call", "a1", "fetch", json!({}), None);
        assert_eq!(e0.call_index, 0);
        assert_eq!(e1.call_index, 1);
        assert_eq!(other.call_index, 0);
    }

    #[test]
    fn parent_step_from_stack() {
        let mgr = OrderingManager::new();
        let parent = mgr.create_event("llm_call", "a1", "gpt", json!({}), None);
        let _ctx = StepContext::new(&mgr, parent.step);
        let child = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        assert_eq!(child.parent_step, Some(parent.step));
    }

    #[test]
    fn reset_clears_counters() {
        let mgr = OrderingManager::new();
        mgr.create_event("tool_call", "a1", "search", json!({}), None);
        mgr.reset();
        let e = mgr.create_event("tool_call", "a1", "search", json!({}), None);
        assert_eq!(e.step, 1);
        assert_eq!(e.call_index, 0);
    }
}
