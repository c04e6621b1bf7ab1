//! Execution state: the shared map passed through one orchestration run
//!
//! Services read required keys from [`ExecutionState::data`] and their
//! outputs are merged back into it. Per-service status, results, errors
//! and attempt counts live beside the data, and every routing step is
//! appended to [`ExecutionState::execution_history`].

use crate::{PendingBridgeRequest, ResponseStatus, ServiceId, ServiceStatus, SessionId, Subsystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

// ── Execution Events ─────────────────────────────────────────────────

/// What happened at one step of a run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEventKind {
    SessionInitialized,
    ServiceStarted {
        service_id: ServiceId,
        subsystem: Subsystem,
        attempt: u32,
    },
    ServiceCompleted {
        service_id: ServiceId,
        subsystem: Subsystem,
        duration_ms: u64,
    },
    ServiceFailed {
        service_id: ServiceId,
        subsystem: Subsystem,
        error: String,
        duration_ms: u64,
    },
    BridgeRouted {
        request_id: String,
        service_id: ServiceId,
        source_subsystem: Subsystem,
        target_subsystem: Subsystem,
        status: ResponseStatus,
    },
    StepLimitReached {
        steps: usize,
    },
    SessionCancelled,
    SessionFinalized {
        completed: Vec<ServiceId>,
        failed: Vec<ServiceId>,
        waiting: Vec<ServiceId>,
    },
}

impl ExecutionEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionEventKind::SessionInitialized => "session_initialized",
            ExecutionEventKind::ServiceStarted { .. } => "service_started",
            ExecutionEventKind::ServiceCompleted { .. } => "service_completed",
            ExecutionEventKind::ServiceFailed { .. } => "service_failed",
            ExecutionEventKind::BridgeRouted { .. } => "bridge_routed",
            ExecutionEventKind::StepLimitReached { .. } => "step_limit_reached",
            ExecutionEventKind::SessionCancelled => "session_cancelled",
            ExecutionEventKind::SessionFinalized { .. } => "session_finalized",
        }
    }
}

/// One entry of the append-only execution history
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: ExecutionEventKind,
    #[serde(default)]
    pub message: String,
}

impl ExecutionEvent {
    pub fn new(kind: ExecutionEventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

// ── Execution State ──────────────────────────────────────────────────

/// Shared mutable state of one orchestration run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default)]
    pub service_status: HashMap<ServiceId, ServiceStatus>,
    #[serde(default)]
    pub service_result: HashMap<ServiceId, Value>,
    #[serde(default)]
    pub service_error: HashMap<ServiceId, String>,
    #[serde(default)]
    pub service_attempts: HashMap<ServiceId, u32>,
    #[serde(default)]
    pub execution_history: Vec<ExecutionEvent>,
    /// Domain keys written by services (see [`crate::keys`])
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_bridge: Option<PendingBridgeRequest>,
}

impl ExecutionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Return the session id, assigning a fresh one if absent
    pub fn ensure_session(&mut self) -> SessionId {
        self.session_id
            .get_or_insert_with(SessionId::generate)
            .clone()
    }

    // ── Domain data ──────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.data.insert(key.into(), value)
    }

    /// True iff the key is present and not null
    pub fn has_input(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|v| !v.is_null())
    }

    // ── Service bookkeeping ──────────────────────────────────────────

    /// Status of a service; absent entries read as NOT_STARTED
    pub fn status_of(&self, service_id: &ServiceId) -> ServiceStatus {
        self.service_status
            .get(service_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn set_status(&mut self, service_id: &ServiceId, status: ServiceStatus) {
        self.service_status.insert(service_id.clone(), status);
    }

    pub fn attempts(&self, service_id: &ServiceId) -> u32 {
        self.service_attempts.get(service_id).copied().unwrap_or(0)
    }

    pub fn record_attempt(&mut self, service_id: &ServiceId) -> u32 {
        let attempts = self.service_attempts.entry(service_id.clone()).or_insert(0);
        *attempts += 1;
        *attempts
    }

    pub fn record_event(&mut self, event: ExecutionEvent) {
        self.execution_history.push(event);
    }

    /// Explicitly reset a service so it may run again from scratch
    pub fn reset_service(&mut self, service_id: &ServiceId) {
        self.service_status
            .insert(service_id.clone(), ServiceStatus::NotStarted);
        self.service_result.remove(service_id);
        self.service_error.remove(service_id);
        self.service_attempts.remove(service_id);
    }

    /// Services with the given status, sorted by id
    pub fn services_with_status(&self, status: ServiceStatus) -> Vec<ServiceId> {
        let mut ids: Vec<ServiceId> = self
            .service_status
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn completed_services(&self) -> Vec<ServiceId> {
        self.services_with_status(ServiceStatus::Completed)
    }

    pub fn failed_services(&self) -> Vec<ServiceId> {
        self.services_with_status(ServiceStatus::Error)
    }

    /// Names of the recorded events, in order
    pub fn event_names(&self) -> Vec<&'static str> {
        self.execution_history.iter().map(|e| e.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_has_input_rejects_null() {
        let state = ExecutionState::new()
            .with_value("chunks", json!(["a"]))
            .with_value("facd", Value::Null);
        assert!(state.has_input("chunks"));
        assert!(!state.has_input("facd"));
        assert!(!state.has_input("missing"));
    }

    #[test]
    fn test_status_defaults_to_not_started() {
        let state = ExecutionState::new();
        assert_eq!(
            state.status_of(&ServiceId::new("x")),
            ServiceStatus::NotStarted
        );
    }

    #[test]
    fn test_reset_service() {
        let mut state = ExecutionState::new();
        let id = ServiceId::new("a");
        state.set_status(&id, ServiceStatus::Error);
        state.service_error.insert(id.clone(), "boom".into());
        state.record_attempt(&id);

        state.reset_service(&id);
        assert_eq!(state.status_of(&id), ServiceStatus::NotStarted);
        assert!(state.service_error.is_empty());
        assert_eq!(state.attempts(&id), 0);
    }

    #[test]
    fn test_ensure_session_is_stable() {
        let mut state = ExecutionState::new();
        let first = state.ensure_session();
        let second = state.ensure_session();
        assert_eq!(first, second);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = ExecutionEvent::new(ExecutionEventKind::SessionInitialized, "started");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "session_initialized");

        let back: ExecutionEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind, ExecutionEventKind::SessionInitialized);
    }

    #[test]
    fn test_services_with_status_sorted() {
        let mut state = ExecutionState::new();
        state.set_status(&ServiceId::new("b"), ServiceStatus::Completed);
        state.set_status(&ServiceId::new("a"), ServiceStatus::Completed);
        state.set_status(&ServiceId::new("c"), ServiceStatus::Error);

        assert_eq!(
            state.completed_services(),
            vec![ServiceId::new("a"), ServiceId::new("b")]
        );
        assert_eq!(state.failed_services(), vec![ServiceId::new("c")]);
    }
}
