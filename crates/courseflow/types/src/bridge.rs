//! Cross-subsystem messages
//!
//! A cross-subsystem request names a target subsystem and service plus an
//! opaque payload. It is resolved and invoked out-of-band of the normal
//! routing loop and always answers with a typed response, never a panic
//! or a propagated error.

use crate::{ServiceId, Subsystem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a cross-subsystem call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Request to invoke a service in another subsystem
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossSubsystemRequest {
    pub request_id: String,
    pub source_subsystem: Subsystem,
    pub target_subsystem: Subsystem,
    pub service_id: ServiceId,
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl CrossSubsystemRequest {
    pub fn new(
        source_subsystem: Subsystem,
        target_subsystem: Subsystem,
        service_id: impl Into<ServiceId>,
        payload: Value,
    ) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            source_subsystem,
            target_subsystem,
            service_id: service_id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Response to a cross-subsystem request
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CrossSubsystemResponse {
    pub request_id: String,
    pub service_id: ServiceId,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl CrossSubsystemResponse {
    pub fn success(request: &CrossSubsystemRequest, result: Value, execution_time_ms: u64) -> Self {
        Self {
            request_id: request.request_id.clone(),
            service_id: request.service_id.clone(),
            status: ResponseStatus::Success,
            result: Some(result),
            error: None,
            execution_time_ms,
        }
    }

    pub fn error(
        request: &CrossSubsystemRequest,
        error: impl Into<String>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            service_id: request.service_id.clone(),
            status: ResponseStatus::Error,
            result: None,
            error: Some(error.into()),
            execution_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

/// A cross-subsystem call requested by a service during a run.
///
/// Stored on the execution state until the routing loop consumes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingBridgeRequest {
    pub source_subsystem: Subsystem,
    pub target_subsystem: Subsystem,
    pub service_id: ServiceId,
    #[serde(default)]
    pub payload: Value,
}

impl PendingBridgeRequest {
    pub fn new(
        source_subsystem: Subsystem,
        target_subsystem: Subsystem,
        service_id: impl Into<ServiceId>,
        payload: Value,
    ) -> Self {
        Self {
            source_subsystem,
            target_subsystem,
            service_id: service_id.into(),
            payload,
        }
    }

    pub fn into_request(self) -> CrossSubsystemRequest {
        CrossSubsystemRequest::new(
            self.source_subsystem,
            self.target_subsystem,
            self.service_id,
            self.payload,
        )
    }
}
