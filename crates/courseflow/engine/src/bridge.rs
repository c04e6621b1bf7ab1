//! Cross-subsystem bridge
//!
//! Resolves a [`CrossSubsystemRequest`] against the registry and invokes the
//! target service. Misrouting is reported as an ERROR response, never as a
//! propagated error.

use crate::{service, EngineConfig, Service, ServiceContext, ServiceOutput, ServiceRegistry};
use courseflow_types::{
    CrossSubsystemRequest, CrossSubsystemResponse, ExecutionState, SessionId,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

/// Payload key used when a bridge payload is not a JSON object
pub const BRIDGE_PAYLOAD_KEY: &str = "bridgePayload";

/// Outcome of one bridge invocation: the response plus the data to merge
#[derive(Clone, Debug)]
pub struct BridgeOutcome {
    pub response: CrossSubsystemResponse,
    pub output: Option<ServiceOutput>,
}

/// Routes requests between subsystems
#[derive(Clone, Copy, Debug, Default)]
pub struct CrossSubsystemBridge;

impl CrossSubsystemBridge {
    pub fn new() -> Self {
        Self
    }

    /// Find the target service; any subsystem may be targeted
    pub fn resolve(
        &self,
        registry: &ServiceRegistry,
        request: &CrossSubsystemRequest,
    ) -> Result<Arc<dyn Service>, String> {
        let service = registry
            .get(&request.service_id)
            .map_err(|_| format!("Service '{}' not found", request.service_id))?;

        let actual = service.descriptor().subsystem;
        if actual != request.target_subsystem {
            return Err(format!(
                "Service '{}' belongs to subsystem '{}', not '{}'",
                request.service_id, actual, request.target_subsystem
            ));
        }
        Ok(service)
    }

    /// Caller state with the request payload overlaid.
    ///
    /// Object payloads are merged key by key; anything else is stored under
    /// [`BRIDGE_PAYLOAD_KEY`].
    pub fn payload_state(&self, state: &ExecutionState, payload: &Value) -> ExecutionState {
        let mut view = state.clone();
        match payload {
            Value::Object(map) => {
                for (key, value) in map {
                    view.insert(key.clone(), value.clone());
                }
            }
            Value::Null => {}
            other => {
                view.insert(BRIDGE_PAYLOAD_KEY, other.clone());
            }
        }
        view
    }

    /// Invoke an already resolved service for a request
    pub async fn invoke(
        &self,
        service: Arc<dyn Service>,
        request: &CrossSubsystemRequest,
        state: &ExecutionState,
        config: &EngineConfig,
        cancellation: CancellationToken,
    ) -> BridgeOutcome {
        let started = Instant::now();
        let timeout = service
            .descriptor()
            .timeout
            .unwrap_or_else(|| config.default_service_timeout());
        let session_id = state.session_id.clone().unwrap_or_else(SessionId::generate);
        let ctx = ServiceContext::new(
            session_id,
            request.service_id.clone(),
            1,
            timeout,
            cancellation,
        );
        let view = self.payload_state(state, &request.payload);

        let outcome = service::invoke(service.as_ref(), &ctx, &view, timeout).await;
        let elapsed = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                tracing::debug!(
                    request_id = %request.request_id,
                    service_id = %request.service_id,
                    elapsed_ms = elapsed,
                    "Bridge request succeeded"
                );
                BridgeOutcome {
                    response: CrossSubsystemResponse::success(
                        request,
                        output.result_value(),
                        elapsed,
                    ),
                    output: Some(output),
                }
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    service_id = %request.service_id,
                    error = %e,
                    "Bridge request failed"
                );
                BridgeOutcome {
                    response: CrossSubsystemResponse::error(request, e.to_string(), elapsed),
                    output: None,
                }
            }
        }
    }
}
