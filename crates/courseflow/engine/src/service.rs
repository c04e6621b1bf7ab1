//! Service capability: the uniform contract every unit of work implements
//!
//! The engine never knows what a service does. It hands the service a
//! read-only view of the execution state plus a [`ServiceContext`]
//! carrying the deadline and cancellation signal, and merges the returned
//! [`ServiceOutput`] back into the state.

use crate::ServiceError;
use async_trait::async_trait;
use courseflow_types::{ExecutionState, PendingBridgeRequest, ServiceDescriptor, ServiceId, SessionId};
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// A unit of work invoked by the orchestration engine
#[async_trait]
pub trait Service: Send + Sync {
    /// Immutable contract of this service
    fn descriptor(&self) -> &ServiceDescriptor;

    /// Execute against the current state and return the keys to merge back.
    ///
    /// Long-running implementations should observe `ctx.cancellation`; the
    /// engine abandons the call once the deadline passes either way.
    async fn execute(
        &self,
        ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError>;
}

// ── Invocation Context ───────────────────────────────────────────────

/// Per-invocation context passed to [`Service::execute`]
#[derive(Clone, Debug)]
pub struct ServiceContext {
    pub session_id: SessionId,
    pub service_id: ServiceId,
    /// 1-based attempt number within the run
    pub attempt: u32,
    pub deadline: Instant,
    pub cancellation: CancellationToken,
}

impl ServiceContext {
    pub fn new(
        session_id: SessionId,
        service_id: ServiceId,
        attempt: u32,
        timeout: Duration,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            session_id,
            service_id,
            attempt,
            deadline: Instant::now() + timeout,
            cancellation,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

// ── Service Output ───────────────────────────────────────────────────

/// State delta returned by a successful execution
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServiceOutput {
    /// Domain keys to merge into the execution state
    pub data: Map<String, Value>,
    /// Value recorded under `service_result`; defaults to `data`
    pub result: Option<Value>,
    /// Cross-subsystem call to route before the next execution
    pub bridge: Option<PendingBridgeRequest>,
}

impl ServiceOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_bridge_request(mut self, request: PendingBridgeRequest) -> Self {
        self.bridge = Some(request);
        self
    }

    /// The value to record as this service's result
    pub fn result_value(&self) -> Value {
        self.result
            .clone()
            .unwrap_or_else(|| Value::Object(self.data.clone()))
    }
}

// ── Closure Adapter ──────────────────────────────────────────────────

/// Adapts a synchronous closure into a [`Service`]
pub struct FnService<F> {
    descriptor: ServiceDescriptor,
    func: F,
}

impl<F> FnService<F>
where
    F: Fn(&ExecutionState) -> Result<ServiceOutput, ServiceError> + Send + Sync + 'static,
{
    pub fn new(descriptor: ServiceDescriptor, func: F) -> Self {
        Self { descriptor, func }
    }
}

#[async_trait]
impl<F> Service for FnService<F>
where
    F: Fn(&ExecutionState) -> Result<ServiceOutput, ServiceError> + Send + Sync + 'static,
{
    fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    async fn execute(
        &self,
        _ctx: &ServiceContext,
        state: &ExecutionState,
    ) -> Result<ServiceOutput, ServiceError> {
        (self.func)(state)
    }
}

impl<F> std::fmt::Debug for FnService<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnService")
            .field("id", &self.descriptor.id)
            .finish()
    }
}

/// Run a service under its deadline, racing the cancellation token
pub(crate) async fn invoke(
    service: &dyn Service,
    ctx: &ServiceContext,
    state: &ExecutionState,
    timeout: Duration,
) -> Result<ServiceOutput, ServiceError> {
    tokio::select! {
        biased;
        _ = ctx.cancellation.cancelled() => Err(ServiceError::Cancelled),
        outcome = tokio::time::timeout(timeout, service.execute(ctx, state)) => match outcome {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout(timeout.as_millis() as u64)),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courseflow_types::Subsystem;
    use serde_json::json;

    struct SlowService {
        descriptor: ServiceDescriptor,
    }

    #[async_trait]
    impl Service for SlowService {
        fn descriptor(&self) -> &ServiceDescriptor {
            &self.descriptor
        }

        async fn execute(
            &self,
            _ctx: &ServiceContext,
            _state: &ExecutionState,
        ) -> Result<ServiceOutput, ServiceError> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(ServiceOutput::new())
        }
    }

    fn ctx(token: CancellationToken) -> ServiceContext {
        ServiceContext::new(
            SessionId::new("s1"),
            ServiceId::new("slow"),
            1,
            Duration::from_secs(1),
            token,
        )
    }

    #[test]
    fn test_result_defaults_to_data() {
        let output = ServiceOutput::new().with("chunks", json!(["a", "b"]));
        assert_eq!(output.result_value(), json!({"chunks": ["a", "b"]}));

        let output = output.with_result(json!(2));
        assert_eq!(output.result_value(), json!(2));
    }

    #[tokio::test]
    async fn test_fn_service_executes_closure() {
        let service = FnService::new(
            ServiceDescriptor::new("echo", Subsystem::Content, "Echo"),
            |state: &ExecutionState| {
                let value = state.get("in").cloned().unwrap_or(Value::Null);
                Ok(ServiceOutput::new().with("out", value))
            },
        );
        let state = ExecutionState::new().with_value("in", json!(7));
        let output = service
            .execute(&ctx(CancellationToken::new()), &state)
            .await
            .unwrap();
        assert_eq!(output.data.get("out"), Some(&json!(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invoke_times_out() {
        let service = SlowService {
            descriptor: ServiceDescriptor::new("slow", Subsystem::Content, "Slow"),
        };
        let result = invoke(
            &service,
            &ctx(CancellationToken::new()),
            &ExecutionState::new(),
            Duration::from_millis(50),
        )
        .await;
        assert_eq!(result, Err(ServiceError::Timeout(50)));
    }

    #[tokio::test]
    async fn test_invoke_observes_cancellation() {
        let service = SlowService {
            descriptor: ServiceDescriptor::new("slow", Subsystem::Content, "Slow"),
        };
        let token = CancellationToken::new();
        token.cancel();
        let result = invoke(
            &service,
            &ctx(token),
            &ExecutionState::new(),
            Duration::from_secs(5),
        )
        .await;
        assert_eq!(result, Err(ServiceError::Cancelled));
    }
}
