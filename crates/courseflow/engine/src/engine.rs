//! Orchestration engine: the routing state machine
//!
//! A run walks `Init → Route → Execute → Route … → Bridge → Route … →
//! Finalize`. Route picks the next step from the execution state, Execute
//! runs exactly one ready service, and Bridge consumes a pending
//! cross-subsystem request. Service failures are recorded in the state and
//! never abort the loop.

use crate::bridge::BridgeOutcome;
use crate::{
    service, CrossSubsystemBridge, EngineConfig, EngineError, EngineResult, Executability,
    ExecutabilityResolver, OrchestrationRequest, Service, ServiceContext, ServiceRegistry,
};
use courseflow_types::{
    CrossSubsystemRequest, CrossSubsystemResponse, ExecutionEvent, ExecutionEventKind,
    ExecutionState, ServiceDescriptor, ServiceId, ServiceStatus, SessionId, Subsystem,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

// ── Run Report ───────────────────────────────────────────────────────

/// How a run ended
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No ready services left, nothing failed or waiting
    Completed,
    /// No ready services left, but some failed or are still waiting
    Partial,
    /// The cancellation token fired
    Cancelled,
    /// `max_steps` was exhausted
    StepLimitReached,
}

/// Result of one orchestration run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub session_id: SessionId,
    pub subsystem: Subsystem,
    pub status: RunStatus,
    pub completed: Vec<ServiceId>,
    pub failed: Vec<ServiceId>,
    pub waiting: Vec<ServiceId>,
    /// Execute and Bridge steps taken
    pub steps: usize,
    pub state: ExecutionState,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }
}

// ── Routing States ───────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq)]
enum RouteState {
    Init,
    Route,
    Execute(ServiceId),
    Bridge,
    Finalize(FinalizeReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FinalizeReason {
    Idle,
    Cancelled,
    StepLimit,
}

// ── Engine ───────────────────────────────────────────────────────────

/// Owns the service registry and drives orchestration runs
pub struct OrchestrationEngine {
    registry: RwLock<ServiceRegistry>,
    config: EngineConfig,
    bridge: CrossSubsystemBridge,
}

impl OrchestrationEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_registry(config, ServiceRegistry::new())
    }

    pub fn with_registry(config: EngineConfig, registry: ServiceRegistry) -> Self {
        Self {
            registry: RwLock::new(registry),
            config,
            bridge: CrossSubsystemBridge::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn read_registry(&self) -> EngineResult<RwLockReadGuard<'_, ServiceRegistry>> {
        self.registry.read().map_err(|_| EngineError::LockPoisoned)
    }

    fn write_registry(&self) -> EngineResult<RwLockWriteGuard<'_, ServiceRegistry>> {
        self.registry.write().map_err(|_| EngineError::LockPoisoned)
    }

    // ── Registry facade ──────────────────────────────────────────────

    pub fn register_service(&self, service: Arc<dyn Service>) -> EngineResult<ServiceId> {
        self.write_registry()?.register(service)
    }

    pub fn unregister_service(&self, id: &ServiceId) -> EngineResult<()> {
        self.write_registry()?.unregister(id).map(|_| ())
    }

    pub fn service(&self, id: &ServiceId) -> EngineResult<Arc<dyn Service>> {
        self.read_registry()?.get(id)
    }

    pub fn descriptor(&self, id: &ServiceId) -> EngineResult<ServiceDescriptor> {
        self.read_registry()?.descriptor(id).cloned()
    }

    pub fn services_of(&self, subsystem: Subsystem) -> EngineResult<Vec<ServiceDescriptor>> {
        Ok(self
            .read_registry()?
            .services_of(subsystem)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Every registered descriptor, in registration order
    pub fn list_services(&self) -> EngineResult<Vec<ServiceDescriptor>> {
        Ok(self.read_registry()?.list().into_iter().cloned().collect())
    }

    pub fn validate_registry(&self) -> EngineResult<()> {
        self.read_registry()?.validate()
    }

    // ── Executability ────────────────────────────────────────────────

    pub fn dependencies_satisfied(
        &self,
        id: &ServiceId,
        state: &ExecutionState,
    ) -> EngineResult<(bool, Vec<ServiceId>)> {
        let registry = self.read_registry()?;
        self.resolver(&registry).dependencies_satisfied(id, state)
    }

    pub fn can_execute(&self, id: &ServiceId, state: &ExecutionState) -> EngineResult<Executability> {
        let registry = self.read_registry()?;
        Ok(self.resolver(&registry).can_execute(id, state))
    }

    pub fn ready_services(
        &self,
        state: &ExecutionState,
        subsystem: Option<Subsystem>,
    ) -> EngineResult<Vec<ServiceId>> {
        let registry = self.read_registry()?;
        Ok(self.resolver(&registry).ready_services(state, subsystem))
    }

    fn resolver<'a>(&self, registry: &'a ServiceRegistry) -> ExecutabilityResolver<'a> {
        ExecutabilityResolver::new(registry).with_max_attempts(self.config.max_attempts)
    }

    // ── Runs ─────────────────────────────────────────────────────────

    /// Run a typed request to completion
    pub async fn run(&self, request: OrchestrationRequest) -> EngineResult<RunReport> {
        self.run_with_cancellation(request, CancellationToken::new())
            .await
    }

    pub async fn run_with_cancellation(
        &self,
        request: OrchestrationRequest,
        cancellation: CancellationToken,
    ) -> EngineResult<RunReport> {
        let subsystem = request.subsystem();
        self.run_state(subsystem, request.into_state(), cancellation)
            .await
    }

    /// Drive the state machine for one subsystem over a caller-built state
    pub async fn run_state(
        &self,
        subsystem: Subsystem,
        mut state: ExecutionState,
        cancellation: CancellationToken,
    ) -> EngineResult<RunReport> {
        let mut steps = 0usize;
        let mut route = RouteState::Init;

        loop {
            route = match route {
                RouteState::Init => {
                    let session_id = state.ensure_session();
                    state.record_event(ExecutionEvent::new(
                        ExecutionEventKind::SessionInitialized,
                        format!("Session started for subsystem {}", subsystem),
                    ));
                    tracing::info!(
                        session_id = %session_id,
                        subsystem = %subsystem,
                        "Orchestration session started"
                    );
                    RouteState::Route
                }
                RouteState::Route => self.route(subsystem, &mut state, steps, &cancellation)?,
                RouteState::Execute(service_id) => {
                    steps += 1;
                    self.execute_service(&service_id, &mut state, &cancellation)
                        .await?;
                    RouteState::Route
                }
                RouteState::Bridge => {
                    steps += 1;
                    self.bridge_pending(&mut state, &cancellation).await?;
                    RouteState::Route
                }
                RouteState::Finalize(reason) => {
                    return self.finalize(subsystem, state, reason, steps);
                }
            };
        }
    }

    fn route(
        &self,
        subsystem: Subsystem,
        state: &mut ExecutionState,
        steps: usize,
        cancellation: &CancellationToken,
    ) -> EngineResult<RouteState> {
        if cancellation.is_cancelled() {
            state.record_event(ExecutionEvent::new(
                ExecutionEventKind::SessionCancelled,
                "Run cancelled",
            ));
            return Ok(RouteState::Finalize(FinalizeReason::Cancelled));
        }

        if steps >= self.config.max_steps {
            tracing::warn!(
                session_id = ?state.session_id,
                steps,
                "Step limit reached"
            );
            state.record_event(ExecutionEvent::new(
                ExecutionEventKind::StepLimitReached { steps },
                format!("Stopped after {} steps", steps),
            ));
            return Ok(RouteState::Finalize(FinalizeReason::StepLimit));
        }

        if state.pending_bridge.is_some() {
            tracing::debug!(session_id = ?state.session_id, "Routing to bridge");
            return Ok(RouteState::Bridge);
        }

        let ready = self.ready_services(state, Some(subsystem))?;
        match ready.into_iter().next() {
            Some(service_id) => {
                tracing::debug!(
                    session_id = ?state.session_id,
                    service_id = %service_id,
                    "Routing to service"
                );
                Ok(RouteState::Execute(service_id))
            }
            None => Ok(RouteState::Finalize(FinalizeReason::Idle)),
        }
    }

    async fn execute_service(
        &self,
        service_id: &ServiceId,
        state: &mut ExecutionState,
        cancellation: &CancellationToken,
    ) -> EngineResult<()> {
        let service = self.service(service_id)?;
        let descriptor = service.descriptor();
        let subsystem = descriptor.subsystem;
        let timeout = descriptor
            .timeout
            .unwrap_or_else(|| self.config.default_service_timeout());

        state.set_status(service_id, ServiceStatus::InProgress);
        let attempt = state.record_attempt(service_id);
        state.record_event(ExecutionEvent::new(
            ExecutionEventKind::ServiceStarted {
                service_id: service_id.clone(),
                subsystem,
                attempt,
            },
            format!("Executing {}", descriptor.name),
        ));

        let session_id = state.ensure_session();
        let ctx = ServiceContext::new(
            session_id.clone(),
            service_id.clone(),
            attempt,
            timeout,
            cancellation.child_token(),
        );
        let started = Instant::now();
        let outcome = service::invoke(service.as_ref(), &ctx, state, timeout).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(output) => {
                for key in output.data.keys() {
                    if !descriptor.provides_key(key) {
                        tracing::warn!(
                            service_id = %service_id,
                            key = %key,
                            "Service wrote an undeclared output"
                        );
                    }
                }
                let result = output.result_value();
                for (key, value) in output.data {
                    state.insert(key, value);
                }
                if let Some(bridge) = output.bridge {
                    state.pending_bridge = Some(bridge);
                }
                state.service_result.insert(service_id.clone(), result);
                state.service_error.remove(service_id);
                state.set_status(service_id, ServiceStatus::Completed);
                state.record_event(ExecutionEvent::new(
                    ExecutionEventKind::ServiceCompleted {
                        service_id: service_id.clone(),
                        subsystem,
                        duration_ms,
                    },
                    format!("{} completed", descriptor.name),
                ));
                tracing::info!(
                    session_id = %session_id,
                    service_id = %service_id,
                    duration_ms,
                    "Service completed"
                );
            }
            Err(e) => {
                let error = e.to_string();
                state.service_error.insert(service_id.clone(), error.clone());
                state.set_status(service_id, ServiceStatus::Error);
                state.record_event(ExecutionEvent::new(
                    ExecutionEventKind::ServiceFailed {
                        service_id: service_id.clone(),
                        subsystem,
                        error: error.clone(),
                        duration_ms,
                    },
                    format!("{} failed: {}", descriptor.name, error),
                ));
                tracing::warn!(
                    session_id = %session_id,
                    service_id = %service_id,
                    attempt,
                    error = %error,
                    "Service failed"
                );
            }
        }
        Ok(())
    }

    async fn bridge_pending(
        &self,
        state: &mut ExecutionState,
        cancellation: &CancellationToken,
    ) -> EngineResult<()> {
        let Some(pending) = state.pending_bridge.take() else {
            return Ok(());
        };
        let request = pending.into_request();
        let outcome = self
            .dispatch(&request, state, cancellation.child_token())
            .await?;
        let response = &outcome.response;
        let service_id = request.service_id.clone();

        match (&response.result, &response.error) {
            (Some(result), _) if response.is_success() => {
                state.service_result.insert(service_id.clone(), result.clone());
                state.service_error.remove(&service_id);
                state.set_status(&service_id, ServiceStatus::Completed);
            }
            (_, error) => {
                let error = error.clone().unwrap_or_else(|| "Bridge request failed".to_string());
                state.service_error.insert(service_id.clone(), error);
                state.set_status(&service_id, ServiceStatus::Error);
            }
        }

        if let Some(output) = outcome.output {
            for (key, value) in output.data {
                state.insert(key, value);
            }
            if let Some(next) = output.bridge {
                state.pending_bridge = Some(next);
            }
        }

        state.record_event(ExecutionEvent::new(
            ExecutionEventKind::BridgeRouted {
                request_id: request.request_id.clone(),
                service_id: service_id.clone(),
                source_subsystem: request.source_subsystem,
                target_subsystem: request.target_subsystem,
                status: response.status,
            },
            format!(
                "Bridged {} -> {} ({})",
                request.source_subsystem, request.target_subsystem, service_id
            ),
        ));
        tracing::info!(
            session_id = ?state.session_id,
            request_id = %request.request_id,
            service_id = %service_id,
            success = response.is_success(),
            "Cross-subsystem request routed"
        );
        Ok(())
    }

    /// Resolve under the read lock, then invoke with the lock released
    async fn dispatch(
        &self,
        request: &CrossSubsystemRequest,
        state: &ExecutionState,
        cancellation: CancellationToken,
    ) -> EngineResult<BridgeOutcome> {
        let resolved = {
            let registry = self.read_registry()?;
            self.bridge.resolve(&registry, request)
        };
        Ok(match resolved {
            Ok(service) => {
                self.bridge
                    .invoke(service, request, state, &self.config, cancellation)
                    .await
            }
            Err(message) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    service_id = %request.service_id,
                    "Bridge request misrouted: {}",
                    message
                );
                BridgeOutcome {
                    response: CrossSubsystemResponse::error(request, message, 0),
                    output: None,
                }
            }
        })
    }

    /// Invoke a service in another subsystem outside of a run.
    ///
    /// The caller's state is read, never modified.
    pub async fn route_cross_subsystem_request(
        &self,
        request: &CrossSubsystemRequest,
        state: &ExecutionState,
    ) -> CrossSubsystemResponse {
        match self
            .dispatch(request, state, CancellationToken::new())
            .await
        {
            Ok(outcome) => outcome.response,
            Err(e) => CrossSubsystemResponse::error(request, e.to_string(), 0),
        }
    }

    fn finalize(
        &self,
        subsystem: Subsystem,
        mut state: ExecutionState,
        reason: FinalizeReason,
        steps: usize,
    ) -> EngineResult<RunReport> {
        {
            let registry = self.read_registry()?;
            let resolver = self.resolver(&registry);
            for descriptor in registry.services_of(subsystem) {
                if state.status_of(&descriptor.id) == ServiceStatus::NotStarted
                    && !resolver.can_execute(&descriptor.id, &state).is_ready()
                {
                    state.set_status(&descriptor.id, ServiceStatus::Waiting);
                }
            }
        }

        let completed = state.completed_services();
        let failed = state.failed_services();
        let waiting = state.services_with_status(ServiceStatus::Waiting);
        let status = match reason {
            FinalizeReason::Cancelled => RunStatus::Cancelled,
            FinalizeReason::StepLimit => RunStatus::StepLimitReached,
            FinalizeReason::Idle if failed.is_empty() && waiting.is_empty() => {
                RunStatus::Completed
            }
            FinalizeReason::Idle => RunStatus::Partial,
        };

        state.record_event(ExecutionEvent::new(
            ExecutionEventKind::SessionFinalized {
                completed: completed.clone(),
                failed: failed.clone(),
                waiting: waiting.clone(),
            },
            format!(
                "{} completed, {} failed, {} waiting",
                completed.len(),
                failed.len(),
                waiting.len()
            ),
        ));

        let session_id = state.ensure_session();
        tracing::info!(
            session_id = %session_id,
            subsystem = %subsystem,
            status = ?status,
            steps,
            completed = completed.len(),
            failed = failed.len(),
            waiting = waiting.len(),
            "Orchestration session finalized"
        );

        Ok(RunReport {
            session_id,
            subsystem,
            status,
            completed,
            failed,
            waiting,
            steps,
            state,
        })
    }
}

impl Default for OrchestrationEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl std::fmt::Debug for OrchestrationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrchestrationEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
