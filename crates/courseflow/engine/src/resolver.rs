//! Executability resolver: answers "can this service run now?"
//!
//! Pure functions over a registry and an execution state. Nothing here
//! mutates either; the routing engine acts on the answers.

use crate::{EngineConfig, EngineError, EngineResult, ServiceRegistry};
use courseflow_types::{ExecutionState, ServiceId, ServiceStatus, Subsystem};
use serde::{Deserialize, Serialize};

/// Why a service cannot run yet
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationReason {
    UnknownService { service_id: ServiceId },
    MissingDependencies { dependencies: Vec<ServiceId> },
    MissingInputs { inputs: Vec<String> },
}

impl std::fmt::Display for ValidationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationReason::UnknownService { service_id } => {
                write!(f, "Service '{}' is not registered", service_id)
            }
            ValidationReason::MissingDependencies { dependencies } => write!(
                f,
                "Missing dependencies: {}",
                dependencies
                    .iter()
                    .map(|d| d.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            ValidationReason::MissingInputs { inputs } => {
                write!(f, "Missing required inputs: {}", inputs.join(", "))
            }
        }
    }
}

/// Answer of [`ExecutabilityResolver::can_execute`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Executability {
    Ready,
    Blocked(ValidationReason),
}

impl Executability {
    pub fn is_ready(&self) -> bool {
        matches!(self, Executability::Ready)
    }

    /// Human-readable reason; empty when ready
    pub fn reason(&self) -> String {
        match self {
            Executability::Ready => String::new(),
            Executability::Blocked(reason) => reason.to_string(),
        }
    }
}

/// Dependency and input checks over a registry
#[derive(Clone, Copy, Debug)]
pub struct ExecutabilityResolver<'a> {
    registry: &'a ServiceRegistry,
    max_attempts: u32,
}

impl<'a> ExecutabilityResolver<'a> {
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self {
            registry,
            max_attempts: EngineConfig::default().max_attempts,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Whether every dependency is COMPLETED; lists all that are not
    pub fn dependencies_satisfied(
        &self,
        service_id: &ServiceId,
        state: &ExecutionState,
    ) -> EngineResult<(bool, Vec<ServiceId>)> {
        let descriptor = self.registry.descriptor(service_id)?;
        let missing: Vec<ServiceId> = descriptor
            .dependencies
            .iter()
            .filter(|dep| state.status_of(dep) != ServiceStatus::Completed)
            .cloned()
            .collect();
        Ok((missing.is_empty(), missing))
    }

    /// Dependencies satisfied and every required input present and non-null.
    ///
    /// Reports the first failing cause class: dependencies before inputs.
    pub fn can_execute(&self, service_id: &ServiceId, state: &ExecutionState) -> Executability {
        let (satisfied, missing) = match self.dependencies_satisfied(service_id, state) {
            Ok(check) => check,
            Err(EngineError::ServiceNotFound(id)) => {
                return Executability::Blocked(ValidationReason::UnknownService { service_id: id })
            }
            Err(_) => {
                return Executability::Blocked(ValidationReason::UnknownService {
                    service_id: service_id.clone(),
                })
            }
        };
        if !satisfied {
            return Executability::Blocked(ValidationReason::MissingDependencies {
                dependencies: missing,
            });
        }

        let missing_inputs: Vec<String> = match self.registry.descriptor(service_id) {
            Ok(descriptor) => descriptor
                .required_inputs
                .iter()
                .filter(|key| !state.has_input(key))
                .cloned()
                .collect(),
            Err(_) => Vec::new(),
        };
        if !missing_inputs.is_empty() {
            return Executability::Blocked(ValidationReason::MissingInputs {
                inputs: missing_inputs,
            });
        }

        Executability::Ready
    }

    /// Services that may run now, in registration order.
    ///
    /// A service is ready when it can execute and its status is NOT_STARTED,
    /// WAITING (blocked by an earlier run), or ERROR with attempts left.
    pub fn ready_services(
        &self,
        state: &ExecutionState,
        subsystem: Option<Subsystem>,
    ) -> Vec<ServiceId> {
        self.registry
            .list()
            .into_iter()
            .filter(|d| subsystem.map_or(true, |s| d.subsystem == s))
            .filter(|d| self.is_status_eligible(&d.id, state))
            .filter(|d| self.can_execute(&d.id, state).is_ready())
            .map(|d| d.id.clone())
            .collect()
    }

    fn is_status_eligible(&self, service_id: &ServiceId, state: &ExecutionState) -> bool {
        match state.status_of(service_id) {
            ServiceStatus::Error => state.attempts(service_id) < self.max_attempts,
            status => status.is_retry_eligible(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FnService, Service, ServiceOutput};
    use courseflow_types::ServiceDescriptor;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn service(descriptor: ServiceDescriptor) -> Arc<dyn Service> {
        Arc::new(FnService::new(descriptor, |_: &ExecutionState| {
            Ok(ServiceOutput::new())
        }))
    }

    fn registry_ab() -> ServiceRegistry {
        let mut registry = ServiceRegistry::new();
        registry
            .register(service(ServiceDescriptor::new(
                "A",
                Subsystem::Content,
                "A",
            )))
            .unwrap();
        registry
            .register(service(
                ServiceDescriptor::new("B", Subsystem::Content, "B").depends_on("A"),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_ready_services_follow_dependencies() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry);
        let mut state = ExecutionState::new();

        assert_eq!(resolver.ready_services(&state, None), vec![ServiceId::new("A")]);

        state.set_status(&ServiceId::new("A"), ServiceStatus::Completed);
        assert_eq!(resolver.ready_services(&state, None), vec![ServiceId::new("B")]);
    }

    #[test]
    fn test_dependencies_lists_every_missing() {
        let mut registry = registry_ab();
        registry
            .register(service(
                ServiceDescriptor::new("C", Subsystem::Content, "C")
                    .depends_on("A")
                    .depends_on("B"),
            ))
            .unwrap();
        let resolver = ExecutabilityResolver::new(&registry);

        let (ok, missing) = resolver
            .dependencies_satisfied(&ServiceId::new("C"), &ExecutionState::new())
            .unwrap();
        assert!(!ok);
        assert_eq!(missing, vec![ServiceId::new("A"), ServiceId::new("B")]);
    }

    #[test]
    fn test_dependencies_of_unknown_service() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry);
        let result = resolver.dependencies_satisfied(&ServiceId::new("Z"), &ExecutionState::new());
        assert!(matches!(result, Err(EngineError::ServiceNotFound(_))));
    }

    #[test]
    fn test_can_execute_reports_inputs_after_dependencies() {
        let mut registry = ServiceRegistry::new();
        registry
            .register(service(
                ServiceDescriptor::new("lo", Subsystem::Content, "LO")
                    .depends_on("chunker")
                    .requires("chunks"),
            ))
            .unwrap();
        let resolver = ExecutabilityResolver::new(&registry);
        let id = ServiceId::new("lo");

        let mut state = ExecutionState::new();
        let answer = resolver.can_execute(&id, &state);
        assert!(matches!(
            answer,
            Executability::Blocked(ValidationReason::MissingDependencies { .. })
        ));
        assert!(answer.reason().contains("chunker"));

        state.set_status(&ServiceId::new("chunker"), ServiceStatus::Completed);
        let answer = resolver.can_execute(&id, &state);
        assert!(matches!(
            answer,
            Executability::Blocked(ValidationReason::MissingInputs { .. })
        ));
        assert!(answer.reason().contains("chunks"));

        state.insert("chunks", Value::Null);
        assert!(!resolver.can_execute(&id, &state).is_ready());

        state.insert("chunks", json!(["c1"]));
        assert!(resolver.can_execute(&id, &state).is_ready());
    }

    #[test]
    fn test_can_execute_unknown_service() {
        let registry = ServiceRegistry::new();
        let resolver = ExecutabilityResolver::new(&registry);
        let answer = resolver.can_execute(&ServiceId::new("ghost"), &ExecutionState::new());
        assert!(answer.reason().contains("ghost"));
    }

    #[test]
    fn test_error_services_retry_until_attempts_spent() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry).with_max_attempts(2);
        let a = ServiceId::new("A");
        let mut state = ExecutionState::new();

        state.set_status(&a, ServiceStatus::Error);
        state.record_attempt(&a);
        assert_eq!(resolver.ready_services(&state, None), vec![a.clone()]);

        state.record_attempt(&a);
        assert!(resolver.ready_services(&state, None).is_empty());
    }

    #[test]
    fn test_in_progress_not_ready() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry);
        let mut state = ExecutionState::new();
        state.set_status(&ServiceId::new("A"), ServiceStatus::InProgress);
        assert!(resolver.ready_services(&state, None).is_empty());
    }

    #[test]
    fn test_waiting_service_ready_once_unblocked() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry);
        let mut state = ExecutionState::new();
        state.set_status(&ServiceId::new("B"), ServiceStatus::Waiting);
        assert_eq!(resolver.ready_services(&state, None), vec![ServiceId::new("A")]);

        state.set_status(&ServiceId::new("A"), ServiceStatus::Completed);
        assert_eq!(resolver.ready_services(&state, None), vec![ServiceId::new("B")]);
    }

    #[test]
    fn test_subsystem_filter() {
        let mut registry = registry_ab();
        registry
            .register(service(ServiceDescriptor::new(
                "M",
                Subsystem::Metrics,
                "M",
            )))
            .unwrap();
        let resolver = ExecutabilityResolver::new(&registry);
        let state = ExecutionState::new();

        assert_eq!(
            resolver.ready_services(&state, Some(Subsystem::Metrics)),
            vec![ServiceId::new("M")]
        );
        assert_eq!(
            resolver.ready_services(&state, None),
            vec![ServiceId::new("A"), ServiceId::new("M")]
        );
    }

    #[test]
    fn test_resolver_does_not_mutate_state() {
        let registry = registry_ab();
        let resolver = ExecutabilityResolver::new(&registry);
        let state = ExecutionState::new();
        let before = state.clone();
        let _ = resolver.ready_services(&state, None);
        let _ = resolver.can_execute(&ServiceId::new("B"), &state);
        assert_eq!(state, before);
    }
}
