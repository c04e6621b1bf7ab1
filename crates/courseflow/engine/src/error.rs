use courseflow_types::ServiceId;
use thiserror::Error;

/// Errors raised by the engine itself (registry misuse, lock failures).
///
/// Failures inside a service are [`ServiceError`]s and are captured into
/// the execution state instead of being propagated.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Service not found: {0}")]
    ServiceNotFound(ServiceId),

    #[error("Invalid service registration: {0}")]
    InvalidRegistration(String),

    #[error("Service '{service}' depends on unregistered service '{dependency}'")]
    UnknownDependency {
        service: ServiceId,
        dependency: ServiceId,
    },

    #[error("Dependency cycle detected: {}", format_cycle(.0))]
    DependencyCycle(Vec<ServiceId>),

    #[error("Registry lock poisoned")]
    LockPoisoned,
}

fn format_cycle(cycle: &[ServiceId]) -> String {
    cycle
        .iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Failure of a single service invocation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    Failed(String),

    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input '{key}': {reason}")]
    InvalidInput { key: String, reason: String },

    #[error("Timed out after {0} ms")]
    Timeout(u64),

    #[error("Cancelled")]
    Cancelled,
}

impl ServiceError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_input(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
