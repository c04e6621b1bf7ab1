//! Service descriptors: the immutable contract of a unit of work
//!
//! A descriptor says what a service needs (dependencies, required inputs)
//! and what it produces (provided outputs). It says nothing about how the
//! work is done.

use crate::{ServiceId, Subsystem, TypesError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::str::FromStr;
use std::time::Duration;

// ── Service Status ───────────────────────────────────────────────────

/// Execution status of a service within one run
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    #[default]
    NotStarted,
    Waiting,
    InProgress,
    Completed,
    Error,
}

impl ServiceStatus {
    /// Statuses from which a service may be (re)started
    pub fn is_retry_eligible(&self) -> bool {
        matches!(
            self,
            ServiceStatus::NotStarted | ServiceStatus::Waiting | ServiceStatus::Error
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::NotStarted => "NOT_STARTED",
            ServiceStatus::Waiting => "WAITING",
            ServiceStatus::InProgress => "IN_PROGRESS",
            ServiceStatus::Completed => "COMPLETED",
            ServiceStatus::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(ServiceStatus::NotStarted),
            "WAITING" => Ok(ServiceStatus::Waiting),
            "IN_PROGRESS" => Ok(ServiceStatus::InProgress),
            "COMPLETED" => Ok(ServiceStatus::Completed),
            "ERROR" => Ok(ServiceStatus::Error),
            other => Err(TypesError::UnknownStatus(other.to_string())),
        }
    }
}

// ── Service Descriptor ───────────────────────────────────────────────

/// Immutable description of a service
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Unique identifier
    pub id: ServiceId,
    /// Owning subsystem
    pub subsystem: Subsystem,
    /// Human-readable name
    pub name: String,
    /// What this service does
    #[serde(default)]
    pub description: String,
    /// Services that must be COMPLETED before this one may run
    #[serde(default)]
    pub dependencies: BTreeSet<ServiceId>,
    /// State keys that must be present and non-null
    #[serde(default)]
    pub required_inputs: BTreeSet<String>,
    /// State keys this service writes
    #[serde(default)]
    pub provided_outputs: BTreeSet<String>,
    /// Execution deadline; the engine default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
}

impl ServiceDescriptor {
    pub fn new(id: impl Into<ServiceId>, subsystem: Subsystem, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            subsystem,
            name: name.into(),
            description: String::new(),
            dependencies: BTreeSet::new(),
            required_inputs: BTreeSet::new(),
            provided_outputs: BTreeSet::new(),
            timeout: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn depends_on(mut self, service: impl Into<ServiceId>) -> Self {
        self.dependencies.insert(service.into());
        self
    }

    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.required_inputs.insert(key.into());
        self
    }

    pub fn provides(mut self, key: impl Into<String>) -> Self {
        self.provided_outputs.insert(key.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// A service with no dependencies is an entry point of its subsystem
    pub fn is_entry_point(&self) -> bool {
        self.dependencies.is_empty()
    }

    pub fn provides_key(&self, key: &str) -> bool {
        self.provided_outputs.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let desc = ServiceDescriptor::new("content.lo", Subsystem::Content, "LO Extractor")
            .with_description("Extracts learning objectives")
            .depends_on("content.chunker")
            .requires("chunks")
            .provides("learningObjectives")
            .with_timeout(Duration::from_secs(5));

        assert_eq!(desc.id, ServiceId::new("content.lo"));
        assert!(!desc.is_entry_point());
        assert!(desc.provides_key("learningObjectives"));
        assert_eq!(desc.timeout, Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_status_roundtrip_strings() {
        for status in [
            ServiceStatus::NotStarted,
            ServiceStatus::Waiting,
            ServiceStatus::InProgress,
            ServiceStatus::Completed,
            ServiceStatus::Error,
        ] {
            assert_eq!(status.as_str().parse::<ServiceStatus>().unwrap(), status);
        }
        assert!("DONE".parse::<ServiceStatus>().is_err());
    }

    #[test]
    fn test_retry_eligibility() {
        assert!(ServiceStatus::NotStarted.is_retry_eligible());
        assert!(ServiceStatus::Error.is_retry_eligible());
        assert!(ServiceStatus::Waiting.is_retry_eligible());
        assert!(!ServiceStatus::InProgress.is_retry_eligible());
        assert!(!ServiceStatus::Completed.is_retry_eligible());
    }
}
