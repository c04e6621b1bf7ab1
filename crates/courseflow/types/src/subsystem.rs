//! Subsystems: named groupings of related services

use crate::{ServiceId, TypesError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Logical subsystem a service belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    /// Content ingestion, structuring and graph generation
    Content,
    /// Learner-facing personalization
    Learner,
    /// Review and quality checks
    Review,
    /// Metrics and analytics
    Metrics,
}

impl Subsystem {
    pub const ALL: [Subsystem; 4] = [
        Subsystem::Content,
        Subsystem::Learner,
        Subsystem::Review,
        Subsystem::Metrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subsystem::Content => "content",
            Subsystem::Learner => "learner",
            Subsystem::Review => "review",
            Subsystem::Metrics => "metrics",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Subsystem {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "content" => Ok(Subsystem::Content),
            "learner" => Ok(Subsystem::Learner),
            "review" => Ok(Subsystem::Review),
            "metrics" => Ok(Subsystem::Metrics),
            other => Err(TypesError::UnknownSubsystem(other.to_string())),
        }
    }
}

/// Services registered under one subsystem tag.
///
/// Built incrementally as services register. Member order is registration
/// order; entry points are the members that declare no dependencies.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemDescriptor {
    pub subsystem: Subsystem,
    pub services: Vec<ServiceId>,
    pub entry_points: Vec<ServiceId>,
}

impl SubsystemDescriptor {
    pub fn new(subsystem: Subsystem) -> Self {
        Self {
            subsystem,
            services: Vec::new(),
            entry_points: Vec::new(),
        }
    }

    /// Add or re-add a member. Re-adding keeps the original position and
    /// only refreshes entry-point membership.
    pub fn add_service(&mut self, id: ServiceId, is_entry_point: bool) {
        if !self.services.contains(&id) {
            self.services.push(id.clone());
        }
        let listed = self.entry_points.contains(&id);
        if is_entry_point && !listed {
            self.entry_points.push(id);
        } else if !is_entry_point && listed {
            self.entry_points.retain(|e| e != &id);
        }
    }

    pub fn remove_service(&mut self, id: &ServiceId) {
        self.services.retain(|s| s != id);
        self.entry_points.retain(|s| s != id);
    }

    pub fn contains(&self, id: &ServiceId) -> bool {
        self.services.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
