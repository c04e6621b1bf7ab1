//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Limits applied to every orchestration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum Execute/Bridge steps per run before the loop is finalized
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Attempts allowed per service; ERROR services are retried until spent
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Deadline for services whose descriptor carries no timeout
    #[serde(default = "default_service_timeout_ms")]
    pub default_service_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            max_attempts: default_max_attempts(),
            default_service_timeout_ms: default_service_timeout_ms(),
        }
    }
}

impl EngineConfig {
    pub fn default_service_timeout(&self) -> Duration {
        Duration::from_millis(self.default_service_timeout_ms)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_service_timeout_ms = timeout.as_millis() as u64;
        self
    }
}

fn default_max_steps() -> usize {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_service_timeout_ms() -> u64 {
    30_000
}
