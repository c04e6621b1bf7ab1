//! Typed orchestration requests
//!
//! Each variant names its subsystem, so routing never has to guess the
//! target from whichever keys happen to be present.

use courseflow_types::{keys, CourseId, ExecutionState, LearnerId, Subsystem};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Entry request for one orchestration run
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "subsystem", rename_all = "snake_case")]
pub enum OrchestrationRequest {
    Content {
        course_id: CourseId,
        content_source: Value,
        #[serde(default)]
        inputs: Map<String, Value>,
    },
    Learner {
        course_id: CourseId,
        learner_id: LearnerId,
        #[serde(default)]
        inputs: Map<String, Value>,
    },
    Review {
        course_id: CourseId,
        review_target: Value,
        #[serde(default)]
        inputs: Map<String, Value>,
    },
    Metrics {
        course_id: CourseId,
        metrics_scope: Value,
        #[serde(default)]
        inputs: Map<String, Value>,
    },
}

impl OrchestrationRequest {
    pub fn content(course_id: impl Into<CourseId>, content_source: Value) -> Self {
        Self::Content {
            course_id: course_id.into(),
            content_source,
            inputs: Map::new(),
        }
    }

    pub fn learner(course_id: impl Into<CourseId>, learner_id: impl Into<LearnerId>) -> Self {
        Self::Learner {
            course_id: course_id.into(),
            learner_id: learner_id.into(),
            inputs: Map::new(),
        }
    }

    pub fn review(course_id: impl Into<CourseId>, review_target: Value) -> Self {
        Self::Review {
            course_id: course_id.into(),
            review_target,
            inputs: Map::new(),
        }
    }

    pub fn metrics(course_id: impl Into<CourseId>, metrics_scope: Value) -> Self {
        Self::Metrics {
            course_id: course_id.into(),
            metrics_scope,
            inputs: Map::new(),
        }
    }

    /// Add an extra input key seeded into the initial state
    pub fn with_input(mut self, key: impl Into<String>, value: Value) -> Self {
        match &mut self {
            Self::Content { inputs, .. }
            | Self::Learner { inputs, .. }
            | Self::Review { inputs, .. }
            | Self::Metrics { inputs, .. } => {
                inputs.insert(key.into(), value);
            }
        }
        self
    }

    pub fn subsystem(&self) -> Subsystem {
        match self {
            Self::Content { .. } => Subsystem::Content,
            Self::Learner { .. } => Subsystem::Learner,
            Self::Review { .. } => Subsystem::Review,
            Self::Metrics { .. } => Subsystem::Metrics,
        }
    }

    pub fn course_id(&self) -> &CourseId {
        match self {
            Self::Content { course_id, .. }
            | Self::Learner { course_id, .. }
            | Self::Review { course_id, .. }
            | Self::Metrics { course_id, .. } => course_id,
        }
    }

    /// Build the initial execution state.
    ///
    /// Extra inputs are applied first so the typed fields always win.
    pub fn into_state(self) -> ExecutionState {
        let mut state = ExecutionState::new();
        let (course_id, inputs, typed) = match self {
            Self::Content {
                course_id,
                content_source,
                inputs,
            } => (course_id, inputs, (keys::CONTENT_SOURCE, content_source)),
            Self::Learner {
                course_id,
                learner_id,
                inputs,
            } => (
                course_id,
                inputs,
                (keys::LEARNER_ID, Value::String(learner_id.as_str().to_string())),
            ),
            Self::Review {
                course_id,
                review_target,
                inputs,
            } => (course_id, inputs, (keys::REVIEW_TARGET, review_target)),
            Self::Metrics {
                course_id,
                metrics_scope,
                inputs,
            } => (course_id, inputs, (keys::METRICS_SCOPE, metrics_scope)),
        };

        for (key, value) in inputs {
            state.insert(key, value);
        }
        state.insert(keys::COURSE_ID, Value::String(course_id.as_str().to_string()));
        state.insert(typed.0, typed.1);
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subsystem_is_explicit() {
        let req = OrchestrationRequest::learner("c1", "l1");
        assert_eq!(req.subsystem(), Subsystem::Learner);
        assert_eq!(req.course_id().as_str(), "c1");
    }

    #[test]
    fn test_into_state_seeds_keys() {
        let state = OrchestrationRequest::content("c1", json!({"url": "s3://x"}))
            .with_input(keys::COURSE_METADATA, json!({"title": "Algebra"}))
            .with_input(keys::COURSE_ID, json!("ignored"))
            .into_state();

        assert_eq!(state.get(keys::COURSE_ID), Some(&json!("c1")));
        assert_eq!(state.get(keys::CONTENT_SOURCE), Some(&json!({"url": "s3://x"})));
        assert_eq!(
            state.get(keys::COURSE_METADATA),
            Some(&json!({"title": "Algebra"}))
        );
        assert!(state.session_id.is_none());
    }

    #[test]
    fn test_tagged_serde() {
        let req: OrchestrationRequest = serde_json::from_value(json!({
            "subsystem": "metrics",
            "course_id": "c9",
            "metrics_scope": "weekly"
        }))
        .unwrap();
        assert_eq!(req.subsystem(), Subsystem::Metrics);
        assert_eq!(
            req.into_state().get(keys::METRICS_SCOPE),
            Some(&json!("weekly"))
        );
    }
}
