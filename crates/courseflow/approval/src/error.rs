use crate::{Gate, Stage};
use courseflow_engine::EngineError;
use courseflow_types::CourseId;
use thiserror::Error;

/// Workflow persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Workflow serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Workflow store IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workflow store backend error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Approval workflow errors
#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Cannot {operation} at stage {actual}; expected one of: {}", format_stages(.expected))]
    InvalidStage {
        operation: &'static str,
        expected: Vec<Stage>,
        actual: Stage,
    },

    #[error("Edit at the {0} gate requires edits")]
    MissingEdits(Gate),

    #[error("No draft to approve at the {0} gate")]
    MissingDraft(Gate),

    #[error("Unknown approval action: {0}")]
    UnknownAction(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(CourseId),

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
}

fn format_stages(stages: &[Stage]) -> String {
    stages
        .iter()
        .map(|s| s.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

pub type ApprovalResult<T> = Result<T, ApprovalError>;
