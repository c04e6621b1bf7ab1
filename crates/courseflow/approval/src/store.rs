//! Workflow persistence
//!
//! Workflows are saved whole after every mutation. Stores only see the
//! serialized event log; the projection is rebuilt on load.

use crate::{ApprovalWorkflow, StoreError, StoreResult};
use async_trait::async_trait;
use courseflow_types::CourseId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

/// Persistence backend for approval workflows
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Insert or replace the workflow of its course
    async fn save(&self, workflow: &ApprovalWorkflow) -> StoreResult<()>;

    async fn load(&self, course_id: &CourseId) -> StoreResult<Option<ApprovalWorkflow>>;

    /// Course ids with a stored workflow, sorted
    async fn list(&self) -> StoreResult<Vec<CourseId>>;
}

// ── In-memory store ──────────────────────────────────────────────────

/// Volatile store for tests and single-process runs
#[derive(Debug, Default)]
pub struct InMemoryWorkflowStore {
    workflows: RwLock<HashMap<CourseId, ApprovalWorkflow>>,
}

impl InMemoryWorkflowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn save(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        self.workflows
            .write()
            .await
            .insert(workflow.course_id().clone(), workflow.clone());
        Ok(())
    }

    async fn load(&self, course_id: &CourseId) -> StoreResult<Option<ApprovalWorkflow>> {
        Ok(self.workflows.read().await.get(course_id).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<CourseId>> {
        let mut ids: Vec<CourseId> = self.workflows.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

// ── File store ───────────────────────────────────────────────────────

/// One pretty-printed JSON file per course under a directory.
///
/// Writes go to a temp file that is then renamed over the target.
#[derive(Debug, Clone)]
pub struct FileWorkflowStore {
    root: PathBuf,
}

impl FileWorkflowStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, course_id: &CourseId) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(course_id)))
    }
}

/// Hex of the id bytes: flat, and distinct ids never share a file
fn file_stem(course_id: &CourseId) -> String {
    hex::encode(course_id.as_str())
}

#[async_trait]
impl WorkflowStore for FileWorkflowStore {
    async fn save(&self, workflow: &ApprovalWorkflow) -> StoreResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.path_for(workflow.course_id());
        let bytes = serde_json::to_vec_pretty(workflow)?;
        let tmp_path = path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, bytes).await?;
        tokio::fs::rename(&tmp_path, &path).await?;

        tracing::debug!(
            course_id = %workflow.course_id(),
            path = %path.display(),
            "Workflow saved"
        );
        Ok(())
    }

    async fn load(&self, course_id: &CourseId) -> StoreResult<Option<ApprovalWorkflow>> {
        let path = self.path_for(course_id);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let workflow: ApprovalWorkflow = serde_json::from_slice(&bytes)?;
        if workflow.course_id() != course_id {
            return Err(StoreError::Backend(format!(
                "{} holds workflow for course '{}'",
                path.display(),
                workflow.course_id()
            )));
        }
        Ok(Some(workflow))
    }

    async fn list(&self) -> StoreResult<Vec<CourseId>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            let workflow: ApprovalWorkflow = serde_json::from_slice(&bytes)?;
            ids.push(workflow.course_id().clone());
        }
        ids.sort();
        Ok(ids)
    }
}
