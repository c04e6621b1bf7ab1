//! Faculty workflow coordinator - entry points over the approval workflow.
//!
//! The coordinator owns one lock per course. A decision, the batch run it
//! triggers and the resulting draft are applied to a copy of the workflow
//! under that lock; the copy is saved and only then replaces the in-memory
//! workflow, so a failed save changes nothing.

use std::sync::Arc;

use async_trait::async_trait;
use courseflow_engine::{EngineResult, OrchestrationEngine, RunReport, RunStatus};
use courseflow_types::{
    keys, CourseId, ExecutionState, FacultyId, LearnerId, ServiceId, SessionId, Subsystem,
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::{
    ApprovalAction, ApprovalError, ApprovalRecord, ApprovalResult, ApprovalWorkflow, Gate, Stage,
    WorkflowStore,
};

// ── Runner ───────────────────────────────────────────────────────────

/// Runs a batch of services for the coordinator
#[async_trait]
pub trait WorkflowRunner: Send + Sync {
    async fn run_batch(
        &self,
        subsystem: Subsystem,
        state: ExecutionState,
        cancellation: CancellationToken,
    ) -> EngineResult<RunReport>;
}

#[async_trait]
impl WorkflowRunner for OrchestrationEngine {
    async fn run_batch(
        &self,
        subsystem: Subsystem,
        state: ExecutionState,
        cancellation: CancellationToken,
    ) -> EngineResult<RunReport> {
        self.run_state(subsystem, state, cancellation).await
    }
}

// ── Batch table ──────────────────────────────────────────────────────

/// Generation run that follows an approval
#[derive(Debug)]
struct BatchSpec {
    /// Gate whose approved artifact seeds the run
    source: Gate,
    /// Gate that receives the generated draft
    target: Gate,
    subsystem: Subsystem,
    /// Key the whole approved artifact is stored under; `None` spreads
    /// the approved content of an object seed
    seed_key: Option<&'static str>,
    /// Key read back from the run as the draft
    draft_key: &'static str,
}

static BATCHES: [BatchSpec; 3] = [
    BatchSpec {
        source: Gate::CourseInitialization,
        target: Gate::LearningObjectives,
        subsystem: Subsystem::Content,
        seed_key: None,
        draft_key: keys::LEARNING_OBJECTIVES,
    },
    BatchSpec {
        source: Gate::LearningObjectives,
        target: Gate::Structure,
        subsystem: Subsystem::Content,
        seed_key: Some(keys::FACD),
        draft_key: keys::COURSE_STRUCTURE,
    },
    BatchSpec {
        source: Gate::Structure,
        target: Gate::KnowledgeGraph,
        subsystem: Subsystem::Content,
        seed_key: Some(keys::FCCS),
        draft_key: keys::KNOWLEDGE_GRAPH,
    },
];

fn batch_after(gate: Gate) -> Option<&'static BatchSpec> {
    BATCHES.iter().find(|b| b.source == gate)
}

/// Batch that produces the draft the workflow is currently waiting for
fn batch_for_stage(stage: Stage) -> Option<&'static BatchSpec> {
    BATCHES
        .iter()
        .find(|b| b.target.spec().draft_from.contains(&stage))
}

// ── Requests and responses ───────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartWorkflowRequest {
    pub course_id: CourseId,
    pub faculty_id: FacultyId,
    pub content_source: Value,
    #[serde(default)]
    pub course_metadata: Value,
}

/// A faculty decision on the pending draft
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FacultyAction {
    pub action: ApprovalAction,
    pub actor: FacultyId,
    #[serde(default)]
    pub edits: Option<Value>,
    #[serde(default)]
    pub comments: Option<String>,
}

impl FacultyAction {
    pub fn approve(actor: impl Into<FacultyId>) -> Self {
        Self::new(ApprovalAction::Approve, actor)
    }

    pub fn edit(actor: impl Into<FacultyId>, edits: Value) -> Self {
        Self {
            edits: Some(edits),
            ..Self::new(ApprovalAction::Edit, actor)
        }
    }

    pub fn reject(actor: impl Into<FacultyId>, comments: impl Into<String>) -> Self {
        Self {
            comments: Some(comments.into()),
            ..Self::new(ApprovalAction::Reject, actor)
        }
    }

    fn new(action: ApprovalAction, actor: impl Into<FacultyId>) -> Self {
        Self {
            action,
            actor: actor.into(),
            edits: None,
            comments: None,
        }
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }
}

/// Outcome class of an entry-point call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// A draft waits for a faculty decision
    AwaitingFacultyApproval,
    /// Edits replaced the draft; it needs approving again
    ResubmissionRequired,
    /// The draft was rejected; call `regenerate`
    RegenerationRequired,
    /// The draft was rejected and no batch produces it; resubmit it with
    /// an edit, then approve
    RevisionRequired,
    /// The follow-up batch produced no draft; call `regenerate`
    GenerationFailed,
    /// All gates passed; learners may request trees
    ReadyForPltGeneration,
    /// A personalized learning tree was produced
    PltGenerated,
}

/// Summary of a batch run attached to a response
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub session_id: SessionId,
    pub subsystem: Subsystem,
    pub status: RunStatus,
    pub completed: Vec<ServiceId>,
    pub failed: Vec<ServiceId>,
    pub waiting: Vec<ServiceId>,
}

impl From<&RunReport> for BatchSummary {
    fn from(report: &RunReport) -> Self {
        Self {
            session_id: report.session_id.clone(),
            subsystem: report.subsystem,
            status: report.status,
            completed: report.completed.clone(),
            failed: report.failed.clone(),
            waiting: report.waiting.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub status: WorkflowStatus,
    pub course_id: CourseId,
    pub stage: Stage,
    pub next_action_required: String,
    /// Data the faculty UI renders for the next decision
    pub ui_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<BatchSummary>,
}

/// Which artifacts a workflow holds
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactFlags {
    pub course_initialization: bool,
    pub facd: bool,
    pub fccs: bool,
    pub ffcs: bool,
    /// A draft is waiting at the current gate
    pub pending_draft: bool,
}

/// Answer of [`FacultyWorkflowCoordinator::get_workflow_status`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatusSummary {
    pub course_id: CourseId,
    pub faculty_id: FacultyId,
    pub stage: Stage,
    pub next_action_required: String,
    pub history_len: usize,
    pub last_record: Option<ApprovalRecord>,
    pub artifacts: ArtifactFlags,
    pub can_generate_plt: bool,
}

// ── Coordinator ──────────────────────────────────────────────────────

/// Entry points for faculty and learners
pub struct FacultyWorkflowCoordinator {
    runner: Arc<dyn WorkflowRunner>,
    store: Arc<dyn WorkflowStore>,
    workflows: DashMap<CourseId, Arc<Mutex<ApprovalWorkflow>>>,
    creation: Mutex<()>,
    shutdown: CancellationToken,
}

impl FacultyWorkflowCoordinator {
    pub fn new(runner: Arc<dyn WorkflowRunner>, store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            runner,
            store,
            workflows: DashMap::new(),
            creation: Mutex::new(()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancel in-flight batch runs
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    pub fn store(&self) -> &Arc<dyn WorkflowStore> {
        &self.store
    }

    /// Course ids known to memory or the store
    pub async fn list_workflows(&self) -> ApprovalResult<Vec<CourseId>> {
        let mut ids = self.store.list().await?;
        ids.extend(self.workflows.iter().map(|e| e.key().clone()));
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    /// Snapshot of a course's workflow
    pub async fn workflow(&self, course_id: &CourseId) -> ApprovalResult<ApprovalWorkflow> {
        let handle = self.handle(course_id).await?;
        let workflow = handle.lock().await;
        Ok(workflow.clone())
    }

    /// Create the workflow for a course, or return the existing one
    #[instrument(skip(self, request), fields(course_id = %request.course_id))]
    pub async fn start_workflow(
        &self,
        request: StartWorkflowRequest,
    ) -> ApprovalResult<WorkflowResponse> {
        let creation = self.creation.lock().await;

        if let Some(handle) = self.cached(&request.course_id) {
            // A batch run may hold the course lock; never wait on it under the creation lock
            drop(creation);
            let workflow = handle.lock().await;
            return Ok(status_response(&workflow));
        }

        if let Some(workflow) = self.store.load(&request.course_id).await? {
            info!(stage = %workflow.current_stage(), "Workflow restored from store");
            let response = status_response(&workflow);
            self.workflows
                .insert(request.course_id.clone(), Arc::new(Mutex::new(workflow)));
            return Ok(response);
        }

        let draft = json!({
            (keys::COURSE_ID): request.course_id.as_str(),
            (keys::FACULTY_ID): request.faculty_id.as_str(),
            (keys::CONTENT_SOURCE): request.content_source,
            (keys::COURSE_METADATA): request.course_metadata,
        });
        let workflow = ApprovalWorkflow::with_course_initialization(
            request.course_id.clone(),
            request.faculty_id.clone(),
            draft,
        );
        self.store.save(&workflow).await?;

        info!(faculty_id = %request.faculty_id, "Workflow started");
        let response = response(&workflow, WorkflowStatus::AwaitingFacultyApproval, None);
        self.workflows
            .insert(request.course_id, Arc::new(Mutex::new(workflow)));
        Ok(response)
    }

    /// Apply a faculty decision at the current gate.
    ///
    /// After an approval the follow-up batch runs and its output becomes
    /// the next draft, all under the course lock.
    #[instrument(skip(self, action), fields(course_id = %course_id, action = %action.action))]
    pub async fn faculty_action(
        &self,
        course_id: &CourseId,
        action: FacultyAction,
    ) -> ApprovalResult<WorkflowResponse> {
        let handle = self.handle(course_id).await?;
        let mut current = handle.lock().await;

        let mut next = current.clone();
        let record = next
            .decide(action.action, action.actor, action.edits, action.comments)?
            .clone();

        let (status, run) = match record.action {
            ApprovalAction::Edit => (WorkflowStatus::ResubmissionRequired, None),
            ApprovalAction::Reject => (rejected_status(next.current_stage()), None),
            ApprovalAction::Approve => match batch_after(record.gate) {
                Some(batch) => {
                    if next.current_stage() == Stage::CourseApproved {
                        next.begin_content_processing()?;
                    }
                    self.generate(&mut next, batch, None).await?
                }
                None => (WorkflowStatus::ReadyForPltGeneration, None),
            },
        };

        self.commit(&mut current, next).await?;
        info!(
            stage = %current.current_stage(),
            result = %record.result,
            status = ?status,
            "Faculty action applied"
        );
        Ok(response(&current, status, run))
    }

    /// Rerun the batch for the draft the course is waiting on
    #[instrument(skip(self, comments), fields(course_id = %course_id))]
    pub async fn regenerate(
        &self,
        course_id: &CourseId,
        comments: Option<String>,
    ) -> ApprovalResult<WorkflowResponse> {
        let handle = self.handle(course_id).await?;
        let mut current = handle.lock().await;

        let stage = current.current_stage();
        let batch = batch_for_stage(stage).ok_or_else(|| ApprovalError::InvalidStage {
            operation: "regenerate",
            expected: BATCHES
                .iter()
                .flat_map(|b| b.target.spec().draft_from.iter().copied())
                .collect(),
            actual: stage,
        })?;

        let mut next = current.clone();
        if next.current_stage() == Stage::CourseApproved {
            next.begin_content_processing()?;
        }
        let (status, run) = self.generate(&mut next, batch, comments).await?;

        self.commit(&mut current, next).await?;
        Ok(response(&current, status, run))
    }

    /// Summary of a course's workflow
    pub async fn get_workflow_status(
        &self,
        course_id: &CourseId,
    ) -> ApprovalResult<WorkflowStatusSummary> {
        let handle = self.handle(course_id).await?;
        let workflow = handle.lock().await;
        Ok(WorkflowStatusSummary {
            course_id: workflow.course_id().clone(),
            faculty_id: workflow.faculty_id().clone(),
            stage: workflow.current_stage(),
            next_action_required: workflow.next_action_required().to_string(),
            history_len: workflow.approval_history().len(),
            last_record: workflow.last_record().cloned(),
            artifacts: ArtifactFlags {
                course_initialization: workflow.course_initialization().is_some(),
                facd: workflow.facd().is_some(),
                fccs: workflow.fccs().is_some(),
                ffcs: workflow.ffcs().is_some(),
                pending_draft: workflow
                    .current_gate()
                    .is_some_and(|gate| workflow.draft(gate).is_some()),
            },
            can_generate_plt: workflow.current_stage() >= Stage::KgFinalized,
        })
    }

    /// Build a learner's personalized learning tree from the final structure.
    ///
    /// The first successful call moves the course through PLT generation to
    /// completion; later calls only run the learner batch.
    #[instrument(skip(self), fields(course_id = %course_id, learner_id = %learner_id))]
    pub async fn generate_personalized_learning_tree(
        &self,
        course_id: &CourseId,
        learner_id: &LearnerId,
    ) -> ApprovalResult<WorkflowResponse> {
        let handle = self.handle(course_id).await?;
        let mut current = handle.lock().await;

        let stage = current.current_stage();
        let ffcs = match current.ffcs() {
            Some(ffcs) if stage >= Stage::KgFinalized => ffcs.clone(),
            _ => {
                return Err(ApprovalError::InvalidStage {
                    operation: "generate personalized learning tree",
                    expected: vec![Stage::KgFinalized, Stage::PltGeneration, Stage::Completed],
                    actual: stage,
                })
            }
        };

        let state = ExecutionState::new()
            .with_value(keys::COURSE_ID, json!(course_id.as_str()))
            .with_value(keys::LEARNER_ID, json!(learner_id.as_str()))
            .with_value(keys::FFCS, ffcs);
        let report = self
            .runner
            .run_batch(Subsystem::Learner, state, self.shutdown.child_token())
            .await?;
        let run = Some(BatchSummary::from(&report));

        let tree = match report.state.get(keys::PERSONALIZED_LEARNING_TREE) {
            Some(tree) if !tree.is_null() => tree.clone(),
            _ => {
                warn!(status = ?report.status, "Learner batch produced no learning tree");
                return Ok(response(&current, WorkflowStatus::GenerationFailed, run));
            }
        };

        if current.can_proceed_to_plt_generation() {
            let mut next = current.clone();
            next.begin_plt_generation()?;
            next.mark_completed()?;
            self.commit(&mut current, next).await?;
        }

        info!(stage = %current.current_stage(), "Personalized learning tree generated");
        let mut resp = response(&current, WorkflowStatus::PltGenerated, run);
        resp.ui_data = json!({
            (keys::LEARNER_ID): learner_id.as_str(),
            (keys::PERSONALIZED_LEARNING_TREE): tree,
        });
        Ok(resp)
    }

    // ── Internals ────────────────────────────────────────────────────

    fn cached(&self, course_id: &CourseId) -> Option<Arc<Mutex<ApprovalWorkflow>>> {
        self.workflows.get(course_id).map(|e| e.value().clone())
    }

    /// Per-course lock, loading from the store on first use
    async fn handle(&self, course_id: &CourseId) -> ApprovalResult<Arc<Mutex<ApprovalWorkflow>>> {
        if let Some(handle) = self.cached(course_id) {
            return Ok(handle);
        }

        let _creation = self.creation.lock().await;
        if let Some(handle) = self.cached(course_id) {
            return Ok(handle);
        }
        let workflow = self
            .store
            .load(course_id)
            .await?
            .ok_or_else(|| ApprovalError::WorkflowNotFound(course_id.clone()))?;
        let handle = Arc::new(Mutex::new(workflow));
        self.workflows.insert(course_id.clone(), handle.clone());
        Ok(handle)
    }

    /// Save `next`, then make it current
    async fn commit(
        &self,
        current: &mut ApprovalWorkflow,
        next: ApprovalWorkflow,
    ) -> ApprovalResult<()> {
        if let Err(e) = self.store.save(&next).await {
            warn!(
                course_id = %next.course_id(),
                error = %e,
                "Workflow save failed; keeping previous state"
            );
            return Err(e.into());
        }
        *current = next;
        Ok(())
    }

    /// Run a generation batch and submit its output as the target draft
    async fn generate(
        &self,
        workflow: &mut ApprovalWorkflow,
        batch: &BatchSpec,
        feedback: Option<String>,
    ) -> ApprovalResult<(WorkflowStatus, Option<BatchSummary>)> {
        let seed = match batch.seed_key {
            Some(_) => workflow.approved(batch.source),
            None => workflow.approved_content(batch.source),
        };
        let Some(seed) = seed.cloned() else {
            return Err(ApprovalError::MissingDraft(batch.source));
        };

        let mut state = ExecutionState::new()
            .with_value(keys::COURSE_ID, json!(workflow.course_id().as_str()))
            .with_value(keys::FACULTY_ID, json!(workflow.faculty_id().as_str()));
        match (batch.seed_key, seed) {
            (Some(key), seed) => {
                state.insert(key, seed);
            }
            (None, Value::Object(map)) => {
                for (key, value) in map {
                    state.insert(key, value);
                }
            }
            (None, other) => {
                state.insert(batch.source.artifact(), other);
            }
        }
        if let Some(feedback) = feedback {
            state.insert(keys::FACULTY_FEEDBACK, json!(feedback));
        }

        let report = self
            .runner
            .run_batch(batch.subsystem, state, self.shutdown.child_token())
            .await?;
        let summary = BatchSummary::from(&report);

        match report.state.get(batch.draft_key) {
            Some(draft) if !draft.is_null() => {
                workflow.submit_draft(batch.target, draft.clone())?;
                Ok((WorkflowStatus::AwaitingFacultyApproval, Some(summary)))
            }
            _ => {
                warn!(
                    course_id = %workflow.course_id(),
                    gate = %batch.target,
                    draft_key = batch.draft_key,
                    failed = ?report.failed,
                    "Batch produced no draft"
                );
                Ok((WorkflowStatus::GenerationFailed, Some(summary)))
            }
        }
    }
}

impl std::fmt::Debug for FacultyWorkflowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacultyWorkflowCoordinator")
            .field("workflows", &self.workflows.len())
            .finish_non_exhaustive()
    }
}

fn status_response(workflow: &ApprovalWorkflow) -> WorkflowResponse {
    let status = match workflow.current_stage() {
        Stage::KgFinalized => WorkflowStatus::ReadyForPltGeneration,
        Stage::PltGeneration | Stage::Completed => WorkflowStatus::PltGenerated,
        stage => match (stage.gate(), workflow.last_record()) {
            (Some(_), Some(record))
                if record.stage == stage && record.action == ApprovalAction::Reject =>
            {
                rejected_status(stage)
            }
            (Some(_), _) => WorkflowStatus::AwaitingFacultyApproval,
            (None, _) => WorkflowStatus::GenerationFailed,
        },
    };
    response(workflow, status, None)
}

/// Rejected drafts are regenerated where a batch produces them and
/// revised by hand everywhere else
fn rejected_status(stage: Stage) -> WorkflowStatus {
    if batch_for_stage(stage).is_some() {
        WorkflowStatus::RegenerationRequired
    } else {
        WorkflowStatus::RevisionRequired
    }
}

fn response(
    workflow: &ApprovalWorkflow,
    status: WorkflowStatus,
    run: Option<BatchSummary>,
) -> WorkflowResponse {
    WorkflowResponse {
        status,
        course_id: workflow.course_id().clone(),
        stage: workflow.current_stage(),
        next_action_required: workflow.next_action_required().to_string(),
        ui_data: ui_data(workflow),
        run,
    }
}

fn ui_data(workflow: &ApprovalWorkflow) -> Value {
    match workflow.current_gate() {
        Some(gate) => json!({
            "gate": gate,
            "verb": gate.spec().verb,
            "draft": workflow.draft(gate),
            "last_decision": workflow.last_record(),
        }),
        None => json!({
            "facd": workflow.facd(),
            "fccs": workflow.fccs(),
            "ffcs": workflow.ffcs(),
        }),
    }
}
