//! Event-sourced faculty approval workflow
//!
//! The `events` log is the source of truth. Every mutation validates
//! against the current projection, appends one event, and applies it.
//! Deserializing replays the log, so the stored form is just
//! `{course_id, faculty_id, events}`.

use crate::{ApprovalAction, ApprovalError, ApprovalResult, Gate, Stage};
use chrono::{DateTime, Utc};
use courseflow_types::{keys, CourseId, FacultyId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

// ── Events ───────────────────────────────────────────────────────────

/// What happened to a workflow
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEventKind {
    Created,
    DraftSubmitted {
        gate: Gate,
        draft: Value,
    },
    Decided {
        gate: Gate,
        action: ApprovalAction,
        actor: FacultyId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        comments: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        edits: Option<Value>,
    },
    ContentProcessingStarted,
    PltGenerationStarted,
    Completed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: WorkflowEventKind,
}

impl WorkflowEvent {
    pub fn new(kind: WorkflowEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// One faculty decision, projected from a `Decided` event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRecord {
    /// Stage the decision was taken at
    pub stage: Stage,
    pub gate: Gate,
    pub action: ApprovalAction,
    pub actor: FacultyId,
    pub comments: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub result: String,
}

/// Draft and approved artifact of one gate
#[derive(Clone, Debug, Default, PartialEq)]
struct ArtifactSlot {
    draft: Option<Value>,
    approved: Option<Value>,
}

// ── Workflow ─────────────────────────────────────────────────────────

/// Approval workflow of one course
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "WorkflowSnapshot", into = "WorkflowSnapshot")]
pub struct ApprovalWorkflow {
    course_id: CourseId,
    faculty_id: FacultyId,
    events: Vec<WorkflowEvent>,

    current_stage: Stage,
    approval_history: Vec<ApprovalRecord>,
    artifacts: BTreeMap<Gate, ArtifactSlot>,
}

#[derive(Serialize, Deserialize)]
struct WorkflowSnapshot {
    course_id: CourseId,
    faculty_id: FacultyId,
    events: Vec<WorkflowEvent>,
}

impl From<WorkflowSnapshot> for ApprovalWorkflow {
    fn from(snapshot: WorkflowSnapshot) -> Self {
        Self::replay(snapshot.course_id, snapshot.faculty_id, snapshot.events)
    }
}

impl From<ApprovalWorkflow> for WorkflowSnapshot {
    fn from(workflow: ApprovalWorkflow) -> Self {
        Self {
            course_id: workflow.course_id,
            faculty_id: workflow.faculty_id,
            events: workflow.events,
        }
    }
}

impl ApprovalWorkflow {
    /// New workflow awaiting approval of a minimal course initialization
    pub fn new(course_id: CourseId, faculty_id: FacultyId) -> Self {
        let draft = json!({
            (keys::COURSE_ID): course_id.as_str(),
            (keys::FACULTY_ID): faculty_id.as_str(),
        });
        Self::with_course_initialization(course_id, faculty_id, draft)
    }

    /// New workflow whose course initialization draft awaits approval
    pub fn with_course_initialization(
        course_id: CourseId,
        faculty_id: FacultyId,
        draft: Value,
    ) -> Self {
        let mut workflow = Self::empty(course_id, faculty_id);
        workflow.record(WorkflowEventKind::Created);
        workflow.record(WorkflowEventKind::DraftSubmitted {
            gate: Gate::CourseInitialization,
            draft,
        });
        workflow
    }

    fn empty(course_id: CourseId, faculty_id: FacultyId) -> Self {
        Self {
            course_id,
            faculty_id,
            events: Vec::new(),
            current_stage: Stage::AwaitingCourseApproval,
            approval_history: Vec::new(),
            artifacts: BTreeMap::new(),
        }
    }

    /// Rebuild the projection from an event log
    pub fn replay(course_id: CourseId, faculty_id: FacultyId, events: Vec<WorkflowEvent>) -> Self {
        let mut workflow = Self::empty(course_id, faculty_id);
        for event in &events {
            workflow.apply(event);
        }
        workflow.events = events;
        workflow
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn course_id(&self) -> &CourseId {
        &self.course_id
    }

    pub fn faculty_id(&self) -> &FacultyId {
        &self.faculty_id
    }

    pub fn events(&self) -> &[WorkflowEvent] {
        &self.events
    }

    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    pub fn approval_history(&self) -> &[ApprovalRecord] {
        &self.approval_history
    }

    pub fn last_record(&self) -> Option<&ApprovalRecord> {
        self.approval_history.last()
    }

    /// Gate awaiting a decision at the current stage
    pub fn current_gate(&self) -> Option<Gate> {
        self.current_stage.gate()
    }

    pub fn next_action_required(&self) -> &'static str {
        self.current_stage.next_action()
    }

    pub fn draft(&self, gate: Gate) -> Option<&Value> {
        self.artifacts.get(&gate).and_then(|slot| slot.draft.as_ref())
    }

    /// Approved artifact of a gate: the promoted draft under the gate's
    /// approved key, plus `courseId`, `approvedBy` and `approvedAt`
    pub fn approved(&self, gate: Gate) -> Option<&Value> {
        self.artifacts.get(&gate).and_then(|slot| slot.approved.as_ref())
    }

    /// The promoted draft inside an approved artifact
    pub fn approved_content(&self, gate: Gate) -> Option<&Value> {
        self.approved(gate)
            .and_then(|artifact| artifact.get(gate.spec().approved_key))
    }

    /// Course initialization: the approved content once approved, else the draft
    pub fn course_initialization(&self) -> Option<&Value> {
        self.approved_content(Gate::CourseInitialization)
            .or_else(|| self.draft(Gate::CourseInitialization))
    }

    pub fn draft_learning_objectives(&self) -> Option<&Value> {
        self.draft(Gate::LearningObjectives)
    }

    /// Faculty Approved Course Details
    pub fn facd(&self) -> Option<&Value> {
        self.approved(Gate::LearningObjectives)
    }

    pub fn draft_structure(&self) -> Option<&Value> {
        self.draft(Gate::Structure)
    }

    /// Faculty Confirmed Course Structure
    pub fn fccs(&self) -> Option<&Value> {
        self.approved(Gate::Structure)
    }

    pub fn draft_knowledge_graph(&self) -> Option<&Value> {
        self.draft(Gate::KnowledgeGraph)
    }

    /// Faculty Final Course Structure
    pub fn ffcs(&self) -> Option<&Value> {
        self.approved(Gate::KnowledgeGraph)
    }

    pub fn can_proceed_to_plt_generation(&self) -> bool {
        self.current_stage == Stage::KgFinalized
    }

    // ── Draft submission ─────────────────────────────────────────────

    pub fn set_course_initialization(&mut self, draft: Value) -> ApprovalResult<()> {
        self.submit_draft(Gate::CourseInitialization, draft)
    }

    pub fn begin_content_processing(&mut self) -> ApprovalResult<()> {
        self.require_stage("begin content processing", &[Stage::CourseApproved])?;
        self.record(WorkflowEventKind::ContentProcessingStarted);
        Ok(())
    }

    pub fn set_draft_learning_objectives(&mut self, draft: Value) -> ApprovalResult<()> {
        self.submit_draft(Gate::LearningObjectives, draft)
    }

    pub fn set_draft_structure(&mut self, draft: Value) -> ApprovalResult<()> {
        self.submit_draft(Gate::Structure, draft)
    }

    pub fn set_draft_knowledge_graph(&mut self, draft: Value) -> ApprovalResult<()> {
        self.submit_draft(Gate::KnowledgeGraph, draft)
    }

    /// Store a draft for a gate and move to its awaiting stage
    pub fn submit_draft(&mut self, gate: Gate, draft: Value) -> ApprovalResult<()> {
        self.require_stage("submit draft", gate.spec().draft_from)?;
        self.record(WorkflowEventKind::DraftSubmitted { gate, draft });
        tracing::info!(
            course_id = %self.course_id,
            gate = %gate,
            stage = %self.current_stage,
            "Draft submitted"
        );
        Ok(())
    }

    pub fn begin_plt_generation(&mut self) -> ApprovalResult<()> {
        self.require_stage("begin PLT generation", &[Stage::KgFinalized])?;
        self.record(WorkflowEventKind::PltGenerationStarted);
        Ok(())
    }

    pub fn mark_completed(&mut self) -> ApprovalResult<()> {
        self.require_stage("complete workflow", &[Stage::PltGeneration])?;
        self.record(WorkflowEventKind::Completed);
        Ok(())
    }

    // ── Decisions ────────────────────────────────────────────────────

    pub fn approve_course_initialization(
        &mut self,
        actor: FacultyId,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        self.decide_at(Gate::CourseInitialization, ApprovalAction::Approve, actor, None, comments)
    }

    pub fn approve_learning_objectives(
        &mut self,
        actor: FacultyId,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        self.decide_at(Gate::LearningObjectives, ApprovalAction::Approve, actor, None, comments)
    }

    pub fn confirm_structure(
        &mut self,
        actor: FacultyId,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        self.decide_at(Gate::Structure, ApprovalAction::Approve, actor, None, comments)
    }

    pub fn finalize_knowledge_graph(
        &mut self,
        actor: FacultyId,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        self.decide_at(Gate::KnowledgeGraph, ApprovalAction::Approve, actor, None, comments)
    }

    /// Apply a decision at whichever gate the workflow is waiting on
    pub fn decide(
        &mut self,
        action: ApprovalAction,
        actor: FacultyId,
        edits: Option<Value>,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        let gate = self.current_gate().ok_or_else(|| ApprovalError::InvalidStage {
            operation: "decide",
            expected: Gate::ALL.iter().map(|g| g.spec().awaiting).collect(),
            actual: self.current_stage,
        })?;
        self.decide_at(gate, action, actor, edits, comments)
    }

    /// Apply a decision at a specific gate.
    ///
    /// APPROVE promotes the draft and advances; EDIT replaces the draft;
    /// REJECT only records the decision.
    pub fn decide_at(
        &mut self,
        gate: Gate,
        action: ApprovalAction,
        actor: FacultyId,
        edits: Option<Value>,
        comments: Option<String>,
    ) -> ApprovalResult<&ApprovalRecord> {
        let spec = gate.spec();
        self.require_stage(operation_name(gate, action), &[spec.awaiting])?;

        let edits = match action {
            ApprovalAction::Approve => {
                if self.draft(gate).is_none() {
                    return Err(ApprovalError::MissingDraft(gate));
                }
                None
            }
            ApprovalAction::Edit => match edits {
                Some(edits) if !edits.is_null() => Some(edits),
                _ => return Err(ApprovalError::MissingEdits(gate)),
            },
            ApprovalAction::Reject => None,
        };

        let index = self.approval_history.len();
        self.record(WorkflowEventKind::Decided {
            gate,
            action,
            actor,
            comments,
            edits,
        });
        tracing::info!(
            course_id = %self.course_id,
            gate = %gate,
            action = %action,
            stage = %self.current_stage,
            "Faculty decision recorded"
        );

        Ok(&self.approval_history[index])
    }

    // ── Event application ────────────────────────────────────────────

    fn require_stage(&self, operation: &'static str, allowed: &[Stage]) -> ApprovalResult<()> {
        if allowed.contains(&self.current_stage) {
            Ok(())
        } else {
            Err(ApprovalError::InvalidStage {
                operation,
                expected: allowed.to_vec(),
                actual: self.current_stage,
            })
        }
    }

    fn record(&mut self, kind: WorkflowEventKind) {
        let event = WorkflowEvent::new(kind);
        self.apply(&event);
        self.events.push(event);
    }

    /// Fold one event into the projection; events are trusted
    fn apply(&mut self, event: &WorkflowEvent) {
        match &event.kind {
            WorkflowEventKind::Created => {
                self.current_stage = Stage::AwaitingCourseApproval;
            }
            WorkflowEventKind::DraftSubmitted { gate, draft } => {
                self.artifacts.entry(*gate).or_default().draft = Some(draft.clone());
                self.current_stage = gate.spec().awaiting;
            }
            WorkflowEventKind::Decided {
                gate,
                action,
                actor,
                comments,
                edits,
            } => {
                let stage = self.current_stage;
                let slot = self.artifacts.entry(*gate).or_default();
                match action {
                    ApprovalAction::Approve => {
                        let spec = gate.spec();
                        slot.approved = slot.draft.take().map(|draft| {
                            json!({
                                (spec.approved_key): draft,
                                (keys::COURSE_ID): self.course_id.as_str(),
                                (keys::APPROVED_BY): actor.as_str(),
                                (keys::APPROVED_AT): event.timestamp,
                            })
                        });
                        self.current_stage = spec.approved;
                    }
                    ApprovalAction::Edit => {
                        if let Some(edits) = edits {
                            slot.draft = Some(edits.clone());
                        }
                    }
                    ApprovalAction::Reject => {}
                }
                self.approval_history.push(ApprovalRecord {
                    stage,
                    gate: *gate,
                    action: *action,
                    actor: actor.clone(),
                    comments: comments.clone(),
                    timestamp: event.timestamp,
                    result: action.result(*gate).to_string(),
                });
            }
            WorkflowEventKind::ContentProcessingStarted => {
                self.current_stage = Stage::ContentProcessing;
            }
            WorkflowEventKind::PltGenerationStarted => {
                self.current_stage = Stage::PltGeneration;
            }
            WorkflowEventKind::Completed => {
                self.current_stage = Stage::Completed;
            }
        }
    }
}

fn operation_name(gate: Gate, action: ApprovalAction) -> &'static str {
    match (gate, action) {
        (_, ApprovalAction::Edit) => "edit draft",
        (_, ApprovalAction::Reject) => "reject draft",
        (Gate::CourseInitialization, ApprovalAction::Approve) => "approve course initialization",
        (Gate::LearningObjectives, ApprovalAction::Approve) => "approve learning objectives",
        (Gate::Structure, ApprovalAction::Approve) => "confirm structure",
        (Gate::KnowledgeGraph, ApprovalAction::Approve) => "finalize knowledge graph",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn workflow() -> ApprovalWorkflow {
        ApprovalWorkflow::new(CourseId::new("CS101"), FacultyId::new("prof-1"))
    }

    fn actor() -> FacultyId {
        FacultyId::new("prof-1")
    }

    fn through_lo_approval() -> ApprovalWorkflow {
        let mut wf = workflow();
        wf.set_course_initialization(json!({"title": "Intro"})).unwrap();
        wf.approve_course_initialization(actor(), None).unwrap();
        wf.begin_content_processing().unwrap();
        wf.set_draft_learning_objectives(json!(["lo1"])).unwrap();
        wf.approve_learning_objectives(actor(), None).unwrap();
        wf
    }

    #[test]
    fn test_new_workflow() {
        let wf = workflow();
        assert_eq!(wf.current_stage(), Stage::AwaitingCourseApproval);
        assert!(wf.approval_history().is_empty());
        assert_eq!(wf.events().len(), 2);
        assert_eq!(wf.current_gate(), Some(Gate::CourseInitialization));
        assert_eq!(
            wf.course_initialization(),
            Some(&json!({"courseId": "CS101", "facultyId": "prof-1"}))
        );
    }

    #[test]
    fn test_course_to_lo_approval_end_to_end() {
        let mut wf = ApprovalWorkflow::new(CourseId::new("C1"), FacultyId::new("F1"));
        assert_eq!(wf.current_stage(), Stage::AwaitingCourseApproval);

        wf.approve_course_initialization(FacultyId::new("F1"), None)
            .unwrap();
        assert_eq!(wf.current_stage(), Stage::CourseApproved);

        wf.set_draft_learning_objectives(json!([{"id": "LO1", "text": "Define a graph"}]))
            .unwrap();
        assert_eq!(wf.current_stage(), Stage::AwaitingLoApproval);

        wf.approve_learning_objectives(FacultyId::new("F1"), None)
            .unwrap();
        assert_eq!(wf.current_stage(), Stage::LoApproved);

        let facd = wf.facd().unwrap();
        assert_eq!(
            facd["approvedLearningObjectives"],
            json!([{"id": "LO1", "text": "Define a graph"}])
        );
        assert_eq!(facd["courseId"], json!("C1"));
        assert_eq!(facd["approvedBy"], json!("F1"));
        let approved_at = wf.approval_history()[1].timestamp;
        assert_eq!(facd["approvedAt"], json!(approved_at));
        assert!(wf.draft_learning_objectives().is_none());
    }

    #[test]
    fn test_approved_artifacts_survive_replay() {
        let mut wf = through_lo_approval();
        wf.set_draft_structure(json!({"modules": []})).unwrap();
        wf.confirm_structure(FacultyId::new("prof-2"), None).unwrap();

        let restored: ApprovalWorkflow =
            serde_json::from_value(serde_json::to_value(&wf).unwrap()).unwrap();
        assert_eq!(restored.fccs(), wf.fccs());
        assert_eq!(restored.fccs().unwrap()["approvedBy"], json!("prof-2"));
        assert_eq!(
            restored.approved_content(Gate::Structure),
            Some(&json!({"modules": []}))
        );
    }

    #[test]
    fn test_full_gate_sequence() {
        let mut wf = through_lo_approval();
        assert_eq!(wf.current_stage(), Stage::LoApproved);
        assert_eq!(wf.approved_content(Gate::LearningObjectives), Some(&json!(["lo1"])));
        assert_eq!(wf.course_initialization(), Some(&json!({"title": "Intro"})));

        wf.set_draft_structure(json!({"modules": 2})).unwrap();
        let record = wf.confirm_structure(actor(), None).unwrap();
        assert_eq!(record.result, "fccs_generated");

        wf.set_draft_knowledge_graph(json!({"nodes": []})).unwrap();
        wf.finalize_knowledge_graph(actor(), Some("ship it".into()))
            .unwrap();
        assert_eq!(wf.current_stage(), Stage::KgFinalized);
        assert!(wf.can_proceed_to_plt_generation());
        assert!(wf.ffcs().is_some());

        wf.begin_plt_generation().unwrap();
        assert!(!wf.can_proceed_to_plt_generation());
        wf.mark_completed().unwrap();
        assert_eq!(wf.current_stage(), Stage::Completed);

        let results: Vec<&str> = wf
            .approval_history()
            .iter()
            .map(|r| r.result.as_str())
            .collect();
        assert_eq!(
            results,
            vec![
                "course_initialization_generated",
                "facd_generated",
                "fccs_generated",
                "ffcs_generated"
            ]
        );
    }

    #[test]
    fn test_approve_at_wrong_stage() {
        let mut wf = workflow();
        wf.set_course_initialization(json!({})).unwrap();
        let err = wf.approve_learning_objectives(actor(), None).unwrap_err();
        match err {
            ApprovalError::InvalidStage {
                expected, actual, ..
            } => {
                assert_eq!(expected, vec![Stage::AwaitingLoApproval]);
                assert_eq!(actual, Stage::AwaitingCourseApproval);
            }
            other => panic!("expected InvalidStage, got {:?}", other),
        }
        assert!(wf.approval_history().is_empty());
    }

    #[test]
    fn test_approve_without_draft() {
        let mut wf = ApprovalWorkflow::replay(
            CourseId::new("CS101"),
            FacultyId::new("prof-1"),
            vec![WorkflowEvent::new(WorkflowEventKind::Created)],
        );
        let err = wf.approve_course_initialization(actor(), None).unwrap_err();
        assert!(matches!(err, ApprovalError::MissingDraft(Gate::CourseInitialization)));
    }

    #[test]
    fn test_edit_replaces_draft() {
        let mut wf = through_lo_approval();
        wf.set_draft_structure(json!({"modules": 2})).unwrap();

        let record = wf
            .decide(ApprovalAction::Edit, actor(), Some(json!({"modules": 3})), None)
            .unwrap();
        assert_eq!(record.result, crate::EDIT_RESULT);
        assert_eq!(wf.current_stage(), Stage::AwaitingStructureConfirmation);
        assert_eq!(wf.draft_structure(), Some(&json!({"modules": 3})));

        let err = wf
            .decide(ApprovalAction::Edit, actor(), None, None)
            .unwrap_err();
        assert!(matches!(err, ApprovalError::MissingEdits(Gate::Structure)));
    }

    #[test]
    fn test_reject_keeps_draft_and_stage() {
        let mut wf = through_lo_approval();
        wf.set_draft_structure(json!({"modules": 2})).unwrap();

        let record = wf
            .decide(
                ApprovalAction::Reject,
                actor(),
                None,
                Some("too shallow".into()),
            )
            .unwrap();
        assert_eq!(record.result, crate::REJECT_RESULT);
        assert_eq!(record.comments.as_deref(), Some("too shallow"));
        assert_eq!(wf.current_stage(), Stage::AwaitingStructureConfirmation);
        assert_eq!(wf.draft_structure(), Some(&json!({"modules": 2})));
        assert!(wf.fccs().is_none());
    }

    #[test]
    fn test_decide_outside_gate() {
        let mut wf = through_lo_approval();
        let err = wf
            .decide(ApprovalAction::Approve, actor(), None, None)
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::InvalidStage {
                actual: Stage::LoApproved,
                ..
            }
        ));
    }

    #[test]
    fn test_serde_replays_events() {
        let mut wf = through_lo_approval();
        wf.set_draft_structure(json!({"modules": 2})).unwrap();
        wf.decide(ApprovalAction::Reject, actor(), None, Some("redo".into()))
            .unwrap();

        let json = serde_json::to_value(&wf).unwrap();
        assert!(json.get("current_stage").is_none());
        assert!(json.get("events").is_some());

        let restored: ApprovalWorkflow = serde_json::from_value(json).unwrap();
        assert_eq!(restored, wf);
        assert_eq!(restored.approval_history().len(), 3);
    }

    #[test]
    fn test_plt_generation_requires_kg() {
        let mut wf = through_lo_approval();
        assert!(matches!(
            wf.begin_plt_generation(),
            Err(ApprovalError::InvalidStage { .. })
        ));
        assert!(matches!(
            wf.mark_completed(),
            Err(ApprovalError::InvalidStage { .. })
        ));
    }

    #[derive(Clone, Debug)]
    enum Op {
        Draft,
        Approve,
        Edit,
        Reject,
        Begin,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            Just(Op::Draft),
            Just(Op::Approve),
            Just(Op::Edit),
            Just(Op::Reject),
            Just(Op::Begin),
        ]
    }

    proptest! {
        #[test]
        fn prop_history_grows_and_stage_never_regresses(ops in prop::collection::vec(op(), 0..40)) {
            let mut wf = workflow();
            for op in ops {
                let stage_before = wf.current_stage();
                let history_before = wf.approval_history().to_vec();

                let _ = match op {
                    Op::Draft => match wf.current_stage() {
                        Stage::AwaitingCourseApproval => wf.set_course_initialization(json!({"v": 1})),
                        Stage::CourseApproved | Stage::ContentProcessing | Stage::AwaitingLoApproval => {
                            wf.set_draft_learning_objectives(json!(["lo"]))
                        }
                        Stage::LoApproved | Stage::AwaitingStructureConfirmation => {
                            wf.set_draft_structure(json!({"m": 1}))
                        }
                        _ => wf.set_draft_knowledge_graph(json!({"n": 1})),
                    },
                    Op::Approve => wf.decide(ApprovalAction::Approve, actor(), None, None).map(|_| ()),
                    Op::Edit => wf.decide(ApprovalAction::Edit, actor(), Some(json!({"e": 1})), None).map(|_| ()),
                    Op::Reject => wf.decide(ApprovalAction::Reject, actor(), None, None).map(|_| ()),
                    Op::Begin => wf.begin_content_processing(),
                };

                prop_assert!(wf.current_stage() >= stage_before);
                prop_assert!(wf.approval_history().len() >= history_before.len());
                prop_assert_eq!(&wf.approval_history()[..history_before.len()], &history_before[..]);

                for gate in Gate::ALL {
                    let past_gate = wf.current_stage() >= gate.spec().approved;
                    prop_assert_eq!(wf.approved(gate).is_some(), past_gate);
                }
            }
        }
    }
}
