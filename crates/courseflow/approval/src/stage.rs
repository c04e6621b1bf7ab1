//! Approval stages and the declarative gate table

use crate::ApprovalError;
use courseflow_types::keys;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Where a course sits in the faculty approval pipeline.
///
/// Variants are declared in pipeline order; `Ord` follows it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Stage {
    AwaitingCourseApproval,
    CourseApproved,
    ContentProcessing,
    AwaitingLoApproval,
    LoApproved,
    AwaitingStructureConfirmation,
    StructureConfirmed,
    AwaitingKgFinalization,
    KgFinalized,
    PltGeneration,
    Completed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::AwaitingCourseApproval => "AWAITING_COURSE_APPROVAL",
            Stage::CourseApproved => "COURSE_APPROVED",
            Stage::ContentProcessing => "CONTENT_PROCESSING",
            Stage::AwaitingLoApproval => "AWAITING_LO_APPROVAL",
            Stage::LoApproved => "LO_APPROVED",
            Stage::AwaitingStructureConfirmation => "AWAITING_STRUCTURE_CONFIRMATION",
            Stage::StructureConfirmed => "STRUCTURE_CONFIRMED",
            Stage::AwaitingKgFinalization => "AWAITING_KG_FINALIZATION",
            Stage::KgFinalized => "KG_FINALIZED",
            Stage::PltGeneration => "PLT_GENERATION",
            Stage::Completed => "COMPLETED",
        }
    }

    /// The gate awaiting a faculty decision at this stage, if any
    pub fn gate(&self) -> Option<Gate> {
        Gate::ALL
            .into_iter()
            .find(|gate| gate.spec().awaiting == *self)
    }

    /// What the faculty (or the system) has to do next
    pub fn next_action(&self) -> &'static str {
        match self {
            Stage::AwaitingCourseApproval => "approve_course_initialization",
            Stage::CourseApproved | Stage::ContentProcessing => "await_learning_objectives",
            Stage::AwaitingLoApproval => "approve_learning_objectives",
            Stage::LoApproved => "await_course_structure",
            Stage::AwaitingStructureConfirmation => "confirm_course_structure",
            Stage::StructureConfirmed => "await_knowledge_graph",
            Stage::AwaitingKgFinalization => "finalize_knowledge_graph",
            Stage::KgFinalized => "generate_personalized_learning_trees",
            Stage::PltGeneration => "await_plt_generation",
            Stage::Completed => "none",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Gates ────────────────────────────────────────────────────────────

/// A faculty decision point
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    CourseInitialization,
    LearningObjectives,
    Structure,
    KnowledgeGraph,
}

/// Static description of one gate
#[derive(Debug)]
pub struct GateSpec {
    pub gate: Gate,
    pub awaiting: Stage,
    pub approved: Stage,
    /// Stages from which a draft may be submitted
    pub draft_from: &'static [Stage],
    /// Verb faculty use to approve
    pub verb: &'static str,
    /// History result recorded on approval
    pub approval_result: &'static str,
    /// Key the promoted draft sits under in the approved artifact
    pub approved_key: &'static str,
}

static GATES: [GateSpec; 4] = [
    GateSpec {
        gate: Gate::CourseInitialization,
        awaiting: Stage::AwaitingCourseApproval,
        approved: Stage::CourseApproved,
        draft_from: &[Stage::AwaitingCourseApproval],
        verb: "approve",
        approval_result: "course_initialization_generated",
        approved_key: keys::APPROVED_COURSE_INITIALIZATION,
    },
    GateSpec {
        gate: Gate::LearningObjectives,
        awaiting: Stage::AwaitingLoApproval,
        approved: Stage::LoApproved,
        draft_from: &[
            Stage::CourseApproved,
            Stage::ContentProcessing,
            Stage::AwaitingLoApproval,
        ],
        verb: "approve",
        approval_result: "facd_generated",
        approved_key: keys::APPROVED_LEARNING_OBJECTIVES,
    },
    GateSpec {
        gate: Gate::Structure,
        awaiting: Stage::AwaitingStructureConfirmation,
        approved: Stage::StructureConfirmed,
        draft_from: &[Stage::LoApproved, Stage::AwaitingStructureConfirmation],
        verb: "confirm",
        approval_result: "fccs_generated",
        approved_key: keys::APPROVED_STRUCTURE,
    },
    GateSpec {
        gate: Gate::KnowledgeGraph,
        awaiting: Stage::AwaitingKgFinalization,
        approved: Stage::KgFinalized,
        draft_from: &[Stage::StructureConfirmed, Stage::AwaitingKgFinalization],
        verb: "finalize",
        approval_result: "ffcs_generated",
        approved_key: keys::APPROVED_KNOWLEDGE_GRAPH,
    },
];

/// History result recorded for an edit
pub const EDIT_RESULT: &str = "edited_resubmission_required";
/// History result recorded for a rejection
pub const REJECT_RESULT: &str = "rejected_regeneration_required";

impl Gate {
    pub const ALL: [Gate; 4] = [
        Gate::CourseInitialization,
        Gate::LearningObjectives,
        Gate::Structure,
        Gate::KnowledgeGraph,
    ];

    pub fn spec(&self) -> &'static GateSpec {
        match self {
            Gate::CourseInitialization => &GATES[0],
            Gate::LearningObjectives => &GATES[1],
            Gate::Structure => &GATES[2],
            Gate::KnowledgeGraph => &GATES[3],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gate::CourseInitialization => "course_initialization",
            Gate::LearningObjectives => "learning_objectives",
            Gate::Structure => "structure",
            Gate::KnowledgeGraph => "knowledge_graph",
        }
    }

    /// Name of the approved artifact this gate produces
    pub fn artifact(&self) -> &'static str {
        match self {
            Gate::CourseInitialization => "course_initialization",
            Gate::LearningObjectives => "facd",
            Gate::Structure => "fccs",
            Gate::KnowledgeGraph => "ffcs",
        }
    }
}

impl std::fmt::Display for Gate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Actions ──────────────────────────────────────────────────────────

/// Faculty decision at a gate
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalAction {
    /// Promote the draft; spelled `confirm` or `finalize` at some gates
    Approve,
    /// Replace the draft with faculty edits
    Edit,
    /// Send the draft back for regeneration
    Reject,
}

impl ApprovalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalAction::Approve => "approve",
            ApprovalAction::Edit => "edit",
            ApprovalAction::Reject => "reject",
        }
    }

    /// History result string for this action at a gate
    pub fn result(&self, gate: Gate) -> &'static str {
        match self {
            ApprovalAction::Approve => gate.spec().approval_result,
            ApprovalAction::Edit => EDIT_RESULT,
            ApprovalAction::Reject => REJECT_RESULT,
        }
    }
}

impl std::fmt::Display for ApprovalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApprovalAction {
    type Err = ApprovalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approve" | "confirm" | "finalize" => Ok(ApprovalAction::Approve),
            "edit" => Ok(ApprovalAction::Edit),
            "reject" => Ok(ApprovalAction::Reject),
            other => Err(ApprovalError::UnknownAction(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order() {
        assert!(Stage::AwaitingCourseApproval < Stage::CourseApproved);
        assert!(Stage::KgFinalized < Stage::PltGeneration);
        assert!(Stage::PltGeneration < Stage::Completed);
    }

    #[test]
    fn test_gate_table_is_consistent() {
        for gate in Gate::ALL {
            let spec = gate.spec();
            assert_eq!(spec.gate, gate);
            assert!(spec.awaiting < spec.approved);
            assert!(spec.draft_from.contains(&spec.awaiting));
            assert_eq!(spec.awaiting.gate(), Some(gate));
        }
        assert_eq!(Stage::ContentProcessing.gate(), None);
    }

    #[test]
    fn test_action_aliases() {
        assert_eq!("confirm".parse::<ApprovalAction>().unwrap(), ApprovalAction::Approve);
        assert_eq!("FINALIZE".parse::<ApprovalAction>().unwrap(), ApprovalAction::Approve);
        assert_eq!("edit".parse::<ApprovalAction>().unwrap(), ApprovalAction::Edit);
        assert!("publish".parse::<ApprovalAction>().is_err());
    }

    #[test]
    fn test_results() {
        assert_eq!(
            ApprovalAction::Approve.result(Gate::Structure),
            "fccs_generated"
        );
        assert_eq!(
            ApprovalAction::Reject.result(Gate::KnowledgeGraph),
            REJECT_RESULT
        );
    }

    #[test]
    fn test_stage_serde() {
        let json = serde_json::to_string(&Stage::AwaitingKgFinalization).unwrap();
        assert_eq!(json, "\"AWAITING_KG_FINALIZATION\"");
    }
}
