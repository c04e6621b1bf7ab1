//! Courseflow Faculty Approval Workflow
//!
//! Gates parts of the content pipeline behind faculty decisions:
//!
//! ```text
//! AWAITING_COURSE_APPROVAL → COURSE_APPROVED → CONTENT_PROCESSING
//!   → AWAITING_LO_APPROVAL → LO_APPROVED
//!   → AWAITING_STRUCTURE_CONFIRMATION → STRUCTURE_CONFIRMED
//!   → AWAITING_KG_FINALIZATION → KG_FINALIZED → PLT_GENERATION → COMPLETED
//! ```
//!
//! Each gate accepts APPROVE (spelled confirm/finalize at some gates), EDIT
//! or REJECT. The [`ApprovalWorkflow`] is event-sourced and persisted through
//! a [`WorkflowStore`]; the [`FacultyWorkflowCoordinator`] serializes all
//! access to one course and runs the generation batches between gates.

#![deny(unsafe_code)]

mod coordinator;
mod error;
mod stage;
mod store;
mod workflow;

pub use coordinator::*;
pub use error::*;
pub use stage::*;
pub use store::*;
pub use workflow::*;
