//! Courseflow Domain Types
//!
//! Shared vocabulary for the orchestration engine and the faculty approval
//! workflow. Nothing in this crate executes anything; it only describes
//! services, the state they share, and the messages that cross subsystem
//! boundaries.
//!
//! # Key Concepts
//!
//! - **ServiceDescriptor**: the immutable contract of a service (dependencies,
//!   required inputs, provided outputs, timeout).
//! - **SubsystemDescriptor**: the ordered grouping of services under a
//!   [`Subsystem`] tag.
//! - **ExecutionState**: the per-run map that services read from and write to,
//!   plus per-service status, results, errors and an append-only history.
//! - **CrossSubsystemRequest / Response**: out-of-band invocations of a
//!   service that lives in another subsystem.
//! - **keys**: the well-known shared-state key namespace.

#![deny(unsafe_code)]

mod bridge;
mod descriptor;
mod errors;
mod ids;
pub mod keys;
mod state;
mod subsystem;

pub use bridge::*;
pub use descriptor::*;
pub use errors::*;
pub use ids::*;
pub use state::*;
pub use subsystem::*;
