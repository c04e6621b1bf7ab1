//! Courseflow Orchestration Engine
//!
//! Coordinates independently executable services across subsystems.
//!
//! # Architecture
//!
//! ```text
//! OrchestrationRequest ──► OrchestrationEngine
//!                               │
//!               ┌───────────────┼────────────────┐
//!               ▼               ▼                ▼
//!        ServiceRegistry  ExecutabilityResolver  CrossSubsystemBridge
//!               │               │                │
//!               └──────► Service::execute ◄──────┘
//! ```
//!
//! - [`ServiceRegistry`]: services by id, grouped into subsystems.
//! - [`ExecutabilityResolver`]: which services may run given an
//!   [`ExecutionState`](courseflow_types::ExecutionState).
//! - [`OrchestrationEngine`]: the routing state machine. Runs one ready
//!   service per step until nothing is ready, the step limit is hit or the
//!   run is cancelled.
//! - [`CrossSubsystemBridge`]: out-of-band calls into another subsystem.

#![deny(unsafe_code)]

mod bridge;
mod config;
mod engine;
mod error;
mod registry;
mod request;
mod resolver;
mod service;

pub use bridge::{BridgeOutcome, CrossSubsystemBridge, BRIDGE_PAYLOAD_KEY};
pub use config::*;
pub use engine::*;
pub use error::*;
pub use registry::*;
pub use request::*;
pub use resolver::*;
pub use service::{FnService, Service, ServiceContext, ServiceOutput};
