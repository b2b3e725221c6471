//! Domain models for AgentFleet.
//!
//! Canonical definitions for the core entities:
//! - `Plan`: Immutable evaluation contract shared by every approach
//! - `Decision`: Interpretive choice recorded by an approach
//! - `Iteration` / `AgentResult`: Outcome of one approach's loop
//! - `TournamentResult`: Ranked outcome across approaches

pub mod decision;
pub mod error;
pub mod plan;
pub mod result;

pub use decision::{Decision, DecisionCandidate};
pub use error::{FleetError, PlanValidationError, Result};
pub use plan::{Plan, PlanFields, TestSpec, CORRECTNESS_CATEGORY};
pub use result::{AgentResult, Iteration, Termination, TournamentResult};
