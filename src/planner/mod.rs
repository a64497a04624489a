//! Planning module for infrastructure changes.
//!
//! This module computes the changes between the existing and desired worlds,
//! orders them into batches that respect dependencies and invariants, and
//! drives their execution.

mod changeset;
mod executor;
mod graph;
mod invariant;
mod plan;
mod simulation;
mod synthesizer;

pub use changeset::{Changeset, ChangesetComputer, ParamChange, ResourceUpdate};
pub use executor::{ExecutionResult, OperationResult, PlanExecutor};
pub use graph::{DependencyGraph, DependencyGraphBuilder};
pub use invariant::{Invariant, InvariantChecker, InvariantReport};
pub use plan::{Batch, Operation, OperationKind, Plan, PlanEdge, PlanStrategy};
pub use simulation::StateSimulator;
pub use synthesizer::{DEFAULT_MAX_SEARCH_STATES, PlanSynthesizer};
