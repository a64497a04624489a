//! External collaborators of the planner.
//!
//! This module provides:
//! - The execution provider interface and a dry-run implementation
//! - Sources of existing state (inline or from a state file)

mod execution;
mod state_source;

#[cfg(test)]
pub use execution::MockExecutionProvider;
pub use execution::{DryRunProvider, ExecutionProvider};
pub use state_source::{FileStateSource, InlineStateSource, StateSource};
