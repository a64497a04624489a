//! Error types for the Halldyll change planner.
//!
//! This module provides the error hierarchy for every stage of a planning run:
//! configuration, rule evaluation, changeset computation, plan synthesis,
//! plan storage and the external execution provider.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the Halldyll change planner.
#[derive(Debug, Error)]
pub enum HalldyllError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Rule evaluation errors.
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// Changeset computation errors.
    #[error("Changeset error: {0}")]
    Changeset(#[from] ChangesetError),

    /// Plan synthesis errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Errors reported by an external provider.
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Plan store errors.
    #[error("Plan store error: {0}")]
    Store(#[from] StoreError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The plan document was not found.
    #[error("Plan document not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// The plan document could not be parsed.
    #[error("Failed to parse plan document: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Plan document validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A value could not be read as a term.
    #[error("Invalid term: {message}")]
    InvalidTerm {
        /// Description of the offending value.
        message: String,
    },

    /// A value could not be read as an atom.
    #[error("Invalid atom: {message}")]
    InvalidAtom {
        /// Description of the offending value.
        message: String,
    },

    /// An environment override could not be applied.
    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar {
        /// Name of the variable.
        name: String,
        /// The rejected value.
        value: String,
    },
}

/// Rule evaluation errors.
#[derive(Debug, Error)]
pub enum EvalError {
    /// The fixed point was not reached within the iteration bound.
    #[error(
        "Rule evaluation did not converge after {iterations} passes (still deriving from: {})",
        .rules.join(", ")
    )]
    EvaluationDivergence {
        /// Number of passes performed.
        iterations: usize,
        /// Rules that were still producing new facts in the last pass.
        rules: Vec<String>,
        /// A few of the facts produced by the last pass.
        sample: Vec<String>,
    },

    /// A rule head kept a variable the body never bound.
    #[error("Rule '{rule}' leaves head variable ?{variable} unbound")]
    UnboundHeadVariable {
        /// Label of the rule.
        rule: String,
        /// Name of the unbound variable.
        variable: String,
    },
}

/// Changeset computation errors.
#[derive(Debug, Error)]
pub enum ChangesetError {
    /// More than one resource shares a `(name, type)` key within one world.
    #[error("Ambiguous {tag} resource {resource_type}.{name}: {} candidates", .candidates.len())]
    AmbiguousResource {
        /// Resource name.
        name: String,
        /// Resource type.
        resource_type: String,
        /// World the duplicates were found in.
        tag: String,
        /// The competing parameter sets.
        candidates: Vec<String>,
    },
}

/// Plan synthesis errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The dependency facts or the dependency graph contain a cycle.
    #[error("Cyclic dependency between {}", describe_cycle(.resources, .operations))]
    CyclicDependency {
        /// Resource names participating in the cycle.
        resources: Vec<String>,
        /// Planned operations on those resources, possibly none.
        operations: Vec<String>,
    },

    /// No ordering keeps every invariant true throughout execution.
    #[error("No ordering satisfies invariant {invariant} (violated {} state(s), first: {})",
        .states.len(),
        .states.first().map_or("-", String::as_str)
    )]
    UnsatisfiablePlan {
        /// The offending invariant.
        invariant: String,
        /// Descriptions of the states in which it failed.
        states: Vec<String>,
    },

    /// The reorder search visited more states than allowed.
    #[error("Reorder search gave up after exploring {explored} states")]
    SearchBudgetExceeded {
        /// Number of states explored.
        explored: usize,
    },

    /// A stored plan no longer matches the plan document.
    #[error("Stored plan is stale: planned for {planned}, document is now {current}")]
    StalePlan {
        /// Fingerprint the plan was synthesized for.
        planned: String,
        /// Fingerprint of the current document.
        current: String,
    },
}

/// External provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// An operation failed while being applied.
    #[error("Provider failed to {operation}: {message}")]
    ProviderFailure {
        /// Description of the operation.
        operation: String,
        /// Failure reported by the provider.
        message: String,
    },

    /// The existing state could not be acquired.
    #[error("Existing state unavailable from {source_name}: {message}")]
    StateUnavailable {
        /// Name of the state source.
        source_name: String,
        /// Description of the failure.
        message: String,
    },
}

/// Plan store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No plan has been saved yet.
    #[error("No saved plan found in {location}")]
    NotFound {
        /// Where the store looked.
        location: String,
    },

    /// Stored data is corrupted.
    #[error("Stored data is corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Serialization error.
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Description of the serialization error.
        message: String,
    },
}

/// Renders the participants of a dependency cycle.
fn describe_cycle(resources: &[String], operations: &[String]) -> String {
    if operations.is_empty() {
        format!("resources {}", resources.join(", "))
    } else {
        format!(
            "resources {} (operations: {})",
            resources.join(", "),
            operations.join(", ")
        )
    }
}

/// Result type alias for Halldyll operations.
pub type Result<T> = std::result::Result<T, HalldyllError>;

impl HalldyllError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns a short machine-readable kind for diagnostics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Eval(EvalError::EvaluationDivergence { .. }) => "evaluation_divergence",
            Self::Eval(EvalError::UnboundHeadVariable { .. }) => "unbound_head_variable",
            Self::Changeset(ChangesetError::AmbiguousResource { .. }) => "ambiguous_resource",
            Self::Plan(PlanError::CyclicDependency { .. }) => "cyclic_dependency",
            Self::Plan(PlanError::UnsatisfiablePlan { .. }) => "unsatisfiable_plan",
            Self::Plan(PlanError::SearchBudgetExceeded { .. }) => "search_budget_exceeded",
            Self::Plan(PlanError::StalePlan { .. }) => "stale_plan",
            Self::Provider(ProviderError::ProviderFailure { .. }) => "provider_failure",
            Self::Provider(ProviderError::StateUnavailable { .. }) => "state_unavailable",
            Self::Store(_) => "store",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates an invalid term error.
    #[must_use]
    pub fn invalid_term(message: impl Into<String>) -> Self {
        Self::InvalidTerm {
            message: message.into(),
        }
    }

    /// Creates an invalid atom error.
    #[must_use]
    pub fn invalid_atom(message: impl Into<String>) -> Self {
        Self::InvalidAtom {
            message: message.into(),
        }
    }
}

impl ProviderError {
    /// Creates a provider failure for an operation.
    #[must_use]
    pub fn failure(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a state-unavailable error.
    #[must_use]
    pub fn state_unavailable(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StateUnavailable {
            source_name: source_name.into(),
            message: message.into(),
        }
    }
}

impl StoreError {
    /// Creates a serialization error with the given message.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }

    /// Creates a corruption error with the given message.
    #[must_use]
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = HalldyllError::Plan(PlanError::CyclicDependency {
            resources: vec![String::from("x"), String::from("y")],
            operations: vec![String::from("create node.x"), String::from("create node.y")],
        });
        assert_eq!(err.kind(), "cyclic_dependency");
    }

    #[test]
    fn test_cycle_message_lists_participants() {
        let err = PlanError::CyclicDependency {
            resources: vec![String::from("x"), String::from("y")],
            operations: vec![String::from("create node.x"), String::from("create node.y")],
        };
        assert_eq!(
            err.to_string(),
            "Cyclic dependency between resources x, y (operations: create node.x, create node.y)"
        );

        let unchanged = PlanError::CyclicDependency {
            resources: vec![String::from("x"), String::from("y")],
            operations: Vec::new(),
        };
        assert_eq!(unchanged.to_string(), "Cyclic dependency between resources x, y");
    }

    #[test]
    fn test_unsatisfiable_message_names_first_state() {
        let err = PlanError::UnsatisfiablePlan {
            invariant: String::from("always(has_live_target(lb))"),
            states: vec![String::from("final state")],
        };
        let message = err.to_string();
        assert!(message.contains("always(has_live_target(lb))"));
        assert!(message.contains("final state"));
    }
}
