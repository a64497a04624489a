//! Plan document types.
//!
//! This module defines the structs that map to the `halldyll.plan.yaml` file:
//! the two resource worlds, static facts, rules and invariants, plus the
//! settings that bound evaluation and search.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use validator::Validate;

use crate::engine::PlanningInput;
use crate::facts::{Atom, Resource, Temporal};
use crate::planner::{DEFAULT_MAX_SEARCH_STATES, Invariant};
use crate::provider::{FileStateSource, InlineStateSource, StateSource};
use crate::rules::{DEFAULT_MAX_ITERATIONS, Rule};

/// The root structure of a plan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanDocument {
    /// Project-level configuration.
    pub project: ProjectConfig,
    /// Evaluation and search bounds.
    #[serde(default)]
    pub settings: SettingsConfig,
    /// Where existing state comes from.
    #[serde(default)]
    pub state: StateConfig,
    /// Resources that exist now, unless `state.path` is set.
    #[serde(default)]
    pub existing: Vec<Resource>,
    /// Resources that should exist.
    #[serde(default)]
    pub desired: Vec<Resource>,
    /// Static facts shared by both worlds.
    #[serde(default)]
    pub facts: Vec<Atom>,
    /// Derivation rules.
    #[serde(default)]
    pub rules: Vec<Rule>,
    /// Invariants checked in every state of a plan.
    #[serde(default)]
    pub invariants: Vec<Invariant>,
}

/// Project-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct ProjectConfig {
    /// Unique name for the project.
    #[validate(length(min = 1, max = 63))]
    pub name: String,
    /// Environment (e.g., "dev", "staging", "prod").
    #[serde(default = "default_environment")]
    #[validate(length(min = 1, max = 63))]
    pub environment: String,
}

/// Bounds on rule evaluation and plan search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
pub struct SettingsConfig {
    /// Maximum fixed-point passes per world.
    #[serde(default = "default_max_iterations")]
    #[validate(range(min = 1, max = 100_000))]
    pub max_iterations: usize,
    /// Maximum intermediate states explored by the reorder search.
    #[serde(default = "default_max_search_states")]
    #[validate(range(min = 1, max = 10_000_000))]
    pub max_search_states: usize,
}

/// Existing state configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StateConfig {
    /// YAML or JSON file listing the existing resources.
    ///
    /// Relative paths resolve against the plan document's directory.
    #[serde(default)]
    pub path: Option<String>,
}

fn default_environment() -> String {
    String::from("dev")
}

const fn default_max_iterations() -> usize {
    DEFAULT_MAX_ITERATIONS
}

const fn default_max_search_states() -> usize {
    DEFAULT_MAX_SEARCH_STATES
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_search_states: DEFAULT_MAX_SEARCH_STATES,
        }
    }
}

impl PlanDocument {
    /// Returns the full name (project-environment).
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{}-{}", self.project.name, self.project.environment)
    }

    /// Builds the source of existing state for this document.
    ///
    /// A configured state file takes precedence over the inline `existing`
    /// section. `base_dir` is used to resolve a relative state path.
    #[must_use]
    pub fn state_source(&self, base_dir: Option<&Path>) -> Box<dyn StateSource> {
        match &self.state.path {
            Some(path) => {
                let path = PathBuf::from(path);
                let path = match base_dir {
                    Some(dir) if path.is_relative() => dir.join(path),
                    _ => path,
                };
                Box::new(FileStateSource::new(path))
            }
            None => Box::new(InlineStateSource::new(self.existing.clone())),
        }
    }

    /// Builds the planning input from the given existing resources.
    ///
    /// Resource facts listed under `facts` are dropped; resources belong in
    /// the `existing` and `desired` sections.
    #[must_use]
    pub fn planning_input(&self, existing: Vec<Resource>) -> PlanningInput {
        let desired = self
            .desired
            .iter()
            .cloned()
            .map(|r| r.with_tag(Temporal::Desired))
            .collect();

        PlanningInput::new(existing, desired)
            .with_facts(
                self.facts
                    .iter()
                    .filter(|f| Resource::from_atom(f, Temporal::Existing).is_none())
                    .cloned()
                    .collect(),
            )
            .with_rules(self.rules.clone())
            .with_invariants(self.invariants.clone())
            .with_max_iterations(self.settings.max_iterations)
            .with_max_search_states(self.settings.max_search_states)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let doc: PlanDocument = serde_yaml::from_str("project: {name: web}").expect("Failed to parse");

        assert_eq!(doc.project.environment, "dev");
        assert_eq!(doc.settings, SettingsConfig::default());
        assert!(doc.state.path.is_none());
        assert!(doc.desired.is_empty());
        assert_eq!(doc.full_name(), "web-dev");
    }

    #[tokio::test]
    async fn test_inline_state_source_is_retagged() {
        let yaml = r"
project: {name: web}
existing:
  - {name: a, type: instance}
";
        let doc: PlanDocument = serde_yaml::from_str(yaml).expect("Failed to parse");
        let existing = doc
            .state_source(None)
            .existing()
            .await
            .expect("Inline state should load");

        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].tag, Temporal::Existing);
    }

    #[test]
    fn test_planning_input_drops_resource_facts() {
        let yaml = r"
project: {name: web}
settings: {max_iterations: 7}
facts:
  - {depends_on: [lb, b]}
  - {resource: [x, instance, {}]}
";
        let doc: PlanDocument = serde_yaml::from_str(yaml).expect("Failed to parse");
        let input = doc.planning_input(Vec::new());

        assert_eq!(input.facts.len(), 1);
        assert_eq!(input.facts[0].predicate, "depends_on");
        assert_eq!(input.max_iterations, 7);
        assert_eq!(input.max_search_states, DEFAULT_MAX_SEARCH_STATES);
    }
}
