//! Intermediate states of a plan.
//!
//! A state is identified by the set of operations already applied. Its
//! resources are the existing ones with those operations applied; its world
//! adds the static facts and closes them under every rule that does not
//! derive resources.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::Result;
use crate::facts::{FactStore, Resource, ResourceKey};
use crate::rules::{Rule, RuleEvaluator};

use super::graph::DependencyGraph;
use super::invariant::{InvariantChecker, InvariantReport};
use super::plan::OperationKind;

/// Builds and checks the world reached after a set of operations.
#[derive(Debug)]
pub struct StateSimulator<'a> {
    graph: &'a DependencyGraph,
    checker: &'a InvariantChecker,
    evaluator: RuleEvaluator,
    /// Resources before any operation.
    initial: BTreeMap<ResourceKey, Resource>,
    /// Non-resource input facts.
    statics: FactStore,
    /// Rules re-run in every state.
    rules: Vec<Rule>,
}

impl<'a> StateSimulator<'a> {
    /// Creates a simulator over the operations of `graph`.
    #[must_use]
    pub fn new(
        graph: &'a DependencyGraph,
        checker: &'a InvariantChecker,
        initial: Vec<Resource>,
        statics: FactStore,
        rules: &[Rule],
    ) -> Self {
        Self {
            graph,
            checker,
            evaluator: RuleEvaluator::new(),
            initial: initial.into_iter().map(|r| (r.key(), r)).collect(),
            statics,
            rules: rules
                .iter()
                .filter(|r| !r.derives_resources())
                .cloned()
                .collect(),
        }
    }

    /// Sets the evaluator used to close every state.
    #[must_use]
    pub const fn with_evaluator(mut self, evaluator: RuleEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Returns the graph whose operations are simulated.
    #[must_use]
    pub const fn graph(&self) -> &'a DependencyGraph {
        self.graph
    }

    /// Returns the resources present once `done` has been applied.
    #[must_use]
    pub fn resources(&self, done: &BTreeSet<usize>) -> Vec<Resource> {
        let mut resources = self.initial.clone();
        for op in done.iter().filter_map(|&i| self.graph.operation(i)) {
            match (op.kind, op.result()) {
                (OperationKind::Delete, _) | (_, None) => {
                    resources.remove(&op.key());
                }
                (_, Some(resource)) => {
                    resources.insert(op.key(), resource);
                }
            }
        }
        resources.into_values().collect()
    }

    /// Returns the derived world once `done` has been applied.
    ///
    /// # Errors
    ///
    /// Propagates rule evaluation errors.
    pub fn world(&self, done: &BTreeSet<usize>) -> Result<FactStore> {
        let resources = self.resources(done);
        let base = self.statics.with_resources(&resources);
        self.evaluator.evaluate(&base, &self.rules)
    }

    /// Checks the invariants in the state reached after `done`.
    ///
    /// # Errors
    ///
    /// Propagates rule evaluation errors.
    pub fn check(&self, done: &BTreeSet<usize>) -> Result<InvariantReport> {
        Ok(self.checker.check(&self.world(done)?))
    }

    /// Describes a state for diagnostics.
    #[must_use]
    pub fn describe(&self, done: &BTreeSet<usize>) -> String {
        if done.is_empty() {
            return String::from("initial state");
        }
        if done.len() == self.graph.len() {
            return String::from("final state");
        }
        let applied: Vec<String> = done
            .iter()
            .filter_map(|&i| self.graph.operation(i))
            .map(ToString::to_string)
            .collect();
        format!("after {}", applied.join(", "))
    }
}
