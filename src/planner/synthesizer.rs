//! Plan synthesis.
//!
//! The synthesizer starts from plain topological batching. When an
//! intermediate state of that order violates an invariant, it searches for
//! another order of the same operations, depth first, preferring batches
//! that add capacity before removing any.

use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

use crate::error::{PlanError, Result};

use super::graph::DependencyGraph;
use super::plan::{Operation, Plan, PlanStrategy};
use super::simulation::StateSimulator;

/// Default number of states the reorder search may visit.
pub const DEFAULT_MAX_SEARCH_STATES: usize = 10_000;

/// Number of failing states quoted in an unsatisfiable-plan error.
const MAX_REPORTED_STATES: usize = 10;

/// Turns a dependency graph into an invariant-preserving plan.
#[derive(Debug, Clone, Copy)]
pub struct PlanSynthesizer {
    /// Search budget, in visited states.
    max_search_states: usize,
}

impl Default for PlanSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanSynthesizer {
    /// Creates a synthesizer with the default search budget.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_search_states: DEFAULT_MAX_SEARCH_STATES,
        }
    }

    /// Sets the search budget.
    #[must_use]
    pub const fn with_max_search_states(mut self, max_search_states: usize) -> Self {
        self.max_search_states = max_search_states;
        self
    }

    /// Returns the search budget.
    #[must_use]
    pub const fn max_search_states(&self) -> usize {
        self.max_search_states
    }

    /// Synthesizes a plan for the operations of the simulator's graph.
    ///
    /// # Errors
    ///
    /// Returns `UnsatisfiablePlan` if the initial or final state violates an
    /// invariant or if no order keeps every state valid,
    /// `SearchBudgetExceeded` if the search gives up, and propagates rule
    /// evaluation errors.
    pub fn synthesize(&self, simulator: &StateSimulator<'_>, fingerprint: &str) -> Result<Plan> {
        let graph = simulator.graph();
        let everything: BTreeSet<usize> = (0..graph.len()).collect();
        let mut states_checked = 0;

        for done in [BTreeSet::new(), everything] {
            states_checked += 1;
            let report = simulator.check(&done)?;
            if let Some(invariant) = report.first_violation() {
                let state = simulator.describe(&done);
                warn!("Invariant {invariant} is violated in the {state}");
                return Err(PlanError::UnsatisfiablePlan {
                    invariant: invariant.to_string(),
                    states: vec![state],
                }
                .into());
            }
            if graph.is_empty() {
                return Ok(Plan::empty(fingerprint));
            }
        }

        let baseline = graph.topological_batches();
        let mut done = BTreeSet::new();
        let mut violation = None;
        // The state after the last batch is the final state, already checked.
        for batch in baseline.iter().take(baseline.len().saturating_sub(1)) {
            done.extend(batch.iter().copied());
            states_checked += 1;
            let report = simulator.check(&done)?;
            if let Some(invariant) = report.first_violation() {
                violation = Some((invariant.to_string(), simulator.describe(&done)));
                break;
            }
        }

        let Some((invariant, state)) = violation else {
            info!(
                "Baseline order keeps every invariant ({} batches)",
                baseline.len()
            );
            return Ok(Plan::new(
                fingerprint,
                PlanStrategy::Baseline,
                groups(graph, &baseline),
                graph.plan_edges(),
                states_checked,
            ));
        };

        info!("Baseline order violates {invariant} {state}, searching for another order");
        let mut search = ReorderSearch {
            graph,
            simulator,
            budget: self.max_search_states,
            explored: 0,
            dead_ends: HashSet::new(),
            failures: vec![(invariant, state)],
        };
        let mut path = Vec::new();

        if search.visit(&BTreeSet::new(), &mut path)? {
            info!(
                "Found an invariant-preserving order after {} states ({} batches)",
                search.explored,
                path.len()
            );
            return Ok(Plan::new(
                fingerprint,
                PlanStrategy::Reordered,
                groups(graph, &path),
                graph.plan_edges(),
                states_checked + search.explored,
            ));
        }

        Err(search.unsatisfiable().into())
    }
}

/// Resolves node indices to operations.
fn groups(graph: &DependencyGraph, batches: &[Vec<usize>]) -> Vec<Vec<Operation>> {
    batches
        .iter()
        .map(|batch| {
            batch
                .iter()
                .filter_map(|&i| graph.operation(i).cloned())
                .collect()
        })
        .collect()
}

/// Depth-first search over antichain batches.
struct ReorderSearch<'s, 'a> {
    graph: &'a DependencyGraph,
    simulator: &'s StateSimulator<'a>,
    budget: usize,
    explored: usize,
    /// Completed-operation sets from which no valid order exists.
    dead_ends: HashSet<BTreeSet<usize>>,
    /// `(invariant, state)` pairs, in discovery order.
    failures: Vec<(String, String)>,
}

impl ReorderSearch<'_, '_> {
    /// Extends `path` from the state reached after `done`.
    ///
    /// Returns true once every operation is scheduled.
    fn visit(&mut self, done: &BTreeSet<usize>, path: &mut Vec<Vec<usize>>) -> Result<bool> {
        if done.len() == self.graph.len() {
            return Ok(true);
        }

        for batch in self.candidates(done) {
            let mut next = done.clone();
            next.extend(batch.iter().copied());
            if self.dead_ends.contains(&next) {
                continue;
            }

            if self.explored >= self.budget {
                warn!("Reorder search budget of {} states exhausted", self.budget);
                return Err(PlanError::SearchBudgetExceeded {
                    explored: self.explored,
                }
                .into());
            }
            self.explored += 1;

            let report = self.simulator.check(&next)?;
            if let Some(invariant) = report.first_violation() {
                let state = self.simulator.describe(&next);
                debug!("Rejected {state}: violates {invariant}");
                self.failures.push((invariant.to_string(), state));
                self.dead_ends.insert(next);
                continue;
            }

            path.push(batch);
            if self.visit(&next, path)? {
                return Ok(true);
            }
            path.pop();
        }

        self.dead_ends.insert(done.clone());
        Ok(false)
    }

    /// Candidate batches from `done`, most preferred first.
    fn candidates(&self, done: &BTreeSet<usize>) -> Vec<Vec<usize>> {
        let ready = self.graph.ready(done);
        let kind = |i: usize| self.graph.operations()[i].kind;
        let (expanding, deletes): (Vec<usize>, Vec<usize>) =
            ready.iter().partition(|&&i| kind(i).is_expanding());

        let mut candidates: Vec<Vec<usize>> = Vec::new();
        let mut push = |batch: Vec<usize>| {
            if !batch.is_empty() && !candidates.contains(&batch) {
                candidates.push(batch);
            }
        };

        if !deletes.is_empty() {
            push(expanding);
        }
        push(ready.clone());
        push(deletes);

        let mut singles = ready;
        singles.sort_by_key(|&i| (kind(i), i));
        for i in singles {
            push(vec![i]);
        }

        candidates
    }

    /// Builds the error reported when the search space is exhausted.
    fn unsatisfiable(&self) -> PlanError {
        let invariant = self
            .failures
            .first()
            .map(|(invariant, _)| invariant.clone())
            .unwrap_or_default();

        let mut states: Vec<String> = Vec::new();
        for (_, state) in self.failures.iter().filter(|(i, _)| *i == invariant) {
            if states.len() == MAX_REPORTED_STATES {
                break;
            }
            if !states.contains(state) {
                states.push(state.clone());
            }
        }

        warn!("No order of the operations keeps {invariant}");
        PlanError::UnsatisfiablePlan { invariant, states }
    }
}
