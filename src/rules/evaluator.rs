//! Bounded fixed-point evaluation.
//!
//! Every pass evaluates all rules against the snapshot taken at the start of
//! the pass, so the order of rules inside a pass cannot change what is
//! derived. Evaluation stops at the first pass that adds nothing.

use std::collections::BTreeSet;
use tracing::{debug, trace, warn};

use crate::error::{EvalError, Result};
use crate::facts::{Atom, FactStore};

use super::rule::Rule;

/// Default number of passes before giving up.
pub const DEFAULT_MAX_ITERATIONS: usize = 1000;

/// Number of facts quoted in a divergence error.
const DIVERGENCE_SAMPLE: usize = 5;

/// Computes the closure of a fact store under a set of rules.
#[derive(Debug, Clone, Copy)]
pub struct RuleEvaluator {
    /// Maximum number of passes, the quiescent one included.
    max_iterations: usize,
}

impl Default for RuleEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl RuleEvaluator {
    /// Creates an evaluator with the default pass limit.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Sets the pass limit.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Returns the pass limit.
    #[must_use]
    pub const fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// Returns `base` closed under `rules`.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationDivergence` if no pass is quiescent within the
    /// limit, or `UnboundHeadVariable` for a rule that is not range restricted.
    pub fn evaluate(&self, base: &FactStore, rules: &[Rule]) -> Result<FactStore> {
        let mut current = base.clone();
        let mut last_productive: BTreeSet<String> = BTreeSet::new();
        let mut last_new: Vec<Atom> = Vec::new();

        for pass in 1..=self.max_iterations {
            let mut new_facts: BTreeSet<Atom> = BTreeSet::new();
            let mut productive: BTreeSet<String> = BTreeSet::new();

            for rule in rules {
                for fact in rule.derive(&current)? {
                    if !current.contains(&fact) && new_facts.insert(fact) {
                        productive.insert(rule.label());
                    }
                }
            }

            if new_facts.is_empty() {
                debug!(
                    "Fixed point reached after {pass} passes ({} facts)",
                    current.len()
                );
                return Ok(current);
            }

            trace!("Pass {pass} derived {} new facts", new_facts.len());
            last_new = new_facts.iter().take(DIVERGENCE_SAMPLE).cloned().collect();
            last_productive = productive;
            current = current.with_facts(new_facts);
        }

        warn!(
            "Rule evaluation did not converge after {} passes",
            self.max_iterations
        );
        Err(EvalError::EvaluationDivergence {
            iterations: self.max_iterations,
            rules: last_productive.into_iter().collect(),
            sample: last_new.iter().map(ToString::to_string).collect(),
        }
        .into())
    }
}
