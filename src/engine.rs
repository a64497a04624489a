//! Planning engine.
//!
//! Builds the existing and desired worlds from a planning input, diffs them
//! and synthesizes an ordered plan whose every intermediate state keeps the
//! invariants.

use tracing::{debug, info};

use crate::config::ConfigHasher;
use crate::error::Result;
use crate::facts::{Atom, Bindings, FactStore, Resource, Temporal};
use crate::planner::{
    Changeset, ChangesetComputer, DEFAULT_MAX_SEARCH_STATES, DependencyGraph,
    DependencyGraphBuilder, Invariant, InvariantChecker, Plan, PlanSynthesizer, StateSimulator,
};
use crate::rules::{DEFAULT_MAX_ITERATIONS, Rule, RuleEvaluator};

/// Everything a plan is computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningInput {
    /// Resources that exist now.
    pub existing: Vec<Resource>,
    /// Resources that should exist.
    pub desired: Vec<Resource>,
    /// Static facts present in both worlds.
    pub facts: Vec<Atom>,
    /// Derivation rules applied to both worlds.
    pub rules: Vec<Rule>,
    /// Invariants checked in every state.
    pub invariants: Vec<Invariant>,
    /// Fixed-point pass limit per world.
    pub max_iterations: usize,
    /// Reorder search state limit.
    pub max_search_states: usize,
}

/// A computed changeset and the plan that applies it.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Differences between the two worlds.
    pub changeset: Changeset,
    /// Ordered batches of operations.
    pub plan: Plan,
}

/// Computes worlds, changesets and plans for one planning input.
#[derive(Debug, Clone)]
pub struct PlanningEngine {
    input: PlanningInput,
    fingerprint: String,
}

impl PlanningInput {
    /// Creates an input with no facts, rules or invariants and default
    /// bounds.
    #[must_use]
    pub const fn new(existing: Vec<Resource>, desired: Vec<Resource>) -> Self {
        Self {
            existing,
            desired,
            facts: Vec::new(),
            rules: Vec::new(),
            invariants: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_search_states: DEFAULT_MAX_SEARCH_STATES,
        }
    }

    /// Sets the static facts.
    #[must_use]
    pub fn with_facts(mut self, facts: Vec<Atom>) -> Self {
        self.facts = facts;
        self
    }

    /// Sets the rules.
    #[must_use]
    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    /// Sets the declared invariants.
    #[must_use]
    pub fn with_invariants(mut self, invariants: Vec<Invariant>) -> Self {
        self.invariants = invariants;
        self
    }

    /// Sets the fixed-point pass limit.
    #[must_use]
    pub const fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the reorder search state limit.
    #[must_use]
    pub const fn with_max_search_states(mut self, max_search_states: usize) -> Self {
        self.max_search_states = max_search_states;
        self
    }
}

impl PlanningEngine {
    /// Creates an engine and fingerprints its input.
    #[must_use]
    pub fn new(input: PlanningInput) -> Self {
        let fingerprint = ConfigHasher::new().fingerprint(&input);
        Self { input, fingerprint }
    }

    /// Returns the planning input.
    #[must_use]
    pub const fn input(&self) -> &PlanningInput {
        &self.input
    }

    /// Returns the input fingerprint.
    #[must_use]
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    fn evaluator(&self) -> RuleEvaluator {
        RuleEvaluator::new().with_max_iterations(self.input.max_iterations)
    }

    /// Returns the static facts; resource facts are left to the worlds.
    #[must_use]
    pub fn statics(&self) -> FactStore {
        self.input
            .facts
            .iter()
            .filter(|f| Resource::from_atom(f, Temporal::Existing).is_none())
            .cloned()
            .collect()
    }

    /// Builds one world: static facts plus its resources, closed under the
    /// rules.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error if the rules do not reach a fixed point.
    pub fn world(&self, tag: Temporal) -> Result<FactStore> {
        self.world_from(&self.statics(), tag)
    }

    fn world_from(&self, statics: &FactStore, tag: Temporal) -> Result<FactStore> {
        let resources = match tag {
            Temporal::Existing => &self.input.existing,
            Temporal::Desired => &self.input.desired,
        };

        let world = self
            .evaluator()
            .evaluate(&statics.with_resources(resources), &self.input.rules)?;
        debug!("The {tag} world holds {} facts", world.len());
        Ok(world)
    }

    fn worlds(&self, statics: &FactStore) -> Result<(FactStore, FactStore)> {
        Ok((
            self.world_from(statics, Temporal::Existing)?,
            self.world_from(statics, Temporal::Desired)?,
        ))
    }

    /// Computes the changeset between the two worlds.
    ///
    /// # Errors
    ///
    /// Returns evaluation errors and `AmbiguousResource`.
    pub fn changes(&self) -> Result<Changeset> {
        let (existing, desired) = self.worlds(&self.statics())?;
        ChangesetComputer::new().compute(&existing, &desired)
    }

    /// Builds the dependency graph of the changeset's operations.
    ///
    /// # Errors
    ///
    /// Returns evaluation and changeset errors, and `CyclicDependency`.
    pub fn graph(&self) -> Result<DependencyGraph> {
        let (existing, desired) = self.worlds(&self.statics())?;
        let changeset = ChangesetComputer::new().compute(&existing, &desired)?;
        DependencyGraphBuilder::new().build(changeset.operations(), &existing, &desired)
    }

    /// Computes the changeset and synthesizes a plan for it.
    ///
    /// # Errors
    ///
    /// Returns any evaluation, changeset, graph or synthesis error.
    pub fn plan(&self) -> Result<PlanOutcome> {
        let statics = self.statics();
        let (existing, desired) = self.worlds(&statics)?;

        let changeset = ChangesetComputer::new().compute(&existing, &desired)?;
        info!(
            "Changeset: {} to create, {} to update, {} to delete, {} unchanged",
            changeset.creates.len(),
            changeset.updates.len(),
            changeset.deletes.len(),
            changeset.unchanged.len()
        );

        let graph =
            DependencyGraphBuilder::new().build(changeset.operations(), &existing, &desired)?;
        debug!("Dependency graph has {} edges", graph.edge_count());

        let checker = InvariantChecker::new(self.input.invariants.clone());
        let simulator = StateSimulator::new(
            &graph,
            &checker,
            existing.resources(Temporal::Existing),
            statics,
            &self.input.rules,
        )
        .with_evaluator(self.evaluator());

        let plan = PlanSynthesizer::new()
            .with_max_search_states(self.input.max_search_states)
            .synthesize(&simulator, &self.fingerprint)?;
        info!(
            "Plan: {} operations in {} batches ({})",
            plan.operation_count(),
            plan.batches.len(),
            plan.strategy
        );

        Ok(PlanOutcome { changeset, plan })
    }

    /// Enumerates the solutions of a conjunction of patterns in one world.
    ///
    /// # Errors
    ///
    /// Returns an evaluation error if the world cannot be built.
    pub fn query(&self, tag: Temporal, patterns: &[Atom]) -> Result<Vec<Bindings>> {
        let world = self.world(tag)?;
        let solutions: Vec<Bindings> = world.query(patterns).collect();
        debug!("Query matched {} solutions in the {tag} world", solutions.len());
        Ok(solutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::error::{EvalError, HalldyllError, PlanError};
    use crate::facts::{Term, depends_on};
    use crate::planner::{OperationKind, PlanStrategy};

    const REPLACEMENT: &str = r#"
project: {name: web}
existing:
  - {name: a, type: instance}
  - {name: lb, type: lb, params: {target: a}}
desired:
  - {name: b, type: instance}
  - {name: lb, type: lb, params: {target: b}}
facts:
  - {depends_on: [lb, b]}
rules:
  - name: lb-has-live-target
    head: {has_live_target: ["?LB"]}
    body:
      - {resource: ["?LB", lb, {target: "?T"}]}
      - {resource: ["?T", instance, _]}
  - name: lb-needs-target
    head: {always: [{has_live_target: ["?LB"]}]}
    body:
      - {resource: ["?LB", lb, _]}
"#;

    fn engine(yaml: &str) -> PlanningEngine {
        let document = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let existing = document
            .existing
            .iter()
            .cloned()
            .map(|r| r.with_tag(Temporal::Existing))
            .collect();
        PlanningEngine::new(document.planning_input(existing))
    }

    #[test]
    fn test_replacement_keeps_target_live() {
        let outcome = engine(REPLACEMENT).plan().unwrap();

        let rendered: Vec<Vec<String>> = outcome
            .plan
            .batches
            .iter()
            .map(|b| b.operations.iter().map(ToString::to_string).collect())
            .collect();
        assert_eq!(
            rendered,
            vec![
                vec![String::from("create instance.b")],
                vec![String::from("update lb.lb")],
                vec![String::from("delete instance.a")],
            ]
        );
        assert_eq!(outcome.plan.strategy, PlanStrategy::Reordered);
        assert_eq!(outcome.changeset.change_count(), 3);
        assert_eq!(outcome.plan.count(OperationKind::Update), 1);
    }

    #[test]
    fn test_worlds_are_closed_under_rules() {
        let engine = engine(REPLACEMENT);
        let desired = engine.world(Temporal::Desired).unwrap();

        assert!(desired.contains(&Atom::new("has_live_target", vec![Term::str("lb")])));
        assert!(desired.contains(&depends_on("lb", "b")));
        assert_eq!(engine.statics().len(), 1);
    }

    #[test]
    fn test_query_in_each_world() {
        let engine = engine(REPLACEMENT);
        let pattern = vec![Atom::new(
            "resource",
            vec![Term::var("N"), Term::str("instance"), Term::Wildcard],
        )];

        let existing = engine.query(Temporal::Existing, &pattern).unwrap();
        let desired = engine.query(Temporal::Desired, &pattern).unwrap();

        assert_eq!(existing.len(), 1);
        assert_eq!(existing[0].get("N"), Some(&Term::str("a")));
        assert_eq!(desired[0].get("N"), Some(&Term::str("b")));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        assert_eq!(engine(REPLACEMENT).fingerprint(), engine(REPLACEMENT).fingerprint());

        let plan = engine(REPLACEMENT).plan().unwrap().plan;
        assert_eq!(plan.fingerprint, engine(REPLACEMENT).fingerprint());
    }

    #[test]
    fn test_no_changes_gives_empty_plan() {
        let yaml = r"
project: {name: web}
existing:
  - {name: a, type: instance}
desired:
  - {name: a, type: instance}
";
        let outcome = engine(yaml).plan().unwrap();
        assert!(outcome.changeset.is_empty());
        assert!(outcome.plan.is_empty());
    }

    #[test]
    fn test_cycle_is_reported() {
        let yaml = r"
project: {name: web}
desired:
  - {name: x, type: svc}
  - {name: y, type: svc}
  - {name: z, type: svc}
facts:
  - {depends_on: [x, y]}
  - {depends_on: [y, x]}
  - {depends_on: [z, x]}
";
        let err = engine(yaml).graph().unwrap_err();
        match err {
            HalldyllError::Plan(PlanError::CyclicDependency {
                resources,
                operations,
            }) => {
                assert_eq!(resources, vec!["x", "y"]);
                assert_eq!(operations, vec!["create svc.x", "create svc.y"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_between_unchanged_resources_is_reported() {
        let yaml = r"
project: {name: web}
existing:
  - {name: x, type: svc}
  - {name: y, type: svc}
desired:
  - {name: x, type: svc}
  - {name: y, type: svc}
facts:
  - {depends_on: [x, y]}
  - {depends_on: [y, x]}
";
        let err = engine(yaml).plan().unwrap_err();
        match err {
            HalldyllError::Plan(PlanError::CyclicDependency {
                resources,
                operations,
            }) => {
                assert_eq!(resources, vec!["x", "y"]);
                assert!(operations.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_with_one_unchanged_resource_is_reported() {
        let yaml = r"
project: {name: web}
existing:
  - {name: y, type: svc}
  - {name: x0, type: svc}
desired:
  - {name: x, type: svc}
  - {name: y, type: svc}
facts:
  - {depends_on: [x, y]}
  - {depends_on: [y, x]}
";
        let err = engine(yaml).plan().unwrap_err();
        match err {
            HalldyllError::Plan(PlanError::CyclicDependency {
                resources,
                operations,
            }) => {
                assert_eq!(resources, vec!["x", "y"]);
                assert_eq!(operations, vec!["create svc.x"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_divergent_rules_are_reported() {
        let yaml = r#"
project: {name: web}
settings: {max_iterations: 10}
facts:
  - {counter: [{n: 0}]}
rules:
  - name: grow
    head: {counter: [{n: "?N"}]}
    body:
      - {counter: ["?N"]}
"#;
        let err = engine(yaml).changes().unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Eval(EvalError::EvaluationDivergence { iterations: 10, .. })
        ));
    }
}
