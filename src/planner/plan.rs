//! Operations and execution plans.
//!
//! A plan is a totally ordered list of batches. Operations inside a batch
//! are independent of each other and may be applied concurrently.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::facts::{Resource, ResourceKey, Temporal, Term};

use super::changeset::ParamChange;

/// Kind of change applied to a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// The resource does not exist yet.
    Create,
    /// The resource exists with different parameters.
    Update,
    /// The resource must disappear.
    Delete,
}

/// A single atomic change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// Kind of change.
    pub kind: OperationKind,
    /// Resource name.
    pub name: String,
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Parameters before the change (update, delete).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_params: Option<Term>,
    /// Parameters after the change (create, update).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_params: Option<Term>,
    /// Per-path parameter differences (update).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<ParamChange>,
}

/// Operations that may run concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// Position of the batch in the plan, starting at 0.
    pub index: usize,
    /// Operations of the batch, sorted by `(type, name)`.
    pub operations: Vec<Operation>,
}

/// How the batch order was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStrategy {
    /// Plain topological batching already kept every invariant.
    Baseline,
    /// The order was changed to keep every invariant.
    Reordered,
}

/// A dependency between two operations of the plan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlanEdge {
    /// Resource whose operation runs first.
    pub before: ResourceKey,
    /// Resource whose operation runs after it.
    pub after: ResourceKey,
}

/// An ordered, invariant-preserving execution plan.
///
/// A plan carries no timestamp: planning the same input twice yields equal
/// plans. Saved plans are stamped by [`crate::store::PlanRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Fingerprint of the planning input.
    pub fingerprint: String,
    /// How the batch order was obtained.
    pub strategy: PlanStrategy,
    /// Batches in execution order.
    pub batches: Vec<Batch>,
    /// Dependency edges between operations.
    pub edges: Vec<PlanEdge>,
    /// Number of intermediate states checked against the invariants.
    pub states_checked: usize,
}

impl OperationKind {
    /// Returns true for operations that add capacity (create, update).
    #[must_use]
    pub const fn is_expanding(self) -> bool {
        matches!(self, Self::Create | Self::Update)
    }

    /// Returns the lowercase verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl Operation {
    /// Creates a resource that only exists in the desired world.
    #[must_use]
    pub fn create(resource: &Resource) -> Self {
        Self {
            kind: OperationKind::Create,
            name: resource.name.clone(),
            resource_type: resource.resource_type.clone(),
            old_params: None,
            new_params: Some(resource.params.clone()),
            changes: Vec::new(),
        }
    }

    /// Updates a resource present in both worlds.
    #[must_use]
    pub fn update(old: &Resource, new: &Resource, changes: Vec<ParamChange>) -> Self {
        Self {
            kind: OperationKind::Update,
            name: new.name.clone(),
            resource_type: new.resource_type.clone(),
            old_params: Some(old.params.clone()),
            new_params: Some(new.params.clone()),
            changes,
        }
    }

    /// Deletes a resource that only exists in the existing world.
    #[must_use]
    pub fn delete(resource: &Resource) -> Self {
        Self {
            kind: OperationKind::Delete,
            name: resource.name.clone(),
            resource_type: resource.resource_type.clone(),
            old_params: Some(resource.params.clone()),
            new_params: None,
            changes: Vec::new(),
        }
    }

    /// Returns the `(type, name)` identity of the target resource.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.name)
    }

    /// Returns the resource as it exists once the operation is applied.
    ///
    /// `None` for deletes.
    #[must_use]
    pub fn result(&self) -> Option<Resource> {
        self.new_params.as_ref().map(|params| {
            Resource::new(&self.name, &self.resource_type, params.clone(), Temporal::Existing)
        })
    }
}

impl Plan {
    /// Creates an empty plan (no changes needed).
    #[must_use]
    pub fn empty(fingerprint: &str) -> Self {
        Self::new(fingerprint, PlanStrategy::Baseline, Vec::new(), Vec::new(), 0)
    }

    /// Creates a plan from ordered operation groups.
    #[must_use]
    pub fn new(
        fingerprint: &str,
        strategy: PlanStrategy,
        groups: Vec<Vec<Operation>>,
        edges: Vec<PlanEdge>,
        states_checked: usize,
    ) -> Self {
        let batches = groups
            .into_iter()
            .enumerate()
            .map(|(index, mut operations)| {
                operations.sort_by_key(Operation::key);
                Batch { index, operations }
            })
            .collect();

        Self {
            fingerprint: fingerprint.to_string(),
            strategy,
            batches,
            edges,
            states_checked,
        }
    }

    /// Returns true if the plan contains no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.iter().all(|b| b.operations.is_empty())
    }

    /// Iterates over all operations in execution order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.batches.iter().flat_map(|b| &b.operations)
    }

    /// Returns the number of operations.
    #[must_use]
    pub fn operation_count(&self) -> usize {
        self.batches.iter().map(|b| b.operations.len()).sum()
    }

    /// Returns the number of operations of one kind.
    #[must_use]
    pub fn count(&self, kind: OperationKind) -> usize {
        self.operations().filter(|op| op.kind == kind).count()
    }

    /// Returns the index of the batch that touches `key`.
    #[must_use]
    pub fn batch_of(&self, key: &ResourceKey) -> Option<usize> {
        self.batches
            .iter()
            .find(|b| b.operations.iter().any(|op| op.key() == *key))
            .map(|b| b.index)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for PlanStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Baseline => write!(f, "baseline"),
            Self::Reordered => write!(f, "reordered"),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{}", self.kind, self.resource_type, self.name)
    }
}

impl fmt::Display for PlanEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.before, self.after)
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(
            f,
            "Change Plan ({} operations in {} batches, {}):",
            self.operation_count(),
            self.batches.len(),
            self.strategy
        )?;
        for batch in &self.batches {
            writeln!(f, "  Batch {}:", batch.index)?;
            for op in &batch.operations {
                writeln!(f, "    - {op}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance(name: &str) -> Resource {
        Resource::new(name, "instance", Term::empty_map(), Temporal::Desired)
    }

    #[test]
    fn test_operation_constructors() {
        let create = Operation::create(&instance("b"));
        assert_eq!(create.kind, OperationKind::Create);
        assert_eq!(create.to_string(), "create instance.b");
        assert!(create.result().is_some());

        let delete = Operation::delete(&instance("a"));
        assert!(delete.result().is_none());
        assert!(!delete.kind.is_expanding());
    }

    #[test]
    fn test_plan_sorts_batches_and_counts() {
        let plan = Plan::new(
            "abc",
            PlanStrategy::Baseline,
            vec![
                vec![Operation::create(&instance("z")), Operation::create(&instance("b"))],
                vec![Operation::delete(&instance("a"))],
            ],
            Vec::new(),
            3,
        );

        assert_eq!(plan.operation_count(), 3);
        assert_eq!(plan.count(OperationKind::Create), 2);
        assert_eq!(plan.batches[0].operations[0].name, "b");
        assert_eq!(plan.batch_of(&ResourceKey::new("instance", "a")), Some(1));
        assert_eq!(plan.batch_of(&ResourceKey::new("instance", "q")), None);
    }

    #[test]
    fn test_empty_plan_display() {
        let plan = Plan::empty("abc");
        assert!(plan.is_empty());
        assert_eq!(plan.to_string(), "No changes required");
    }

    #[test]
    fn test_plan_json_shape() {
        let plan = Plan::new(
            "abc",
            PlanStrategy::Reordered,
            vec![vec![Operation::create(&instance("b"))]],
            vec![PlanEdge {
                before: ResourceKey::new("instance", "b"),
                after: ResourceKey::new("lb", "lb"),
            }],
            1,
        );
        let json = serde_json::to_value(&plan).unwrap();

        assert_eq!(json["strategy"], "reordered");
        assert_eq!(json["batches"][0]["operations"][0]["kind"], "create");
        assert_eq!(json["batches"][0]["operations"][0]["type"], "instance");
        assert_eq!(json["edges"][0]["after"]["name"], "lb");

        let back: Plan = serde_json::from_value(json).unwrap();
        assert_eq!(back.batches, plan.batches);
    }
}
