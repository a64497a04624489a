//! Changeset computation between the existing and desired worlds.
//!
//! Resources are matched by `(type, name)`. Parameters are compared
//! structurally; an update records which paths changed.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use crate::error::{ChangesetError, Result};
use crate::facts::{FactStore, Resource, ResourceKey, Temporal, Term};

use super::plan::Operation;

/// Separator between keys of a parameter path.
const PATH_SEPARATOR: char = '.';

/// Computes changesets.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChangesetComputer;

/// A single parameter difference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamChange {
    /// Dotted path inside the parameter map.
    pub path: String,
    /// Value before the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<Term>,
    /// Value after the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<Term>,
}

/// A resource present in both worlds with different parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceUpdate {
    /// Resource as it exists.
    pub old: Resource,
    /// Resource as it should be.
    pub new: Resource,
    /// Parameter paths that differ.
    pub changes: Vec<ParamChange>,
}

/// Differences between the existing and desired worlds.
///
/// Every resource of either world appears in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Resources to create.
    pub creates: Vec<Resource>,
    /// Resources to update.
    pub updates: Vec<ResourceUpdate>,
    /// Resources to delete.
    pub deletes: Vec<Resource>,
    /// Resources left as they are.
    pub unchanged: Vec<Resource>,
}

impl ChangesetComputer {
    /// Creates a new changeset computer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the changeset between two derived worlds.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousResource` if a world holds two resources with the
    /// same `(type, name)`.
    pub fn compute(&self, existing: &FactStore, desired: &FactStore) -> Result<Changeset> {
        let mut old = Self::index(existing, Temporal::Existing)?;
        let new = Self::index(desired, Temporal::Desired)?;
        let mut changeset = Changeset::default();

        for (key, wanted) in new {
            match old.remove(&key) {
                None => changeset.creates.push(wanted),
                Some(current) if current.params == wanted.params => {
                    changeset.unchanged.push(wanted);
                }
                Some(current) => {
                    let changes = Self::diff_params(&current.params, &wanted.params);
                    changeset.updates.push(ResourceUpdate {
                        old: current,
                        new: wanted,
                        changes,
                    });
                }
            }
        }
        changeset.deletes = old.into_values().collect();

        debug!(
            "Changeset: {} to create, {} to update, {} to delete, {} unchanged",
            changeset.creates.len(),
            changeset.updates.len(),
            changeset.deletes.len(),
            changeset.unchanged.len()
        );

        Ok(changeset)
    }

    /// Indexes the resources of a world by key.
    fn index(world: &FactStore, tag: Temporal) -> Result<BTreeMap<ResourceKey, Resource>> {
        let mut by_key: BTreeMap<ResourceKey, Vec<Resource>> = BTreeMap::new();
        for resource in world.resources(tag) {
            by_key.entry(resource.key()).or_default().push(resource);
        }

        let mut index = BTreeMap::new();
        for (key, mut candidates) in by_key {
            if candidates.len() > 1 {
                return Err(ChangesetError::AmbiguousResource {
                    name: key.name,
                    resource_type: key.resource_type,
                    tag: tag.to_string(),
                    candidates: candidates.iter().map(|r| r.params.to_string()).collect(),
                }
                .into());
            }
            if let Some(resource) = candidates.pop() {
                index.insert(key, resource);
            }
        }
        Ok(index)
    }

    /// Lists the paths at which two parameter terms differ.
    ///
    /// Maps are compared key by key; any other pair of differing values is
    /// reported as a whole at its path.
    #[must_use]
    pub fn diff_params(old: &Term, new: &Term) -> Vec<ParamChange> {
        let mut changes = Vec::new();
        Self::diff_at("", Some(old), Some(new), &mut changes);
        changes
    }

    fn diff_at(path: &str, old: Option<&Term>, new: Option<&Term>, out: &mut Vec<ParamChange>) {
        if old == new {
            return;
        }
        if let (Some(Term::Map(before)), Some(Term::Map(after))) = (old, new) {
            let keys: BTreeSet<&String> =
                before.keys().chain(after.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{path}{PATH_SEPARATOR}{key}")
                };
                Self::diff_at(&child, before.get(key), after.get(key), out);
            }
            return;
        }
        out.push(ParamChange {
            path: path.to_string(),
            old: old.cloned(),
            new: new.cloned(),
        });
    }
}

impl Changeset {
    /// Returns true if no resource changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    /// Returns the number of changing resources.
    #[must_use]
    pub fn change_count(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Converts the changeset into operations sorted by `(type, name)`.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        let mut operations: Vec<Operation> = self
            .creates
            .iter()
            .map(Operation::create)
            .chain(
                self.updates
                    .iter()
                    .map(|u| Operation::update(&u.old, &u.new, u.changes.clone())),
            )
            .chain(self.deletes.iter().map(Operation::delete))
            .collect();
        operations.sort_by_key(Operation::key);
        operations
    }
}

impl fmt::Display for ParamChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "params" } else { &self.path };
        match (&self.old, &self.new) {
            (Some(old), Some(new)) => write!(f, "{path}: {old} -> {new}"),
            (None, Some(new)) => write!(f, "{path}: + {new}"),
            (Some(old), None) => write!(f, "{path}: - {old}"),
            (None, None) => write!(f, "{path}"),
        }
    }
}

impl fmt::Display for Changeset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.creates.len(),
            self.updates.len(),
            self.deletes.len(),
            self.unchanged.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HalldyllError;
    use crate::planner::OperationKind;
    use proptest::prelude::*;

    fn world(tag: Temporal, resources: &[(&str, &str, Term)]) -> FactStore {
        let resources: Vec<Resource> = resources
            .iter()
            .map(|(n, t, p)| Resource::new(*n, *t, p.clone(), tag))
            .collect();
        FactStore::new().with_resources(&resources)
    }

    fn size(n: i64) -> Term {
        Term::map([("size", Term::Int(n))])
    }

    #[test]
    fn test_simple_update() {
        let existing = world(Temporal::Existing, &[("x", "disk", size(1))]);
        let desired = world(Temporal::Desired, &[("x", "disk", size(2))]);

        let changeset = ChangesetComputer::new().compute(&existing, &desired).unwrap();

        assert!(changeset.creates.is_empty());
        assert!(changeset.deletes.is_empty());
        assert_eq!(changeset.updates.len(), 1);
        assert_eq!(
            changeset.updates[0].changes,
            vec![ParamChange {
                path: String::from("size"),
                old: Some(Term::Int(1)),
                new: Some(Term::Int(2)),
            }]
        );

        let ops = changeset.operations();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Update);
    }

    #[test]
    fn test_bucket_tag_update() {
        let tags = |smell: &str| Term::map([("tags", Term::map([("smells", Term::str(smell))]))]);
        let existing = world(Temporal::Existing, &[("example", "aws_s3_bucket", tags("bad"))]);
        let desired = world(Temporal::Desired, &[("example", "aws_s3_bucket", tags("good"))]);

        let changeset = ChangesetComputer::new().compute(&existing, &desired).unwrap();

        assert_eq!(changeset.change_count(), 1);
        let update = &changeset.updates[0];
        assert_eq!(update.old.params, tags("bad"));
        assert_eq!(update.new.params, tags("good"));
        assert_eq!(
            update.changes,
            vec![ParamChange {
                path: String::from("tags.smells"),
                old: Some(Term::str("bad")),
                new: Some(Term::str("good")),
            }]
        );

        let ops = changeset.operations();
        assert_eq!(ops[0].to_string(), "update aws_s3_bucket.example");
        assert_eq!(ops[0].old_params, Some(tags("bad")));
        assert_eq!(ops[0].new_params, Some(tags("good")));
    }

    #[test]
    fn test_create_delete_unchanged() {
        let existing = world(
            Temporal::Existing,
            &[("a", "instance", Term::empty_map()), ("keep", "disk", size(1))],
        );
        let desired = world(
            Temporal::Desired,
            &[("b", "instance", Term::empty_map()), ("keep", "disk", size(1))],
        );

        let changeset = ChangesetComputer::new().compute(&existing, &desired).unwrap();

        assert_eq!(changeset.creates[0].name, "b");
        assert_eq!(changeset.deletes[0].name, "a");
        assert_eq!(changeset.unchanged[0].name, "keep");
        assert_eq!(changeset.change_count(), 2);
    }

    #[test]
    fn test_same_name_different_type_is_distinct() {
        let existing = world(Temporal::Existing, &[("web", "instance", Term::empty_map())]);
        let desired = world(Temporal::Desired, &[("web", "dns", Term::empty_map())]);

        let changeset = ChangesetComputer::new().compute(&existing, &desired).unwrap();
        assert_eq!(changeset.creates.len(), 1);
        assert_eq!(changeset.deletes.len(), 1);
    }

    #[test]
    fn test_ambiguous_resource() {
        let existing = FactStore::new();
        let desired = world(
            Temporal::Desired,
            &[("x", "disk", size(1)), ("x", "disk", size(2))],
        );

        let err = ChangesetComputer::new()
            .compute(&existing, &desired)
            .unwrap_err();
        match err {
            HalldyllError::Changeset(ChangesetError::AmbiguousResource {
                name,
                tag,
                candidates,
                ..
            }) => {
                assert_eq!(name, "x");
                assert_eq!(tag, "desired");
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nested_param_diff() {
        let old = Term::map([
            ("tags", Term::map([("env", Term::str("dev")), ("team", Term::str("a"))])),
            ("ports", Term::List(vec![Term::Int(80)])),
        ]);
        let new = Term::map([
            ("tags", Term::map([("env", Term::str("prod"))])),
            ("ports", Term::List(vec![Term::Int(80), Term::Int(443)])),
        ]);

        let paths: Vec<String> = ChangesetComputer::diff_params(&old, &new)
            .into_iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            paths,
            vec![
                "ports: [80] -> [80, 443]",
                "tags.env: dev -> prod",
                "tags.team: - a",
            ]
        );
    }

    fn arb_world() -> impl Strategy<Value = Vec<(String, String, i64)>> {
        prop::collection::btree_map(("[a-d]", "(disk|instance)"), 0i64..3, 0..8)
            .prop_map(|m| m.into_iter().map(|((n, t), s)| (n, t, s)).collect())
    }

    proptest! {
        #[test]
        fn prop_changeset_is_complete_and_disjoint(old in arb_world(), new in arb_world()) {
            let to_world = |tag, items: &[(String, String, i64)]| {
                let resources: Vec<Resource> = items
                    .iter()
                    .map(|(n, t, s)| Resource::new(n.clone(), t.clone(), size(*s), tag))
                    .collect();
                FactStore::new().with_resources(&resources)
            };
            let changeset = ChangesetComputer::new()
                .compute(&to_world(Temporal::Existing, &old), &to_world(Temporal::Desired, &new))
                .unwrap();

            let created: BTreeSet<ResourceKey> = changeset.creates.iter().map(Resource::key).collect();
            let updated: BTreeSet<ResourceKey> = changeset.updates.iter().map(|u| u.new.key()).collect();
            let deleted: BTreeSet<ResourceKey> = changeset.deletes.iter().map(Resource::key).collect();
            let kept: BTreeSet<ResourceKey> = changeset.unchanged.iter().map(Resource::key).collect();

            let old_keys: BTreeSet<ResourceKey> =
                old.iter().map(|(n, t, _)| ResourceKey::new(t, n)).collect();
            let new_keys: BTreeSet<ResourceKey> =
                new.iter().map(|(n, t, _)| ResourceKey::new(t, n)).collect();

            prop_assert_eq!(&created, &new_keys.difference(&old_keys).cloned().collect::<BTreeSet<_>>());
            prop_assert_eq!(&deleted, &old_keys.difference(&new_keys).cloned().collect::<BTreeSet<_>>());
            let both: BTreeSet<ResourceKey> = old_keys.intersection(&new_keys).cloned().collect();
            prop_assert_eq!(&updated.union(&kept).cloned().collect::<BTreeSet<_>>(), &both);
            prop_assert!(updated.is_disjoint(&kept));
            prop_assert_eq!(
                changeset.operations().len(),
                created.len() + updated.len() + deleted.len()
            );
        }
    }
}
