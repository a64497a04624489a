//! Immutable fact snapshots.
//!
//! A [`FactStore`] is never mutated once built: asserting facts produces a
//! new snapshot. Facts are indexed by predicate so the matcher only visits
//! candidates that can possibly match.

use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

use super::atom::{Atom, RESOURCE};
use super::matcher::Solutions;
use super::resource::{Resource, Temporal};
use super::term::Bindings;

/// Iterator over the facts of one predicate.
pub type Candidates<'a> = std::iter::Flatten<std::option::IntoIter<&'a BTreeSet<Atom>>>;

/// An immutable set of facts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactStore {
    /// Facts grouped by predicate.
    facts: BTreeMap<String, BTreeSet<Atom>>,
    /// Total number of facts.
    len: usize,
}

impl FactStore {
    /// Creates an empty store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            facts: BTreeMap::new(),
            len: 0,
        }
    }

    /// Builds a store from a collection of facts.
    #[must_use]
    pub fn from_facts(facts: impl IntoIterator<Item = Atom>) -> Self {
        let mut store = Self::new();
        for fact in facts {
            store.insert(fact);
        }
        store
    }

    /// Returns a new snapshot holding these facts plus the given ones.
    #[must_use]
    pub fn with_facts(&self, facts: impl IntoIterator<Item = Atom>) -> Self {
        let mut store = self.clone();
        for fact in facts {
            store.insert(fact);
        }
        store
    }

    /// Returns a new snapshot holding the given resources as facts.
    #[must_use]
    pub fn with_resources<'r>(&self, resources: impl IntoIterator<Item = &'r Resource>) -> Self {
        self.with_facts(resources.into_iter().map(Resource::to_atom))
    }

    fn insert(&mut self, fact: Atom) -> bool {
        let inserted = self
            .facts
            .entry(fact.predicate.clone())
            .or_default()
            .insert(fact);
        if inserted {
            self.len += 1;
        }
        inserted
    }

    /// Returns true if the exact fact is present.
    #[must_use]
    pub fn contains(&self, fact: &Atom) -> bool {
        self.facts
            .get(&fact.predicate)
            .is_some_and(|set| set.contains(fact))
    }

    /// Returns the number of facts.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the store holds no facts.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Iterates over all facts, grouped by predicate.
    pub fn iter(&self) -> impl Iterator<Item = &Atom> {
        self.facts.values().flatten()
    }

    /// Iterates over the facts of one predicate.
    #[must_use]
    pub fn with_predicate(&self, predicate: &str) -> Candidates<'_> {
        self.facts.get(predicate).into_iter().flatten()
    }

    /// Returns the predicates present in the store.
    pub fn predicates(&self) -> impl Iterator<Item = &str> {
        self.facts.keys().map(String::as_str)
    }

    /// Decodes every well-formed `resource/3` fact, tagged with `tag`.
    ///
    /// Malformed resource facts are skipped with a warning.
    #[must_use]
    pub fn resources(&self, tag: Temporal) -> Vec<Resource> {
        self.with_predicate(RESOURCE)
            .filter_map(|atom| {
                let resource = Resource::from_atom(atom, tag);
                if resource.is_none() {
                    warn!("Ignoring malformed resource fact: {atom}");
                }
                resource
            })
            .collect()
    }

    /// Enumerates every binding set satisfying the conjunction of patterns.
    #[must_use]
    pub fn query<'a>(&'a self, patterns: &'a [Atom]) -> Solutions<'a> {
        Solutions::new(self, patterns, Bindings::new())
    }

    /// Like [`FactStore::query`], starting from existing bindings.
    #[must_use]
    pub fn query_with<'a>(&'a self, patterns: &'a [Atom], bindings: Bindings) -> Solutions<'a> {
        Solutions::new(self, patterns, bindings)
    }

    /// Returns true if the conjunction of patterns has at least one solution.
    #[must_use]
    pub fn satisfies(&self, patterns: &[Atom]) -> bool {
        self.query(patterns).next().is_some()
    }
}

impl FromIterator<Atom> for FactStore {
    fn from_iter<T: IntoIterator<Item = Atom>>(iter: T) -> Self {
        Self::from_facts(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::atom::depends_on;
    use crate::facts::term::Term;

    #[test]
    fn test_snapshots_are_independent() {
        let base = FactStore::from_facts([depends_on("lb", "a")]);
        let extended = base.with_facts([depends_on("lb", "b")]);

        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(!base.contains(&depends_on("lb", "b")));
        assert!(extended.contains(&depends_on("lb", "b")));
    }

    #[test]
    fn test_duplicates_are_collapsed() {
        let store = FactStore::from_facts([depends_on("x", "y"), depends_on("x", "y")]);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_resources_by_predicate() {
        let lb = Resource::new("lb", "lb", Term::empty_map(), Temporal::Existing);
        let store = FactStore::new()
            .with_resources([&lb])
            .with_facts([depends_on("lb", "a")]);

        assert_eq!(store.resources(Temporal::Existing), vec![lb]);
        assert_eq!(store.with_predicate("depends_on").count(), 1);
        assert_eq!(store.with_predicate("missing").count(), 0);
        assert_eq!(store.predicates().collect::<Vec<_>>(), vec!["depends_on", "resource"]);
    }
}
