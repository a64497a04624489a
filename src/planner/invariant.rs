//! Invariant checking.
//!
//! An invariant holds in a state when its conjunction of patterns has at
//! least one solution in that state's world. Declared invariants apply to
//! every state; `always(...)` facts only to the world they were derived in.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

use crate::facts::{ALWAYS, Atom, FactStore};

/// A declared invariant.
///
/// ```yaml
/// name: dns-up
/// always:
///   - {resource: [dns, dns_server, _]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invariant {
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Patterns that must be jointly satisfiable.
    pub always: Vec<Atom>,
}

/// Checks worlds against invariants.
#[derive(Debug, Clone, Default)]
pub struct InvariantChecker {
    /// Invariants checked in every state.
    declared: Vec<Invariant>,
}

/// Outcome of checking one world.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvariantReport {
    /// Number of invariants evaluated.
    pub checked: usize,
    /// Labels of the violated invariants, declared ones first.
    pub violations: Vec<String>,
}

impl Invariant {
    /// Creates an unnamed invariant.
    #[must_use]
    pub const fn new(always: Vec<Atom>) -> Self {
        Self { name: None, always }
    }

    /// Sets the invariant name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name, or the rendered patterns for unnamed invariants.
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| render(&self.always))
    }

    /// Decodes an `always(...)` fact; each argument is one pattern.
    ///
    /// Returns `None` for other predicates or malformed arguments.
    #[must_use]
    pub fn from_fact(fact: &Atom) -> Option<Self> {
        if fact.predicate != ALWAYS || fact.args.is_empty() {
            return None;
        }
        fact.args
            .iter()
            .map(Atom::from_term)
            .collect::<Option<Vec<_>>>()
            .map(Self::new)
    }

    /// Returns true if the invariant holds in `world`.
    #[must_use]
    pub fn holds(&self, world: &FactStore) -> bool {
        world.satisfies(&self.always)
    }
}

fn render(atoms: &[Atom]) -> String {
    let inner: Vec<String> = atoms.iter().map(ToString::to_string).collect();
    format!("always({})", inner.join(", "))
}

impl InvariantChecker {
    /// Creates a checker for the declared invariants.
    #[must_use]
    pub const fn new(declared: Vec<Invariant>) -> Self {
        Self { declared }
    }

    /// Returns the declared invariants.
    #[must_use]
    pub fn declared(&self) -> &[Invariant] {
        &self.declared
    }

    /// Checks the declared invariants and the `always` facts of `world`.
    #[must_use]
    pub fn check(&self, world: &FactStore) -> InvariantReport {
        let mut report = InvariantReport::default();

        for invariant in &self.declared {
            report.checked += 1;
            if !invariant.holds(world) {
                report.violations.push(invariant.label());
            }
        }

        for fact in world.with_predicate(ALWAYS) {
            let Some(invariant) = Invariant::from_fact(fact) else {
                warn!("Skipping malformed invariant fact: {fact}");
                continue;
            };
            report.checked += 1;
            if !invariant.holds(world) {
                report.violations.push(invariant.label());
            }
        }

        report
    }
}

impl InvariantReport {
    /// Returns true if no invariant is violated.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.violations.is_empty()
    }

    /// Returns the first violated invariant.
    #[must_use]
    pub fn first_violation(&self) -> Option<&str> {
        self.violations.first().map(String::as_str)
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Resource, Temporal, Term};

    fn has_live_target(lb: &str) -> Atom {
        Atom::new("has_live_target", vec![Term::str(lb)])
    }

    #[test]
    fn test_parse_declared_invariant() {
        let yaml = r"
name: dns-up
always:
  - {resource: [dns, dns_server, _]}
";
        let invariant: Invariant = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(invariant.label(), "dns-up");

        let dns = Resource::new("dns", "dns_server", Term::empty_map(), Temporal::Existing);
        assert!(invariant.holds(&FactStore::new().with_resources([&dns])));
        assert!(!invariant.holds(&FactStore::new()));
    }

    #[test]
    fn test_derived_invariant_facts() {
        let always = Atom::new(ALWAYS, vec![has_live_target("lb").to_term()]);
        let world = FactStore::from_facts([always]);
        let checker = InvariantChecker::default();

        let report = checker.check(&world);
        assert_eq!(report.checked, 1);
        assert_eq!(report.first_violation(), Some("always(has_live_target(lb))"));

        let satisfied = world.with_facts([has_live_target("lb")]);
        assert!(checker.check(&satisfied).is_satisfied());
    }

    #[test]
    fn test_malformed_always_fact_is_skipped() {
        let world = FactStore::from_facts([Atom::new(ALWAYS, vec![Term::str("oops")])]);
        let report = InvariantChecker::default().check(&world);
        assert_eq!(report.checked, 0);
        assert!(report.is_satisfied());
    }

    #[test]
    fn test_declared_checked_everywhere() {
        let checker = InvariantChecker::new(vec![Invariant::new(vec![has_live_target("lb")])]);
        assert!(!checker.check(&FactStore::new()).is_satisfied());
        assert_eq!(checker.declared().len(), 1);
    }
}
