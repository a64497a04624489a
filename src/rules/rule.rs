//! Derivation rules.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::EvalError;
use crate::facts::{Atom, FactStore};

/// A rule `head :- body`: every solution of the body yields one head fact.
///
/// ```yaml
/// name: lb-needs-target
/// head: {always: [{has_live_target: ["?LB"]}]}
/// body:
///   - {resource: ["?LB", lb, _]}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Rule {
    /// Optional human-readable name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Atom derived for each body solution.
    pub head: Atom,
    /// Conjunction of patterns.
    #[serde(default)]
    pub body: Vec<Atom>,
}

impl Rule {
    /// Creates an unnamed rule.
    #[must_use]
    pub const fn new(head: Atom, body: Vec<Atom>) -> Self {
        Self {
            name: None,
            head,
            body,
        }
    }

    /// Sets the rule name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns the name, or the rendered head for unnamed rules.
    #[must_use]
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.head.to_string())
    }

    /// Returns head variables that no body pattern binds.
    #[must_use]
    pub fn unbound_head_variables(&self) -> BTreeSet<String> {
        let bound: BTreeSet<String> = self.body.iter().flat_map(Atom::variables).collect();
        self.head
            .variables()
            .into_iter()
            .filter(|v| !bound.contains(v))
            .collect()
    }

    /// Returns true if the rule derives resource facts.
    #[must_use]
    pub fn derives_resources(&self) -> bool {
        self.head.predicate == crate::facts::RESOURCE
    }

    /// Instantiates the head for every body solution in `store`.
    ///
    /// # Errors
    ///
    /// Returns `UnboundHeadVariable` if a solution leaves a head variable
    /// unbound.
    pub fn derive(&self, store: &FactStore) -> Result<Vec<Atom>, EvalError> {
        store
            .query(&self.body)
            .map(|bindings| {
                self.head
                    .instantiate(&bindings)
                    .map_err(|variable| EvalError::UnboundHeadVariable {
                        rule: self.label(),
                        variable,
                    })
            })
            .collect()
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (i, atom) in self.body.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{atom}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Term, depends_on};

    fn reachable() -> Rule {
        Rule::new(
            Atom::new("reachable", vec![Term::var("A"), Term::var("B")]),
            vec![Atom::new("depends_on", vec![Term::var("A"), Term::var("B")])],
        )
    }

    #[test]
    fn test_parse_rule() {
        let yaml = r#"
name: lb-needs-target
head: {always: [{has_live_target: ["?LB"]}]}
body:
  - {resource: ["?LB", lb, _]}
"#;
        let rule: Rule = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(rule.label(), "lb-needs-target");
        assert_eq!(rule.body.len(), 1);
        assert!(rule.unbound_head_variables().is_empty());
        assert_eq!(
            rule.to_string(),
            "always({has_live_target: [?LB]}) :- resource(?LB, lb, _)"
        );
    }

    #[test]
    fn test_derive_instantiates_head() {
        let store = FactStore::from_facts([depends_on("app", "db"), depends_on("db", "disk")]);
        let derived = reachable().derive(&store).unwrap();

        assert_eq!(derived.len(), 2);
        assert_eq!(derived[0].to_string(), "reachable(app, db)");
    }

    #[test]
    fn test_unbound_head_variable() {
        let rule = Rule::new(
            Atom::new("orphan", vec![Term::var("X"), Term::var("Y")]),
            vec![Atom::new("depends_on", vec![Term::var("X"), Term::Wildcard])],
        )
        .with_name("orphan");

        assert_eq!(
            rule.unbound_head_variables().into_iter().collect::<Vec<_>>(),
            vec![String::from("Y")]
        );

        let store = FactStore::from_facts([depends_on("a", "b")]);
        let err = rule.derive(&store).unwrap_err();
        assert!(matches!(
            err,
            EvalError::UnboundHeadVariable { ref rule, ref variable } if rule == "orphan" && variable == "Y"
        ));
    }

    #[test]
    fn test_bodyless_rule_is_a_fact() {
        let rule = Rule::new(depends_on("a", "b"), vec![]);
        let derived = rule.derive(&FactStore::new()).unwrap();
        assert_eq!(derived, vec![depends_on("a", "b")]);
    }
}
