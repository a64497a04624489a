//! Atoms: `predicate(arg, ...)` facts and patterns.
//!
//! In documents an atom is written as a single-key map whose value is the
//! argument list, e.g. `{depends_on: [lb, b]}`.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ConfigError;

use super::term::{Bindings, Term};

/// Predicate of resource facts: `resource(name, type, params)`.
pub const RESOURCE: &str = "resource";

/// Predicate of dependency facts: `depends_on(from, to)`.
pub const DEPENDS_ON: &str = "depends_on";

/// Predicate of invariant instances: `always(inner)`.
pub const ALWAYS: &str = "always";

/// A predicate applied to positional term arguments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(
    try_from = "BTreeMap<String, Vec<Term>>",
    into = "BTreeMap<String, Vec<Term>>"
)]
pub struct Atom {
    /// Predicate name.
    pub predicate: String,
    /// Positional arguments.
    pub args: Vec<Term>,
}

impl Atom {
    /// Creates a new atom.
    #[must_use]
    pub fn new(predicate: impl Into<String>, args: Vec<Term>) -> Self {
        Self {
            predicate: predicate.into(),
            args,
        }
    }

    /// Returns the number of arguments.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.args.len()
    }

    /// Returns true if no argument contains a variable or wildcard.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::is_ground)
    }

    /// Returns true if any argument contains a wildcard.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.args.iter().any(Term::has_wildcard)
    }

    /// Returns the names of all variables in the atom.
    #[must_use]
    pub fn variables(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for arg in &self.args {
            arg.collect_variables(&mut out);
        }
        out
    }

    /// Replaces bound variables with their values.
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Self {
        Self {
            predicate: self.predicate.clone(),
            args: self.args.iter().map(|a| a.substitute(bindings)).collect(),
        }
    }

    /// Substitutes the bindings and requires the result to be ground.
    ///
    /// # Errors
    ///
    /// Returns the name of the first variable left unbound.
    pub fn instantiate(&self, bindings: &Bindings) -> Result<Self, String> {
        let atom = self.substitute(bindings);
        match atom.variables().into_iter().next() {
            Some(unbound) => Err(unbound),
            None => Ok(atom),
        }
    }

    /// Encodes the atom as a term, as nested inside `always(...)` facts.
    #[must_use]
    pub fn to_term(&self) -> Term {
        Term::map([(self.predicate.clone(), Term::List(self.args.clone()))])
    }

    /// Decodes an atom previously encoded with [`Atom::to_term`].
    #[must_use]
    pub fn from_term(term: &Term) -> Option<Self> {
        let entries = term.as_map()?;
        if entries.len() != 1 {
            return None;
        }
        let (predicate, args) = entries.iter().next()?;
        match args {
            Term::List(args) => Some(Self::new(predicate.clone(), args.clone())),
            _ => None,
        }
    }
}

impl TryFrom<BTreeMap<String, Vec<Term>>> for Atom {
    type Error = ConfigError;

    fn try_from(value: BTreeMap<String, Vec<Term>>) -> Result<Self, Self::Error> {
        if value.len() != 1 {
            return Err(ConfigError::invalid_atom(format!(
                "expected a single predicate, found {} keys",
                value.len()
            )));
        }
        let Some((predicate, args)) = value.into_iter().next() else {
            return Err(ConfigError::invalid_atom("empty atom"));
        };
        if predicate.is_empty() {
            return Err(ConfigError::invalid_atom("empty predicate name"));
        }
        Ok(Self { predicate, args })
    }
}

impl From<Atom> for BTreeMap<String, Vec<Term>> {
    fn from(atom: Atom) -> Self {
        Self::from([(atom.predicate, atom.args)])
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.predicate)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Builds a `depends_on(from, to)` fact.
#[must_use]
pub fn depends_on(from: &str, to: &str) -> Atom {
    Atom::new(DEPENDS_ON, vec![Term::str(from), Term::str(to)])
}
