//! Structural matching of patterns against facts.
//!
//! Matching is one-sided: the candidate is a fact, the pattern may contain
//! variables and wildcards. Maps match as sub-structures (every pattern key
//! must exist in the candidate, extra candidate keys are fine) and lists match
//! positionally, the pattern list being allowed to be shorter.
//!
//! A single pattern matches a single fact in at most one way. Alternatives
//! come from the candidate facts and from conjunctions of patterns; those are
//! enumerated by [`Solutions`], a finite iterator that never prunes.

use super::atom::Atom;
use super::store::{Candidates, FactStore};
use super::term::{Bindings, Term};

/// Matches a pattern term against a candidate term.
///
/// Returns the extended bindings, or `None` if they are inconsistent.
#[must_use]
pub fn match_term(pattern: &Term, candidate: &Term, bindings: &Bindings) -> Option<Bindings> {
    let mut extended = bindings.clone();
    unify(pattern, candidate, &mut extended).then_some(extended)
}

/// Matches a pattern atom against a fact.
///
/// Predicates and arities must be equal; arguments match positionally.
#[must_use]
pub fn match_atom(pattern: &Atom, fact: &Atom, bindings: &Bindings) -> Option<Bindings> {
    if pattern.predicate != fact.predicate || pattern.arity() != fact.arity() {
        return None;
    }
    let mut extended = bindings.clone();
    pattern
        .args
        .iter()
        .zip(&fact.args)
        .all(|(p, c)| unify(p, c, &mut extended))
        .then_some(extended)
}

/// Recursive matching step; may leave partial bindings behind on failure.
fn unify(pattern: &Term, candidate: &Term, bindings: &mut Bindings) -> bool {
    match pattern {
        Term::Wildcard => true,
        Term::Var(name) => match bindings.get(name) {
            Some(bound) => bound == candidate,
            None => {
                bindings.insert(name.clone(), candidate.clone());
                true
            }
        },
        Term::Map(wanted) => {
            let Term::Map(present) = candidate else {
                return false;
            };
            wanted.iter().all(|(key, sub)| {
                present
                    .get(key)
                    .is_some_and(|value| unify(sub, value, bindings))
            })
        }
        Term::List(wanted) => {
            let Term::List(present) = candidate else {
                return false;
            };
            wanted.len() <= present.len()
                && wanted.iter().zip(present).all(|(p, c)| unify(p, c, bindings))
        }
        Term::Null | Term::Bool(_) | Term::Int(_) | Term::Str(_) => pattern == candidate,
    }
}

/// One level of the backtracking stack.
#[derive(Debug, Clone)]
struct Frame<'a> {
    /// Bindings in force before this level's pattern.
    bindings: Bindings,
    /// Facts not yet tried for this level's pattern.
    candidates: Candidates<'a>,
}

/// Every binding set satisfying a conjunction of patterns.
///
/// Enumeration is depth-first over the patterns in order, candidates in
/// store order, so the sequence is deterministic for a given snapshot. The
/// iterator is finite and can be restarted by cloning it before use or by
/// querying the store again.
#[derive(Debug, Clone)]
pub struct Solutions<'a> {
    store: &'a FactStore,
    patterns: &'a [Atom],
    stack: Vec<Frame<'a>>,
    /// Pending answer for an empty conjunction.
    unit: Option<Bindings>,
}

impl<'a> Solutions<'a> {
    /// Starts enumerating solutions from the given bindings.
    #[must_use]
    pub fn new(store: &'a FactStore, patterns: &'a [Atom], bindings: Bindings) -> Self {
        match patterns.first() {
            None => Self {
                store,
                patterns,
                stack: Vec::new(),
                unit: Some(bindings),
            },
            Some(first) => Self {
                store,
                patterns,
                stack: vec![Frame {
                    bindings,
                    candidates: store.with_predicate(&first.predicate),
                }],
                unit: None,
            },
        }
    }
}

impl Iterator for Solutions<'_> {
    type Item = Bindings;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(bindings) = self.unit.take() {
            return Some(bindings);
        }

        loop {
            let depth = self.stack.len().checked_sub(1)?;
            let frame = self.stack.last_mut()?;

            let Some(fact) = frame.candidates.next() else {
                self.stack.pop();
                continue;
            };
            let Some(bindings) = match_atom(&self.patterns[depth], fact, &frame.bindings) else {
                continue;
            };

            match self.patterns.get(depth + 1) {
                None => return Some(bindings),
                Some(next) => {
                    let candidates = self.store.with_predicate(&next.predicate);
                    self.stack.push(Frame {
                        bindings,
                        candidates,
                    });
                }
            }
        }
    }
}
