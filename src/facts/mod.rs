//! Facts, terms and structural matching.
//!
//! This module provides:
//! - Structural terms with variables and wildcards
//! - Atoms and resource facts
//! - Immutable, predicate-indexed fact snapshots
//! - Conjunctive queries over a snapshot

mod atom;
mod matcher;
mod resource;
mod store;
mod term;

pub use atom::{ALWAYS, Atom, DEPENDS_ON, RESOURCE, depends_on};
pub use matcher::{Solutions, match_atom, match_term};
pub use resource::{Resource, ResourceKey, Temporal};
pub use store::{Candidates, FactStore};
pub use term::{Bindings, Term, VARIABLE_PREFIX, WILDCARD};
