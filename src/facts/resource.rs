//! Resource facts.
//!
//! A resource is a `(name, type, params)` triple tagged with the world it
//! belongs to. Inside a world it is stored as a `resource(name, type, params)`
//! atom so rules and queries can match it like any other fact.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::atom::{Atom, RESOURCE};
use super::term::Term;

/// Which world a resource fact describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temporal {
    /// The infrastructure as it is now.
    Existing,
    /// The infrastructure as it should be.
    #[default]
    Desired,
}

/// Identity of a resource: `(type, name)`, ordered type first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceKey {
    /// Resource type.
    pub resource_type: String,
    /// Resource name.
    pub name: String,
}

/// A declared or derived infrastructure resource.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Resource {
    /// Resource name.
    pub name: String,
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: String,
    /// Nested parameters.
    #[serde(default = "Term::empty_map")]
    pub params: Term,
    /// World this resource belongs to.
    #[serde(default)]
    pub tag: Temporal,
}

impl Temporal {
    /// Returns the lowercase name of the world.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Existing => "existing",
            Self::Desired => "desired",
        }
    }
}

impl ResourceKey {
    /// Creates a new key.
    #[must_use]
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl Resource {
    /// Creates a new resource.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        resource_type: impl Into<String>,
        params: Term,
        tag: Temporal,
    ) -> Self {
        Self {
            name: name.into(),
            resource_type: resource_type.into(),
            params,
            tag,
        }
    }

    /// Returns a copy tagged with another world.
    #[must_use]
    pub fn with_tag(mut self, tag: Temporal) -> Self {
        self.tag = tag;
        self
    }

    /// Returns the `(type, name)` identity of the resource.
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.resource_type, &self.name)
    }

    /// Encodes the resource as a `resource(name, type, params)` fact.
    #[must_use]
    pub fn to_atom(&self) -> Atom {
        Atom::new(
            RESOURCE,
            vec![
                Term::str(&self.name),
                Term::str(&self.resource_type),
                self.params.clone(),
            ],
        )
    }

    /// Decodes a `resource(name, type, params)` fact.
    ///
    /// Returns `None` for atoms of another predicate or shape.
    #[must_use]
    pub fn from_atom(atom: &Atom, tag: Temporal) -> Option<Self> {
        if atom.predicate != RESOURCE {
            return None;
        }
        match atom.args.as_slice() {
            [Term::Str(name), Term::Str(resource_type), params] => Some(Self::new(
                name.clone(),
                resource_type.clone(),
                params.clone(),
                tag,
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Temporal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.resource_type, self.name, self.params)
    }
}
