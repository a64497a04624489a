//! Structural terms.
//!
//! A term is the value carried by a fact argument (a resource name, a nested
//! parameter map, ...) and, when it contains variables or wildcards, the
//! pattern matched against such values.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ConfigError;

/// Prefix marking a variable in document form (`"?Name"`).
pub const VARIABLE_PREFIX: char = '?';

/// Document form of the wildcard.
pub const WILDCARD: &str = "_";

/// A nested structural value, possibly containing variables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub enum Term {
    /// Explicit null.
    Null,
    /// Boolean scalar.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// String scalar.
    Str(String),
    /// Positional sequence.
    List(Vec<Term>),
    /// Keyed structure with ordered keys.
    Map(BTreeMap<String, Term>),
    /// Named variable, bound by matching.
    Var(String),
    /// Matches anything and binds nothing.
    Wildcard,
}

/// Variable bindings produced by matching.
pub type Bindings = BTreeMap<String, Term>;

impl Term {
    /// Creates a string term.
    #[must_use]
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    /// Creates a variable term.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Creates a map term from key/value pairs.
    #[must_use]
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Self)>) -> Self {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Creates an empty map term.
    #[must_use]
    pub const fn empty_map() -> Self {
        Self::Map(BTreeMap::new())
    }

    /// Returns the string payload of a string term.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the entries of a map term.
    #[must_use]
    pub const fn as_map(&self) -> Option<&BTreeMap<String, Self>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a key in a map term.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Self> {
        self.as_map().and_then(|m| m.get(key))
    }

    /// Returns true if the term contains no variables and no wildcards.
    #[must_use]
    pub fn is_ground(&self) -> bool {
        match self {
            Self::Var(_) | Self::Wildcard => false,
            Self::List(items) => items.iter().all(Self::is_ground),
            Self::Map(entries) => entries.values().all(Self::is_ground),
            Self::Null | Self::Bool(_) | Self::Int(_) | Self::Str(_) => true,
        }
    }

    /// Returns true if the term contains a wildcard anywhere.
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        match self {
            Self::Wildcard => true,
            Self::List(items) => items.iter().any(Self::has_wildcard),
            Self::Map(entries) => entries.values().any(Self::has_wildcard),
            _ => false,
        }
    }

    /// Collects the names of all variables in the term.
    pub fn collect_variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Self::Var(name) => {
                out.insert(name.clone());
            }
            Self::List(items) => items.iter().for_each(|t| t.collect_variables(out)),
            Self::Map(entries) => entries.values().for_each(|t| t.collect_variables(out)),
            _ => {}
        }
    }

    /// Replaces bound variables with their values; unbound ones are kept.
    #[must_use]
    pub fn substitute(&self, bindings: &Bindings) -> Self {
        match self {
            Self::Var(name) => bindings.get(name).cloned().unwrap_or_else(|| self.clone()),
            Self::List(items) => Self::List(items.iter().map(|t| t.substitute(bindings)).collect()),
            Self::Map(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.substitute(bindings)))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// Returns true if `self` is a sub-structure of `other`.
    ///
    /// Every key of a map must be present (and contained) in the other map,
    /// lists are compared positionally as prefixes, scalars by equality.
    #[must_use]
    pub fn is_contained_in(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Map(mine), Self::Map(theirs)) => mine
                .iter()
                .all(|(k, v)| theirs.get(k).is_some_and(|t| v.is_contained_in(t))),
            (Self::List(mine), Self::List(theirs)) => {
                mine.len() <= theirs.len()
                    && mine.iter().zip(theirs).all(|(a, b)| a.is_contained_in(b))
            }
            _ => self == other,
        }
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl TryFrom<serde_json::Value> for Term {
    type Error = ConfigError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        Ok(match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => {
                    return Err(ConfigError::invalid_term(format!(
                        "only integers are supported, got {n}"
                    )));
                }
            },
            Value::String(s) => {
                if s == WILDCARD {
                    Self::Wildcard
                } else if let Some(name) = s.strip_prefix(VARIABLE_PREFIX) {
                    if name.is_empty() {
                        return Err(ConfigError::invalid_term("variable without a name: '?'"));
                    }
                    Self::Var(name.to_string())
                } else {
                    Self::Str(s)
                }
            }
            Value::Array(items) => Self::List(
                items
                    .into_iter()
                    .map(Self::try_from)
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(entries) => Self::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| Self::try_from(v).map(|t| (k, t)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

impl From<Term> for serde_json::Value {
    fn from(term: Term) -> Self {
        match term {
            Term::Null => Self::Null,
            Term::Bool(b) => Self::Bool(b),
            Term::Int(i) => Self::from(i),
            Term::Str(s) => Self::String(s),
            Term::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Term::Map(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
            Term::Var(name) => Self::String(format!("{VARIABLE_PREFIX}{name}")),
            Term::Wildcard => Self::String(WILDCARD.to_string()),
        }
    }
}

/// Strings that can be displayed without quotes.
fn is_bare(s: &str) -> bool {
    !s.is_empty()
        && s != WILDCARD
        && !s.starts_with(VARIABLE_PREFIX)
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ':'))
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) if is_bare(s) => write!(f, "{s}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Var(name) => write!(f, "{VARIABLE_PREFIX}{name}"),
            Self::Wildcard => write!(f, "{WILDCARD}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_variables_and_wildcards() {
        let yaml = r#"
target: "?T"
zone: _
tags:
  env: prod
ports: [80, 443]
"#;
        let term: Term = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(term.get("target"), Some(&Term::var("T")));
        assert_eq!(term.get("zone"), Some(&Term::Wildcard));
        assert_eq!(term.get("tags").and_then(|t| t.get("env")), Some(&Term::str("prod")));
        assert_eq!(
            term.get("ports"),
            Some(&Term::List(vec![Term::Int(80), Term::Int(443)]))
        );
        assert!(!term.is_ground());
    }

    #[test]
    fn test_reject_floats() {
        let result: Result<Term, _> = serde_yaml::from_str("size: 1.5");
        assert!(result.is_err());
    }

    #[test]
    fn test_serialize_roundtrips_variables() {
        let term = Term::map([("target", Term::var("T")), ("any", Term::Wildcard)]);
        let json = serde_json::to_string(&term).unwrap();
        assert_eq!(json, r#"{"any":"_","target":"?T"}"#);
    }

    #[test]
    fn test_substitute() {
        let pattern = Term::map([("target", Term::var("T")), ("other", Term::var("U"))]);
        let mut bindings = Bindings::new();
        bindings.insert(String::from("T"), Term::str("b"));

        let result = pattern.substitute(&bindings);
        assert_eq!(result.get("target"), Some(&Term::str("b")));
        assert_eq!(result.get("other"), Some(&Term::var("U")));
    }

    #[test]
    fn test_is_contained_in() {
        let big = Term::map([
            ("tags", Term::map([("smells", Term::str("bad")), ("env", Term::str("dev"))])),
            ("ports", Term::List(vec![Term::Int(1), Term::Int(2)])),
        ]);
        let small = Term::map([("tags", Term::map([("smells", Term::str("bad"))]))]);
        let prefix = Term::map([("ports", Term::List(vec![Term::Int(1)]))]);

        assert!(small.is_contained_in(&big));
        assert!(prefix.is_contained_in(&big));
        assert!(!big.is_contained_in(&small));
    }

    #[test]
    fn test_display() {
        let term = Term::map([
            ("target", Term::str("b")),
            ("label", Term::str("two words")),
            ("x", Term::var("X")),
        ]);
        assert_eq!(term.to_string(), r#"{label: "two words", target: b, x: ?X}"#);
    }
}
