//! Planning input fingerprints.
//!
//! A fingerprint identifies everything a plan was computed from, so equal
//! inputs give equal fingerprints and a saved plan can be checked against
//! the current document before it is applied.

use sha2::{Digest, Sha256};

use crate::engine::PlanningInput;
use crate::facts::Resource;

/// Hasher for computing planning input fingerprints.
#[derive(Debug, Default)]
pub struct ConfigHasher;

impl ConfigHasher {
    /// Creates a new hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the fingerprint of a planning input.
    ///
    /// Every section is rendered and sorted first, so declaration order
    /// does not matter.
    #[must_use]
    pub fn fingerprint(&self, input: &PlanningInput) -> String {
        let mut hasher = Sha256::new();

        hash_section(&mut hasher, "existing", input.existing.iter().map(render_resource));
        hash_section(&mut hasher, "desired", input.desired.iter().map(render_resource));
        hash_section(&mut hasher, "facts", input.facts.iter().map(ToString::to_string));
        hash_section(
            &mut hasher,
            "rules",
            input
                .rules
                .iter()
                .map(|r| format!("{} {r}", r.name.as_deref().unwrap_or_default())),
        );
        hash_section(
            &mut hasher,
            "invariants",
            input.invariants.iter().map(|i| format!("{} {i}", i.label())),
        );

        hasher.update(b"settings");
        hasher.update(input.max_iterations.to_be_bytes());
        hasher.update(input.max_search_states.to_be_bytes());

        hex::encode(hasher.finalize())
    }

    /// Computes a short hash (first 8 characters) for display purposes.
    #[must_use]
    pub fn short_hash(&self, hash: &str) -> String {
        hash.chars().take(8).collect()
    }

    /// Compares two hashes to determine if they are equal.
    #[must_use]
    pub fn hashes_match(hash1: &str, hash2: &str) -> bool {
        if hash1.len() != hash2.len() {
            return false;
        }

        hash1
            .bytes()
            .zip(hash2.bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

fn render_resource(resource: &Resource) -> String {
    resource.to_atom().to_string()
}

/// Hashes a labelled, sorted and length-prefixed list of lines.
fn hash_section(hasher: &mut Sha256, label: &str, lines: impl Iterator<Item = String>) {
    let mut lines: Vec<String> = lines.collect();
    lines.sort_unstable();

    hasher.update(label.as_bytes());
    hasher.update(lines.len().to_be_bytes());
    for line in lines {
        hasher.update(line.len().to_be_bytes());
        hasher.update(line.as_bytes());
    }
}
