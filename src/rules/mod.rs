//! Rules and fixed-point derivation.

mod evaluator;
mod rule;

pub use evaluator::{DEFAULT_MAX_ITERATIONS, RuleEvaluator};
pub use rule::Rule;
