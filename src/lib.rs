// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # Halldyll Plan
//!
//! An invariant-aware change planner for declarative infrastructure.
//!
//! ## Overview
//!
//! Halldyll compares the infrastructure that exists with the infrastructure
//! you want and produces an ordered plan of creates, updates and deletes:
//!
//! - Describe both worlds as resource facts in a YAML plan document
//! - Derive extra facts with Datalog-style rules
//! - Declare invariants that must hold before, during and after the change
//! - Get batches that respect dependencies and keep every invariant true
//!
//! ## Architecture
//!
//! Planning is a pipeline of pure steps:
//!
//! 1. **Worlds**: existing and desired facts closed under the rules
//! 2. **Changeset**: resources to create, update and delete
//! 3. **Dependency graph**: ordering edges between those operations
//! 4. **Synthesis**: topological batches, reordered when an intermediate
//!    state would break an invariant
//!
//! ## Modules
//!
//! - [`facts`]: Terms, atoms, fact stores and structural matching
//! - [`rules`]: Rules and the fixed-point evaluator
//! - [`planner`]: Changesets, dependency graphs, invariants and plans
//! - [`engine`]: The planning pipeline over one input
//! - [`config`]: Plan document parsing, validation and fingerprinting
//! - [`provider`]: Existing-state sources and execution providers
//! - [`store`]: Saved plans and execution history
//! - [`reconciler`]: Plan, review and apply workflow
//! - [`cli`]: Command-line interface
//!
//! ## Example
//!
//! ```yaml
//! project:
//!   name: web
//!
//! existing:
//!   - {name: a, type: instance, params: {size: small}}
//!   - {name: lb, type: lb, params: {target: a}}
//!
//! desired:
//!   - {name: b, type: instance, params: {size: large}}
//!   - {name: lb, type: lb, params: {target: b}}
//!
//! facts:
//!   - {depends_on: [lb, b]}
//!
//! rules:
//!   - name: lb-has-target
//!     head: {has_live_target: ["?LB"]}
//!     body:
//!       - {resource: ["?LB", lb, {target: "?T"}]}
//!       - {resource: ["?T", instance, _]}
//!   - head: {always: [{has_live_target: ["?LB"]}]}
//!     body:
//!       - {resource: ["?LB", lb, _]}
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod facts;
pub mod planner;
pub mod provider;
pub mod reconciler;
pub mod rules;
pub mod store;

// ============================================================================
// Re-exports
// ============================================================================

pub use cli::{Cli, Commands, OutputFormatter};
pub use config::{ConfigHasher, ConfigParser, ConfigValidator, PlanDocument};
pub use engine::{PlanOutcome, PlanningEngine, PlanningInput};
pub use error::{HalldyllError, Result};
pub use facts::{Atom, FactStore, Resource, Term};
pub use planner::{Plan, PlanExecutor, PlanSynthesizer};
pub use reconciler::{DriftReport, ReconciliationResult, Reconciler};
pub use rules::{Rule, RuleEvaluator};
pub use store::{LocalPlanStore, PlanStore};
