//! Configuration module for the Halldyll planner.
//!
//! This module handles all plan-document functionality:
//! - Parsing and deserializing `halldyll.plan.yaml`
//! - Validation of facts, rules, invariants and settings
//! - Computing input fingerprints for stale-plan detection

mod hash;
mod parser;
mod spec;
mod validator;

pub use self::hash::ConfigHasher;
pub use self::parser::{ConfigParser, DEFAULT_CONFIG_FILES, find_config_file};
pub use self::spec::{PlanDocument, ProjectConfig, SettingsConfig, StateConfig};
pub use self::validator::{ConfigValidator, ValidationError, ValidationResult};
