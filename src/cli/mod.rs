//! CLI module for the Halldyll planner.
//!
//! This module provides the command-line interface for validating plan
//! documents, planning changes and applying them.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat, QueryWorld};
pub use output::OutputFormatter;
