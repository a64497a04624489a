//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::facts::Temporal;

/// Halldyll Plan - invariant-aware infrastructure change planner.
#[derive(Parser, Debug)]
#[command(name = "halldyll-plan")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the plan document.
    #[arg(short, long, global = true, env = "HALLDYLL_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate the plan document.
    Validate {
        /// Show all warnings, not just errors.
        #[arg(short, long)]
        warnings: bool,
    },

    /// Compute and display the change plan.
    Plan {
        /// Show per-parameter changes and dependency edges.
        #[arg(short, long)]
        detailed: bool,

        /// Save the plan so `apply --from-saved` can execute it later.
        #[arg(short, long)]
        save: bool,
    },

    /// Apply the change plan.
    Apply {
        /// Skip confirmation prompt.
        #[arg(short, long)]
        yes: bool,

        /// Apply the saved plan instead of planning again.
        #[arg(long)]
        from_saved: bool,
    },

    /// Show pending changes without ordering them.
    Changes,

    /// Enumerate the solutions of a pattern in one world.
    Query {
        /// World to query.
        world: QueryWorld,

        /// Atom or list of atoms in YAML, e.g. `{resource: ["?N", instance, _]}`.
        pattern: String,
    },

    /// Show the dependency edges between planned operations.
    Graph,

    /// Show the saved plan and recent execution history.
    Show,
}

/// World selector for queries.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum QueryWorld {
    /// The infrastructure as it is now.
    Existing,
    /// The infrastructure as it should be.
    Desired,
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl From<QueryWorld> for Temporal {
    fn from(world: QueryWorld) -> Self {
        match world {
            QueryWorld::Existing => Self::Existing,
            QueryWorld::Desired => Self::Desired,
        }
    }
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_plan_flags() {
        let cli = Cli::try_parse_from(["halldyll-plan", "plan", "--detailed", "--save"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Plan {
                detailed: true,
                save: true
            }
        ));
    }

    #[test]
    fn test_parse_query() {
        let cli = Cli::try_parse_from([
            "halldyll-plan",
            "--output",
            "json",
            "query",
            "desired",
            "{resource: [\"?N\", _, _]}",
        ])
        .unwrap();

        assert!(matches!(cli.output, OutputFormat::Json));
        match cli.command {
            Commands::Query { world, pattern } => {
                assert_eq!(Temporal::from(world), Temporal::Desired);
                assert!(pattern.starts_with("{resource"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
