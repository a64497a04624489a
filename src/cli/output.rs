//! Output formatting for CLI commands.
//!
//! This module renders plans, changes, queries and stored records as
//! coloured text tables or as JSON.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::config::{PlanDocument, ValidationResult};
use crate::engine::PlanOutcome;
use crate::facts::{Bindings, VARIABLE_PREFIX};
use crate::planner::{DependencyGraph, OperationKind, Plan, PlanEdge};
use crate::reconciler::{DriftReport, ReconciliationResult};
use crate::store::{HistoryEntry, PlanRecord};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan operation row for table display.
#[derive(Tabled)]
struct OperationRow {
    #[tabled(rename = "Batch")]
    batch: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Changes")]
    changes: String,
}

/// Dependency edge row for table display.
#[derive(Tabled)]
struct EdgeRow {
    #[tabled(rename = "Before")]
    before: String,
    #[tabled(rename = "After")]
    after: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a validation result.
    #[must_use]
    pub fn format_validation(
        &self,
        document: &PlanDocument,
        result: &ValidationResult,
        show_warnings: bool,
    ) -> String {
        match self.format {
            OutputFormat::Json => to_json(&ValidationJson {
                project: &document.project.name,
                environment: &document.project.environment,
                valid: result.is_valid(),
                errors: result.errors.iter().map(ToString::to_string).collect(),
                warnings: &result.warnings,
            }),
            OutputFormat::Text => {
                let mut output = if result.is_valid() {
                    format!("{} Plan document is valid\n", "✓".green())
                } else {
                    let mut output = format!("{} Plan document is invalid:\n", "✗".red());
                    for error in &result.errors {
                        let _ = writeln!(output, "   - {error}");
                    }
                    output
                };

                if show_warnings && !result.warnings.is_empty() {
                    let _ = write!(output, "\n{} Warnings:\n", "⚠".yellow());
                    for warning in &result.warnings {
                        let _ = writeln!(output, "   - {warning}");
                    }
                }

                let _ = write!(
                    output,
                    "\nProject: {}/{}\n   Existing: {}\n   Desired: {}\n   Facts: {}\n   Rules: {}\n   Invariants: {}\n",
                    document.project.name,
                    document.project.environment,
                    document.existing.len(),
                    document.desired.len(),
                    document.facts.len(),
                    document.rules.len(),
                    document.invariants.len()
                );
                output
            }
        }
    }

    /// Formats a change plan for display.
    #[must_use]
    pub fn format_plan(&self, outcome: &PlanOutcome, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => to_json(&outcome.plan),
            OutputFormat::Text => Self::format_plan_text(&outcome.plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "✓".green()
            );
        }

        let mut output = String::new();
        let _ = write!(
            output,
            "\nChange Plan ({})\n   Fingerprint: {}\n   States checked: {}\n\n",
            plan.strategy,
            short(&plan.fingerprint),
            plan.states_checked
        );

        let rows: Vec<OperationRow> = plan
            .batches
            .iter()
            .flat_map(|batch| {
                batch.operations.iter().map(move |op| OperationRow {
                    batch: batch.index + 1,
                    action: Self::format_kind(op.kind),
                    resource: op.key().to_string(),
                    changes: if detailed {
                        op.changes
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join("\n")
                    } else {
                        Self::truncate(
                            &op.changes
                                .iter()
                                .map(|c| c.path.as_str())
                                .collect::<Vec<_>>()
                                .join(", "),
                            40,
                        )
                    },
                })
            })
            .collect();

        output.push_str(&Table::new(rows).to_string());
        output.push('\n');

        if detailed && !plan.edges.is_empty() {
            output.push_str("\nDependencies:\n");
            for edge in &plan.edges {
                let _ = writeln!(output, "   {edge}");
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to destroy in {} batches\n",
            plan.count(OperationKind::Create).to_string().green(),
            plan.count(OperationKind::Update).to_string().yellow(),
            plan.count(OperationKind::Delete).to_string().red(),
            plan.batches.len()
        );

        output
    }

    /// Formats a pending-changes report.
    #[must_use]
    pub fn format_changes(&self, report: &DriftReport) -> String {
        match self.format {
            OutputFormat::Json => to_json(report),
            OutputFormat::Text => {
                if report.is_converged() {
                    return format!(
                        "{} No changes - existing state matches the desired state.\n",
                        "✓".green()
                    );
                }

                let mut output = format!("{} Pending changes:\n\n", "⚠".yellow());
                for key in &report.creates {
                    let _ = writeln!(output, "   {} {key}", "+".green());
                }
                for key in &report.updates {
                    let _ = writeln!(output, "   {} {key}", "~".yellow());
                }
                for key in &report.deletes {
                    let _ = writeln!(output, "   {} {key}", "-".red());
                }
                let _ = write!(
                    output,
                    "\n{} changes, {} unchanged ({} existing resources).\n",
                    report.creates.len() + report.updates.len() + report.deletes.len(),
                    report.unchanged,
                    report.existing_count
                );
                output
            }
        }
    }

    /// Formats query solutions.
    #[must_use]
    pub fn format_query(&self, solutions: &[Bindings]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&solutions),
            OutputFormat::Text => {
                if solutions.is_empty() {
                    return format!("{} No solutions.\n", "✗".red());
                }

                let mut output = String::new();
                for (i, bindings) in solutions.iter().enumerate() {
                    if bindings.is_empty() {
                        let _ = writeln!(output, "{:>4}. {}", i + 1, "true".green());
                        continue;
                    }
                    let rendered: Vec<String> = bindings
                        .iter()
                        .map(|(name, value)| format!("{VARIABLE_PREFIX}{name} = {value}"))
                        .collect();
                    let _ = writeln!(output, "{:>4}. {}", i + 1, rendered.join(", "));
                }
                let _ = write!(output, "\n{} solution(s).\n", solutions.len());
                output
            }
        }
    }

    /// Formats the dependency graph.
    #[must_use]
    pub fn format_graph(&self, graph: &DependencyGraph) -> String {
        let edges = graph.plan_edges();
        match self.format {
            OutputFormat::Json => to_json(&GraphJson {
                operations: graph.operations().iter().map(ToString::to_string).collect(),
                edges: &edges,
            }),
            OutputFormat::Text => {
                let mut output = format!(
                    "\nDependency graph: {} operations, {} edges\n\n",
                    graph.len(),
                    edges.len()
                );
                if edges.is_empty() {
                    output.push_str("   No dependencies between operations.\n");
                    return output;
                }

                let rows: Vec<EdgeRow> = edges
                    .iter()
                    .map(|e| EdgeRow {
                        before: e.before.to_string(),
                        after: e.after.to_string(),
                    })
                    .collect();
                output.push_str(&Table::new(rows).to_string());
                output.push('\n');
                output
            }
        }
    }

    /// Formats a reconciliation result.
    #[must_use]
    pub fn format_reconciliation(&self, result: &ReconciliationResult) -> String {
        match self.format {
            OutputFormat::Json => to_json(result),
            OutputFormat::Text => {
                let mut output = format!("{} Reconciliation successful\n\n", "✓".green());
                let _ = writeln!(output, "   Created: {}", result.created);
                let _ = writeln!(output, "   Updated: {}", result.updated);
                let _ = writeln!(output, "   Deleted: {}", result.deleted);
                let _ = writeln!(output, "   Batches: {}", result.batches);
                if let Some(execution) = &result.execution {
                    let _ = writeln!(output, "   Run: {}", execution.run_id);
                }
                output
            }
        }
    }

    /// Formats the saved plan and execution history.
    #[must_use]
    pub fn format_saved(&self, record: Option<&PlanRecord>, history: &[HistoryEntry]) -> String {
        match self.format {
            OutputFormat::Json => to_json(&SavedJson { plan: record, history }),
            OutputFormat::Text => {
                let mut output = String::new();

                match record {
                    Some(record) => {
                        let _ = write!(
                            output,
                            "\nSaved plan: {}/{}\n   Saved at: {}\n   Fingerprint: {}\n",
                            record.project,
                            record.environment,
                            record.saved_at.format("%Y-%m-%d %H:%M"),
                            short(&record.plan.fingerprint)
                        );
                        output.push_str(&Self::format_plan_text(&record.plan, false));
                    }
                    None => output.push_str("No saved plan.\n"),
                }

                if !history.is_empty() {
                    let _ = writeln!(output, "\nRecent history ({}):", history.len());
                    for entry in history.iter().rev().take(5) {
                        let status = if entry.success { "✓".green() } else { "✗".red() };
                        let _ = writeln!(
                            output,
                            "   {status} {} - {} operations ({})",
                            entry.timestamp.format("%Y-%m-%d %H:%M"),
                            entry.operations.len(),
                            short(&entry.fingerprint)
                        );
                        if let Some(error) = &entry.error {
                            let _ = writeln!(output, "       {error}");
                        }
                    }
                }

                output
            }
        }
    }

    /// Formats an operation kind with color.
    fn format_kind(kind: OperationKind) -> String {
        match kind {
            OperationKind::Create => "+create".green().to_string(),
            OperationKind::Update => "~update".yellow().to_string(),
            OperationKind::Delete => "-delete".red().to_string(),
        }
    }

    /// Truncates a string to a maximum number of characters.
    fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{kept}...")
        }
    }
}

/// First eight characters of a fingerprint.
fn short(fingerprint: &str) -> &str {
    fingerprint.get(..8).unwrap_or(fingerprint)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_default()
}

// JSON serialization helpers

#[derive(Serialize)]
struct ValidationJson<'a> {
    project: &'a str,
    environment: &'a str,
    valid: bool,
    errors: Vec<String>,
    warnings: &'a [String],
}

#[derive(Serialize)]
struct GraphJson<'a> {
    operations: Vec<String>,
    edges: &'a [PlanEdge],
}

#[derive(Serialize)]
struct SavedJson<'a> {
    plan: Option<&'a PlanRecord>,
    history: &'a [HistoryEntry],
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigParser, ConfigValidator};
    use crate::engine::PlanningEngine;
    use crate::facts::{Temporal, Term};

    fn outcome() -> PlanOutcome {
        let document = ConfigParser::new()
            .parse_yaml(
                r"
project: {name: web}
existing:
  - {name: a, type: instance, params: {size: small}}
desired:
  - {name: a, type: instance, params: {size: large}}
  - {name: b, type: instance}
facts:
  - {depends_on: [a, b]}
",
                None,
            )
            .unwrap();
        let existing = document
            .existing
            .iter()
            .cloned()
            .map(|r| r.with_tag(Temporal::Existing))
            .collect();
        PlanningEngine::new(document.planning_input(existing))
            .plan()
            .unwrap()
    }

    #[test]
    fn test_plan_text() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let text = formatter.format_plan(&outcome(), true);

        assert!(text.contains("instance.a"));
        assert!(text.contains("instance.b"));
        assert!(text.contains("size: small -> large"));
        assert!(text.contains("instance.b -> instance.a"));
    }

    #[test]
    fn test_plan_json() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let json: serde_json::Value =
            serde_json::from_str(&formatter.format_plan(&outcome(), false)).unwrap();

        assert_eq!(json["strategy"], "baseline");
        assert_eq!(json["batches"].as_array().unwrap().len(), 2);
        assert_eq!(json["batches"][0]["operations"][0]["kind"], "create");
    }

    #[test]
    fn test_empty_plan_text() {
        let text = OutputFormatter::format_plan_text(&Plan::empty("fp"), false);
        assert!(text.contains("No changes required"));
    }

    #[test]
    fn test_query_output() {
        let solutions = vec![
            Bindings::from([(String::from("N"), Term::str("a"))]),
            Bindings::new(),
        ];

        let text = OutputFormatter::new(OutputFormat::Text).format_query(&solutions);
        assert!(text.contains("?N = a"));
        assert!(text.contains("2 solution(s)"));

        let json: serde_json::Value =
            serde_json::from_str(&OutputFormatter::new(OutputFormat::Json).format_query(&solutions))
                .unwrap();
        assert_eq!(json[0]["N"], "a");
    }

    #[test]
    fn test_validation_json() {
        let document = ConfigParser::new()
            .parse_yaml("project: {name: web}", None)
            .unwrap();
        let result = ConfigValidator::new().check(&document);

        let json: serde_json::Value = serde_json::from_str(
            &OutputFormatter::new(OutputFormat::Json).format_validation(&document, &result, true),
        )
        .unwrap();
        assert_eq!(json["valid"], true);
        assert_eq!(json["project"], "web");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(OutputFormatter::truncate("a-very-long-path", 8), "a-ver...");
        assert_eq!(short("abcdef1234"), "abcdef12");
        assert_eq!(short("abc"), "abc");
    }
}
