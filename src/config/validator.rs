//! Plan document validation.
//!
//! This module checks a plan document before planning: names, groundness of
//! asserted facts, rule safety and invariant shape. Problems that only show
//! up during planning (ambiguous resources, cycles) are reported there.

use crate::error::{ConfigError, HalldyllError, Result};
use std::collections::HashSet;
use tracing::debug;
use validator::Validate;

use super::spec::PlanDocument;
use crate::facts::{ALWAYS, Atom, DEPENDS_ON, RESOURCE, Resource, Temporal, Term, VARIABLE_PREFIX};
use crate::planner::Invariant;
use crate::rules::Rule;

/// Validator for plan documents.
#[derive(Debug, Default)]
pub struct ConfigValidator;

/// Validation result containing all errors found.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// List of validation errors.
    pub errors: Vec<ValidationError>,
    /// List of warnings (non-fatal issues).
    pub warnings: Vec<String>,
}

/// A single validation error.
#[derive(Debug)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// The error message.
    pub message: String,
}

impl ConfigValidator {
    /// Creates a new validator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Validates a plan document.
    ///
    /// # Errors
    ///
    /// Returns the first validation error if any check fails.
    pub fn validate(&self, document: &PlanDocument) -> Result<ValidationResult> {
        let result = self.check(document);

        if result.errors.is_empty() {
            debug!("Plan document validation passed");
            Ok(result)
        } else {
            let first_error = &result.errors[0];
            Err(HalldyllError::Config(ConfigError::ValidationError {
                message: first_error.message.clone(),
                field: Some(first_error.field.clone()),
            }))
        }
    }

    /// Runs every check and collects all errors and warnings.
    #[must_use]
    pub fn check(&self, document: &PlanDocument) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_project(document, &mut result);
        Self::validate_settings(document, &mut result);
        Self::validate_resources("existing", &document.existing, &mut result);
        Self::validate_resources("desired", &document.desired, &mut result);
        Self::validate_facts(document, &mut result);
        Self::validate_rules(&document.rules, &mut result);
        Self::validate_invariants(&document.invariants, &mut result);

        if document.state.path.is_some() && !document.existing.is_empty() {
            result.warnings.push(String::from(
                "state.path is set; the inline existing section is ignored",
            ));
        }

        result
    }

    /// Validates project configuration.
    fn validate_project(document: &PlanDocument, result: &mut ValidationResult) {
        push_derived_errors("project", document.project.validate(), result);

        let project = &document.project;
        if !project.name.is_empty() && !is_valid_name(&project.name) {
            result.errors.push(ValidationError {
                field: String::from("project.name"),
                message: format!(
                    "Invalid project name '{}': must be lowercase alphanumeric with hyphens, starting with a letter",
                    project.name
                ),
            });
        }

        if !project.environment.is_empty() && !is_valid_name(&project.environment) {
            result.errors.push(ValidationError {
                field: String::from("project.environment"),
                message: format!("Invalid environment name '{}'", project.environment),
            });
        }
    }

    /// Validates evaluation and search bounds.
    fn validate_settings(document: &PlanDocument, result: &mut ValidationResult) {
        push_derived_errors("settings", document.settings.validate(), result);
    }

    /// Validates one resource section.
    fn validate_resources(section: &str, resources: &[Resource], result: &mut ValidationResult) {
        let mut seen = HashSet::new();

        for (i, resource) in resources.iter().enumerate() {
            let field = format!("{section}[{i}]");

            if resource.name.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{field}.name"),
                    message: String::from("Resource name cannot be empty"),
                });
            }

            if resource.resource_type.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("{field}.type"),
                    message: format!("Resource '{}' has an empty type", resource.name),
                });
            }

            if !resource.params.is_ground() {
                result.errors.push(ValidationError {
                    field: format!("{field}.params"),
                    message: format!(
                        "Resource '{}' params cannot contain variables or wildcards",
                        resource.key()
                    ),
                });
            }

            if !seen.insert(resource.key()) {
                result.warnings.push(format!(
                    "Resource '{}' is declared more than once in {section}",
                    resource.key()
                ));
            }
        }
    }

    /// Validates asserted static facts.
    fn validate_facts(document: &PlanDocument, result: &mut ValidationResult) {
        for (i, fact) in document.facts.iter().enumerate() {
            let field = format!("facts[{i}]");

            if !fact.is_ground() {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("Fact '{fact}' must be ground"),
                });
            }

            if let Some(problem) = shape_problem(fact) {
                result.errors.push(ValidationError {
                    field: field.clone(),
                    message: format!("Fact '{fact}': {problem}"),
                });
            }

            if Resource::from_atom(fact, Temporal::Existing).is_some() {
                result.errors.push(ValidationError {
                    field,
                    message: format!(
                        "Fact '{fact}' is a resource; declare it under existing or desired"
                    ),
                });
            }
        }
    }

    /// Validates derivation rules.
    fn validate_rules(rules: &[Rule], result: &mut ValidationResult) {
        for (i, rule) in rules.iter().enumerate() {
            let field = format!("rules[{i}]");

            for variable in rule.unbound_head_variables() {
                result.errors.push(ValidationError {
                    field: format!("{field}.head"),
                    message: format!(
                        "Rule '{}': head variable '{VARIABLE_PREFIX}{variable}' is not bound by the body",
                        rule.label()
                    ),
                });
            }

            if rule.head.has_wildcard() {
                result.errors.push(ValidationError {
                    field: format!("{field}.head"),
                    message: format!("Rule '{}': head cannot contain wildcards", rule.label()),
                });
            }

            if let Some(problem) = shape_problem(&rule.head) {
                result.errors.push(ValidationError {
                    field: format!("{field}.head"),
                    message: format!("Rule '{}': {problem}", rule.label()),
                });
            }

            if rule.head.predicate == ALWAYS && Invariant::from_fact(&rule.head).is_none() {
                result.errors.push(ValidationError {
                    field: format!("{field}.head"),
                    message: format!(
                        "Rule '{}': always(...) arguments must be atoms",
                        rule.label()
                    ),
                });
            }

            if rule.body.is_empty() && !rule.head.is_ground() {
                result.warnings.push(format!(
                    "Rule '{}' has an empty body; it asserts its head unconditionally",
                    rule.label()
                ));
            }
        }
    }

    /// Validates declared invariants.
    fn validate_invariants(invariants: &[Invariant], result: &mut ValidationResult) {
        for (i, invariant) in invariants.iter().enumerate() {
            if invariant.always.is_empty() {
                result.errors.push(ValidationError {
                    field: format!("invariants[{i}].always"),
                    message: format!(
                        "Invariant '{}' must have at least one pattern",
                        invariant.label()
                    ),
                });
            }
        }
    }
}

/// Explains why a `resource` or `depends_on` atom could never be decoded.
fn shape_problem(atom: &Atom) -> Option<&'static str> {
    let names = |args: &[Term]| args.iter().all(|t| matches!(t, Term::Str(_) | Term::Var(_)));
    match atom.predicate.as_str() {
        RESOURCE if atom.args.len() != 3 || !names(&atom.args[..2]) => {
            Some("resource(...) takes a name, a type and params, and name and type must be strings")
        }
        DEPENDS_ON if atom.args.len() != 2 || !names(&atom.args) => {
            Some("depends_on(...) takes two resource names")
        }
        _ => None,
    }
}

/// Converts errors from `#[derive(Validate)]` into validation errors.
fn push_derived_errors(
    section: &str,
    outcome: std::result::Result<(), validator::ValidationErrors>,
    result: &mut ValidationResult,
) {
    let Err(errors) = outcome else {
        return;
    };

    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    for (field, field_errors) in fields {
        for error in field_errors {
            let message = error
                .message
                .as_ref()
                .map_or_else(|| format!("failed '{}' check", error.code), ToString::to_string);
            result.errors.push(ValidationError {
                field: format!("{section}.{field}"),
                message: format!("{section}.{field} {message}"),
            });
        }
    }
}

/// Validates that a name follows the naming convention.
/// Names must be lowercase alphanumeric with hyphens, starting with a letter.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();

    // First character must be a letter
    match chars.next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => return false,
    }

    // Rest must be lowercase alphanumeric or hyphen
    if !chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-') {
        return false;
    }

    !name.ends_with('-') && !name.contains("--")
}

impl ValidationResult {
    /// Returns true if validation passed (no errors).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns the number of errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.errors.len()
    }

    /// Returns the number of warnings.
    #[must_use]
    pub const fn warning_count(&self) -> usize {
        self.warnings.len()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;

    fn parse(yaml: &str) -> PlanDocument {
        ConfigParser::new().parse_yaml(yaml, None).unwrap()
    }

    #[test]
    fn test_valid_name() {
        assert!(is_valid_name("web"));
        assert!(is_valid_name("my-project-123"));
        assert!(is_valid_name("a"));
    }

    #[test]
    fn test_invalid_name() {
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("Web")); // uppercase
        assert!(!is_valid_name("123-web")); // starts with number
        assert!(!is_valid_name("web_app")); // underscore
        assert!(!is_valid_name("web-")); // ends with hyphen
        assert!(!is_valid_name("web--app")); // consecutive hyphens
    }

    #[test]
    fn test_valid_document() {
        let document = parse(
            r#"
project: {name: web, environment: prod}
desired:
  - {name: lb, type: lb, params: {target: b}}
facts:
  - {depends_on: [lb, b]}
rules:
  - head: {always: [{has_live_target: ["?LB"]}]}
    body:
      - {resource: ["?LB", lb, _]}
invariants:
  - always:
      - {resource: [_, lb, _]}
"#,
        );

        let result = ConfigValidator::new().validate(&document).unwrap();
        assert!(result.is_valid());
        assert_eq!(result.warning_count(), 0);
    }

    #[test]
    fn test_rejects_non_ground_fact() {
        let document = parse(
            r#"
project: {name: web}
facts:
  - {depends_on: ["?X", b]}
"#,
        );

        let result = ConfigValidator::new().check(&document);
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.errors[0].field, "facts[0]");
    }

    #[test]
    fn test_rejects_resource_fact() {
        let document = parse(
            r"
project: {name: web}
facts:
  - {resource: [a, instance, {}]}
",
        );

        let result = ConfigValidator::new().check(&document);
        assert_eq!(result.error_count(), 1);
        assert!(result.errors[0].message.contains("existing or desired"));
    }

    #[test]
    fn test_rejects_unsafe_rules() {
        let document = parse(
            r#"
project: {name: web}
rules:
  - name: unbound
    head: {p: ["?X", "?Y"]}
    body:
      - {q: ["?X"]}
  - name: wild
    head: {p: [_]}
  - name: bad-always
    head: {always: [a]}
"#,
        );

        let result = ConfigValidator::new().check(&document);
        let messages: Vec<_> = result.errors.iter().map(|e| e.message.as_str()).collect();

        assert_eq!(result.error_count(), 3, "{messages:?}");
        assert!(messages[0].contains("'?Y'"));
        assert!(messages[1].contains("wildcards"));
        assert!(messages[2].contains("always"));
    }

    #[test]
    fn test_rejects_undecodable_resource_and_dependency_atoms() {
        let document = parse(
            r#"
project: {name: web}
facts:
  - {depends_on: [lb]}
  - {depends_on: [lb, 3]}
rules:
  - name: numbered
    head: {resource: ["?N", 7, {}]}
    body:
      - {slot: ["?N"]}
  - name: linked
    head: {depends_on: ["?A", "?B"]}
    body:
      - {link: ["?A", "?B"]}
"#,
        );

        let result = ConfigValidator::new().check(&document);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert_eq!(fields, vec!["facts[0]", "facts[1]", "rules[0].head"]);
        assert!(result.errors[0].message.contains("two resource names"));
        assert!(result.errors[2].message.contains("must be strings"));
    }

    #[test]
    fn test_rejects_empty_invariant_and_bad_settings() {
        let document = parse(
            r"
project: {name: web}
settings: {max_iterations: 0}
invariants:
  - name: nothing
    always: []
",
        );

        let result = ConfigValidator::new().check(&document);
        let fields: Vec<_> = result.errors.iter().map(|e| e.field.as_str()).collect();

        assert!(fields.contains(&"settings.max_iterations"));
        assert!(fields.contains(&"invariants[0].always"));
        assert!(ConfigValidator::new().validate(&document).is_err());
    }

    #[test]
    fn test_rejects_invalid_project_name() {
        let document = parse("project: {name: Web_App}");

        let err = ConfigValidator::new().validate(&document).unwrap_err();
        assert!(matches!(
            err,
            HalldyllError::Config(ConfigError::ValidationError { field: Some(ref f), .. }) if f == "project.name"
        ));
    }

    #[test]
    fn test_duplicate_resource_is_warning() {
        let document = parse(
            r"
project: {name: web}
desired:
  - {name: a, type: instance}
  - {name: a, type: instance, params: {size: large}}
",
        );

        let result = ConfigValidator::new().validate(&document).unwrap();
        assert_eq!(result.warning_count(), 1);
        assert!(result.warnings[0].contains("instance.a"));
    }

    #[test]
    fn test_non_ground_resource_params() {
        let document = parse(
            r#"
project: {name: web}
existing:
  - {name: a, type: instance, params: {size: "?S"}}
"#,
        );

        let result = ConfigValidator::new().check(&document);
        assert_eq!(result.errors[0].field, "existing[0].params");
    }
}
