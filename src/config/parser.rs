//! Plan document parser.
//!
//! This module handles loading the plan document from YAML files and
//! environment variables, with proper precedence and error handling.

use crate::error::{ConfigError, HalldyllError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

use super::spec::PlanDocument;
use crate::facts::Atom;

/// A query written as one atom or a list of atoms.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Patterns {
    One(Atom),
    Many(Vec<Atom>),
}

/// Parser for plan documents.
#[derive(Debug, Default)]
pub struct ConfigParser {
    /// Base path for resolving relative paths.
    base_path: Option<PathBuf>,
}

impl ConfigParser {
    /// Creates a new configuration parser.
    #[must_use]
    pub const fn new() -> Self {
        Self { base_path: None }
    }

    /// Sets the base path for resolving relative paths.
    #[must_use]
    pub fn with_base_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.base_path = Some(path.into());
        self
    }

    /// Returns the base path, if set.
    #[must_use]
    pub fn base_path(&self) -> Option<&Path> {
        self.base_path.as_deref()
    }

    /// Loads a plan document from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<PlanDocument> {
        let path = path.as_ref();
        info!("Loading plan document from: {}", path.display());

        if !path.exists() {
            return Err(HalldyllError::Config(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            }));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("Failed to read file: {e}"),
                location: Some(path.display().to_string()),
            })
        })?;

        self.parse_yaml(&content, Some(path))
    }

    /// Parses a plan document from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML is invalid, including malformed terms
    /// and atoms.
    pub fn parse_yaml(&self, content: &str, source: Option<&Path>) -> Result<PlanDocument> {
        debug!("Parsing YAML plan document");

        let document: PlanDocument = serde_yaml::from_str(content).map_err(|e| {
            let location = source.map(|p| p.display().to_string());
            HalldyllError::Config(ConfigError::ParseError {
                message: format!("YAML parse error: {e}"),
                location,
            })
        })?;

        debug!(
            "Parsed plan document for project {}: {} existing, {} desired, {} facts, {} rules, {} invariants",
            document.project.name,
            document.existing.len(),
            document.desired.len(),
            document.facts.len(),
            document.rules.len(),
            document.invariants.len()
        );
        Ok(document)
    }

    /// Parses a query: a single atom or a list of atoms, in YAML.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid atom or atom list.
    pub fn parse_patterns(&self, content: &str) -> Result<Vec<Atom>> {
        let patterns: Patterns = serde_yaml::from_str(content).map_err(|e| {
            HalldyllError::Config(ConfigError::invalid_atom(format!(
                "Invalid query pattern '{content}': {e}"
            )))
        })?;

        Ok(match patterns {
            Patterns::One(atom) => vec![atom],
            Patterns::Many(atoms) => atoms,
        })
    }

    /// Loads a plan document with environment variable overrides.
    ///
    /// Environment variables are checked in the format:
    /// `HALLDYLL_<SECTION>_<KEY>` (e.g., `HALLDYLL_PROJECT_NAME`)
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// override does not parse.
    pub fn load_with_env(&self, path: impl AsRef<Path>) -> Result<PlanDocument> {
        let mut document = self.load_file(path)?;
        Self::apply_env_overrides(&mut document)?;
        Ok(document)
    }

    /// Applies environment variable overrides to the document.
    fn apply_env_overrides(document: &mut PlanDocument) -> Result<()> {
        if let Ok(name) = std::env::var("HALLDYLL_PROJECT_NAME") {
            debug!("Overriding project.name from environment");
            document.project.name = name;
        }

        if let Ok(env) = std::env::var("HALLDYLL_PROJECT_ENVIRONMENT") {
            debug!("Overriding project.environment from environment");
            document.project.environment = env;
        }

        if let Some(value) = env_number("HALLDYLL_MAX_ITERATIONS")? {
            debug!("Overriding settings.max_iterations from environment");
            document.settings.max_iterations = value;
        }

        if let Some(value) = env_number("HALLDYLL_MAX_SEARCH_STATES")? {
            debug!("Overriding settings.max_search_states from environment");
            document.settings.max_search_states = value;
        }

        if let Ok(path) = std::env::var("HALLDYLL_STATE_PATH") {
            debug!("Overriding state.path from environment");
            document.state.path = Some(path);
        }

        Ok(())
    }

    /// Loads the .env file if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the .env file exists but cannot be loaded.
    pub fn load_dotenv(&self) -> Result<()> {
        let env_path = self
            .base_path
            .as_ref()
            .map_or_else(|| PathBuf::from(".env"), |p| p.join(".env"));

        if env_path.exists() {
            info!("Loading environment from: {}", env_path.display());
            dotenvy::from_path(&env_path).map_err(|e| {
                HalldyllError::Config(ConfigError::ParseError {
                    message: format!("Failed to load .env file: {e}"),
                    location: Some(env_path.display().to_string()),
                })
            })?;
        } else {
            debug!(".env file not found at: {}", env_path.display());
        }

        Ok(())
    }
}

/// Reads a numeric environment variable, `None` when unset.
fn env_number<T: FromStr>(name: &str) -> Result<Option<T>> {
    let Ok(value) = std::env::var(name) else {
        return Ok(None);
    };

    value.trim().parse().map(Some).map_err(|_| {
        HalldyllError::Config(ConfigError::InvalidEnvVar {
            name: name.to_string(),
            value,
        })
    })
}

/// Default plan document names to search for.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["halldyll.plan.yaml", "halldyll.plan.yml", "plan.yaml"];

/// Finds the plan document in the given directory or its parents.
///
/// # Errors
///
/// Returns an error if no plan document is found.
pub fn find_config_file(start_dir: impl AsRef<Path>) -> Result<PathBuf> {
    let start = start_dir.as_ref();
    let mut current = start.to_path_buf();

    loop {
        for filename in DEFAULT_CONFIG_FILES {
            let config_path = current.join(filename);
            if config_path.exists() {
                info!("Found plan document: {}", config_path.display());
                return Ok(config_path);
            }
        }

        if !current.pop() {
            break;
        }
    }

    Err(HalldyllError::Config(ConfigError::FileNotFound {
        path: start.join(DEFAULT_CONFIG_FILES[0]),
    }))
}
