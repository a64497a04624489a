//! Sources of existing infrastructure state.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::ProviderError;
use crate::facts::{Resource, Temporal};

/// Provides the resources that currently exist.
#[async_trait]
pub trait StateSource: Send + Sync {
    /// Returns the existing resources, tagged `existing`.
    ///
    /// # Errors
    ///
    /// Returns `StateUnavailable` if the state cannot be acquired.
    async fn existing(&self) -> Result<Vec<Resource>, ProviderError>;

    /// Describes the source for diagnostics.
    fn name(&self) -> String;
}

/// Resources declared inline in the plan document.
#[derive(Debug, Clone, Default)]
pub struct InlineStateSource {
    resources: Vec<Resource>,
}

/// Resources read from a YAML or JSON state file.
///
/// The file holds either a list of resources or a map with a `resources`
/// list.
#[derive(Debug, Clone)]
pub struct FileStateSource {
    path: PathBuf,
}

/// Accepted layouts of a state file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StateFile {
    List(Vec<Resource>),
    Document { resources: Vec<Resource> },
}

impl InlineStateSource {
    /// Creates a source over the given resources.
    #[must_use]
    pub const fn new(resources: Vec<Resource>) -> Self {
        Self { resources }
    }
}

impl FileStateSource {
    /// Creates a source reading `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn retag(resources: Vec<Resource>) -> Vec<Resource> {
    resources
        .into_iter()
        .map(|r| r.with_tag(Temporal::Existing))
        .collect()
}

#[async_trait]
impl StateSource for InlineStateSource {
    async fn existing(&self) -> Result<Vec<Resource>, ProviderError> {
        Ok(retag(self.resources.clone()))
    }

    fn name(&self) -> String {
        String::from("plan document")
    }
}

#[async_trait]
impl StateSource for FileStateSource {
    async fn existing(&self) -> Result<Vec<Resource>, ProviderError> {
        info!("Loading existing state from: {}", self.path.display());

        let content = fs::read_to_string(&self.path)
            .await
            .map_err(|e| ProviderError::state_unavailable(self.name(), e.to_string()))?;

        // JSON is a subset of YAML, one parser covers both.
        let file: StateFile = serde_yaml::from_str(&content)
            .map_err(|e| ProviderError::state_unavailable(self.name(), e.to_string()))?;

        let resources = match file {
            StateFile::List(resources) | StateFile::Document { resources } => resources,
        };
        debug!("Loaded {} existing resources", resources.len());

        Ok(retag(resources))
    }

    fn name(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::Term;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_inline_source_retags() {
        let source = InlineStateSource::new(vec![Resource::new(
            "a",
            "instance",
            Term::empty_map(),
            Temporal::Desired,
        )]);

        let resources = source.existing().await.unwrap();
        assert_eq!(resources[0].tag, Temporal::Existing);
    }

    #[tokio::test]
    async fn test_file_source_yaml_list() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("state.yaml");
        std::fs::write(
            &path,
            "- {name: a, type: instance}\n- {name: lb, type: lb, params: {target: a}}\n",
        )
        .unwrap();

        let resources = FileStateSource::new(&path).existing().await.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1].params.get("target"), Some(&Term::str("a")));
        assert!(resources.iter().all(|r| r.tag == Temporal::Existing));
    }

    #[tokio::test]
    async fn test_file_source_json_document() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let path = temp.path().join("state.json");
        std::fs::write(
            &path,
            r#"{"resources": [{"name": "x", "type": "disk", "params": {"size": 1}}]}"#,
        )
        .unwrap();

        let resources = FileStateSource::new(&path).existing().await.unwrap();
        assert_eq!(resources[0].name, "x");
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let source = FileStateSource::new("/nonexistent/state.yaml");
        let err = source.existing().await.unwrap_err();
        assert!(matches!(err, ProviderError::StateUnavailable { .. }));
    }
}
