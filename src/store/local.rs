//! Local file-based plan storage.
//!
//! Plans and history live as JSON files under `.halldyll/` next to the plan
//! document.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::error::{HalldyllError, Result, StoreError};

use super::plan_store::PlanStore;
use super::types::{HistoryEntry, MAX_HISTORY_ENTRIES, PlanRecord};

/// Default store directory name.
pub const STORE_DIR: &str = ".halldyll";

/// Plan file name.
const PLAN_FILE: &str = "plan.json";

/// History file name.
const HISTORY_FILE: &str = "history.json";

/// Local file-based plan store.
#[derive(Debug, Clone)]
pub struct LocalPlanStore {
    /// Base directory for store files.
    base_dir: PathBuf,
    /// Path to the plan file.
    plan_path: PathBuf,
    /// Path to the history file.
    history_path: PathBuf,
}

impl LocalPlanStore {
    /// Creates a store under `.halldyll/` in the current directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the current directory cannot be determined.
    pub fn new() -> Result<Self> {
        let base_dir = std::env::current_dir()
            .map_err(|e| HalldyllError::internal(format!("Cannot determine current directory: {e}")))?
            .join(STORE_DIR);

        Ok(Self::with_base_dir(base_dir))
    }

    /// Creates a store with a custom base directory.
    #[must_use]
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let history_path = base_dir.join(HISTORY_FILE);
        let plan_path = base_dir.join(PLAN_FILE);

        Self {
            base_dir,
            plan_path,
            history_path,
        }
    }

    /// Creates a store from a custom plan file path.
    ///
    /// The history file is kept next to it.
    #[must_use]
    pub fn with_plan_path(plan_path: impl Into<PathBuf>) -> Self {
        let plan_path = plan_path.into();
        let base_dir = plan_path
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let history_path = base_dir.join(HISTORY_FILE);

        Self {
            base_dir,
            plan_path,
            history_path,
        }
    }

    /// Returns the plan file path.
    #[must_use]
    pub fn plan_path(&self) -> &Path {
        &self.plan_path
    }

    /// Ensures the store directory exists.
    async fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            debug!("Creating store directory: {}", self.base_dir.display());
            fs::create_dir_all(&self.base_dir).await?;
        }
        Ok(())
    }

    /// Reads and parses a JSON file, `None` if it does not exist.
    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            StoreError::corrupted(format!("Failed to read {}: {e}", path.display()))
        })?;

        let value = serde_json::from_str(&content).map_err(|e| {
            StoreError::corrupted(format!("Failed to parse {}: {e}", path.display()))
        })?;

        Ok(Some(value))
    }

    /// Writes a JSON file through a temporary file and a rename.
    async fn write_json<T: Serialize + Sync>(&self, path: &Path, value: &T) -> Result<()> {
        self.ensure_dir().await?;

        let content = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize: {e}")))?;

        let temp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;

        fs::rename(&temp_path, path).await?;
        Ok(())
    }
}

#[async_trait]
impl PlanStore for LocalPlanStore {
    async fn load(&self) -> Result<Option<PlanRecord>> {
        let record = Self::read_json(&self.plan_path).await?;
        if record.is_none() {
            debug!("Plan file does not exist: {}", self.plan_path.display());
        }
        Ok(record)
    }

    async fn save(&self, record: &PlanRecord) -> Result<()> {
        info!("Saving plan to: {}", self.plan_path.display());
        self.write_json(&self.plan_path, record).await
    }

    async fn delete(&self) -> Result<()> {
        if self.plan_path.exists() {
            info!("Deleting plan file: {}", self.plan_path.display());
            fs::remove_file(&self.plan_path).await?;
        }
        Ok(())
    }

    async fn history(&self) -> Result<Vec<HistoryEntry>> {
        Ok(Self::read_json(&self.history_path).await?.unwrap_or_default())
    }

    async fn record(&self, entry: HistoryEntry) -> Result<()> {
        let mut history = self.history().await?;
        history.push(entry);
        if history.len() > MAX_HISTORY_ENTRIES {
            let excess = history.len() - MAX_HISTORY_ENTRIES;
            history.drain(..excess);
        }
        self.write_json(&self.history_path, &history).await
    }

    fn backend_type(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.plan_path.display().to_string()
    }
}
