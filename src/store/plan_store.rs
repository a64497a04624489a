//! Plan store trait definition.

use async_trait::async_trait;

use crate::error::Result;

use super::types::{HistoryEntry, PlanRecord};

/// Trait for plan storage backends.
#[async_trait]
pub trait PlanStore: Send + Sync {
    /// Loads the saved plan.
    ///
    /// Returns `None` if no plan has been saved yet.
    async fn load(&self) -> Result<Option<PlanRecord>>;

    /// Saves a plan, replacing the previous one.
    async fn save(&self, record: &PlanRecord) -> Result<()>;

    /// Deletes the saved plan.
    async fn delete(&self) -> Result<()>;

    /// Loads the execution history, oldest first.
    async fn history(&self) -> Result<Vec<HistoryEntry>>;

    /// Appends an entry to the execution history.
    async fn record(&self, entry: HistoryEntry) -> Result<()>;

    /// Gets the backend type name.
    fn backend_type(&self) -> &'static str;

    /// Describes where the plan is kept.
    fn location(&self) -> String;
}
