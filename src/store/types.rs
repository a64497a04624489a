//! Persisted plan and history records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::planner::{ExecutionResult, Plan};

/// Current version of the store format.
pub const STORE_VERSION: &str = "1.0";

/// Maximum number of history entries kept.
pub const MAX_HISTORY_ENTRIES: usize = 50;

/// A saved plan together with the project it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRecord {
    /// Store format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// When the record was written.
    pub saved_at: DateTime<Utc>,
    /// The plan itself.
    pub plan: Plan,
}

/// A single entry in the execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Identifier of the execution run.
    pub run_id: Uuid,
    /// When the run finished.
    pub timestamp: DateTime<Utc>,
    /// Fingerprint of the executed plan.
    pub fingerprint: String,
    /// Operations submitted to the provider.
    pub operations: Vec<String>,
    /// Whether the run succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

impl PlanRecord {
    /// Wraps a plan for storage.
    #[must_use]
    pub fn new(project: &str, environment: &str, plan: Plan) -> Self {
        Self {
            version: STORE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            saved_at: Utc::now(),
            plan,
        }
    }
}

impl HistoryEntry {
    /// Summarizes an execution run.
    #[must_use]
    pub fn from_execution(plan: &Plan, result: &ExecutionResult) -> Self {
        Self {
            run_id: result.run_id,
            timestamp: result.finished_at,
            fingerprint: plan.fingerprint.clone(),
            operations: result
                .results
                .iter()
                .map(|r| r.operation.to_string())
                .collect(),
            success: result.success,
            error: result
                .first_failure()
                .and_then(|r| r.error.clone()),
        }
    }
}
