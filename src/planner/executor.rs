//! Plan executor.
//!
//! Batches run in order. The operations of a batch are submitted together
//! and awaited as a group; the next batch is only submitted once every
//! operation of the current one succeeded.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::provider::ExecutionProvider;

use super::plan::{Operation, Plan};

/// Executor for change plans.
pub struct PlanExecutor<'a> {
    /// Provider applying the operations.
    provider: &'a dyn ExecutionProvider,
}

/// Result of executing a single operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationResult {
    /// Batch the operation belongs to.
    pub batch: usize,
    /// Operation that was executed.
    pub operation: Operation,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Error message (if failed).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of executing the entire plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Identifier of this run.
    pub run_id: Uuid,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub finished_at: DateTime<Utc>,
    /// Results of the submitted operations.
    pub results: Vec<OperationResult>,
    /// Number of batches fully applied.
    pub batches_completed: usize,
    /// Number of successful operations.
    pub successful: usize,
    /// Number of failed operations.
    pub failed: usize,
    /// Number of operations never submitted.
    pub skipped: usize,
    /// Whether the entire plan succeeded.
    pub success: bool,
}

impl<'a> PlanExecutor<'a> {
    /// Creates a new plan executor.
    #[must_use]
    pub const fn new(provider: &'a dyn ExecutionProvider) -> Self {
        Self { provider }
    }

    /// Executes a plan batch by batch.
    ///
    /// Provider failures are recorded in the result; execution stops after
    /// the first batch that has one.
    pub async fn execute(&self, plan: &Plan) -> ExecutionResult {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(
            "Executing plan {run_id} with {} operations in {} batches (provider: {})",
            plan.operation_count(),
            plan.batches.len(),
            self.provider.name()
        );

        let mut results = Vec::new();
        let mut batches_completed = 0;

        for batch in &plan.batches {
            debug!("Submitting batch {} ({} operations)", batch.index, batch.operations.len());

            let outcomes = join_all(batch.operations.iter().map(|op| self.provider.apply(op))).await;

            let mut batch_failed = false;
            for (operation, outcome) in batch.operations.iter().zip(outcomes) {
                let error = match outcome {
                    Ok(()) => None,
                    Err(e) => {
                        error!("Operation {operation} failed: {e}");
                        batch_failed = true;
                        Some(e.to_string())
                    }
                };
                results.push(OperationResult {
                    batch: batch.index,
                    operation: operation.clone(),
                    success: error.is_none(),
                    error,
                });
            }

            if batch_failed {
                warn!("Stopping after failed batch {}", batch.index);
                break;
            }
            batches_completed += 1;
        }

        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;
        let skipped = plan.operation_count() - results.len();

        ExecutionResult {
            run_id,
            started_at,
            finished_at: Utc::now(),
            batches_completed,
            successful,
            failed,
            skipped,
            success: failed == 0,
            results,
        }
    }
}

impl ExecutionResult {
    /// Returns the first failed operation, if any.
    #[must_use]
    pub fn first_failure(&self) -> Option<&OperationResult> {
        self.results.iter().find(|r| !r.success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::facts::{Resource, Temporal, Term};
    use crate::planner::{OperationKind, PlanStrategy};
    use crate::provider::{DryRunProvider, MockExecutionProvider};

    fn three_batch_plan() -> Plan {
        let r = |name: &str| Resource::new(name, "instance", Term::empty_map(), Temporal::Desired);
        Plan::new(
            "fp",
            PlanStrategy::Reordered,
            vec![
                vec![Operation::create(&r("b")), Operation::create(&r("c"))],
                vec![Operation::update(&r("lb"), &r("lb"), Vec::new())],
                vec![Operation::delete(&r("a"))],
            ],
            Vec::new(),
            5,
        )
    }

    #[tokio::test]
    async fn test_execute_dry_run() {
        let provider = DryRunProvider::new();
        let result = PlanExecutor::new(&provider).execute(&three_batch_plan()).await;

        assert!(result.success);
        assert_eq!(result.successful, 4);
        assert_eq!(result.batches_completed, 3);
        assert_eq!(result.skipped, 0);
    }

    #[tokio::test]
    async fn test_stops_after_failed_batch() {
        let mut provider = MockExecutionProvider::new();
        provider.expect_name().return_const("mock");
        provider
            .expect_apply()
            .withf(|op: &Operation| op.kind == OperationKind::Create)
            .times(2)
            .returning(|op| {
                if op.name == "c" {
                    Err(ProviderError::failure(op.to_string(), "quota exceeded"))
                } else {
                    Ok(())
                }
            });
        // Later batches must never be submitted.
        provider
            .expect_apply()
            .withf(|op: &Operation| op.kind != OperationKind::Create)
            .never();

        let result = PlanExecutor::new(&provider).execute(&three_batch_plan()).await;

        assert!(!result.success);
        assert_eq!(result.successful, 1);
        assert_eq!(result.failed, 1);
        assert_eq!(result.skipped, 2);
        assert_eq!(result.batches_completed, 0);
        let failure = result.first_failure().unwrap();
        assert_eq!(failure.operation.name, "c");
        assert!(failure.error.as_deref().unwrap().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_empty_plan() {
        let provider = DryRunProvider::new();
        let result = PlanExecutor::new(&provider).execute(&Plan::empty("fp")).await;
        assert!(result.success);
        assert_eq!(result.results.len(), 0);
    }
}
