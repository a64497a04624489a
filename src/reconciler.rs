//! Reconciler for converging existing infrastructure to the desired world.
//!
//! This module loads the existing state, plans the changes, and drives the
//! plan through an execution provider, recording every run in the plan
//! store's history.

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigHasher, PlanDocument};
use crate::engine::{PlanOutcome, PlanningEngine};
use crate::error::{HalldyllError, PlanError, ProviderError, Result, StoreError};
use crate::planner::{ExecutionResult, OperationKind, Plan, PlanExecutor};
use crate::provider::{ExecutionProvider, StateSource};
use crate::store::{HistoryEntry, PlanRecord, PlanStore};

/// Reconciler for one plan document.
pub struct Reconciler<'a, S: PlanStore> {
    /// Plan document.
    document: &'a PlanDocument,
    /// Source of the existing resources.
    state_source: &'a dyn StateSource,
    /// Saved plan and history.
    store: &'a S,
    /// Provider applying operations.
    provider: &'a dyn ExecutionProvider,
}

/// Result of a successful reconciliation run.
#[derive(Debug, Serialize)]
pub struct ReconciliationResult {
    /// Fingerprint of the applied plan.
    pub fingerprint: String,
    /// Number of resources created.
    pub created: usize,
    /// Number of resources updated.
    pub updated: usize,
    /// Number of resources deleted.
    pub deleted: usize,
    /// Number of batches applied.
    pub batches: usize,
    /// Execution details, `None` when nothing had to change.
    pub execution: Option<ExecutionResult>,
}

/// Report of pending changes, computed without planning an order.
#[derive(Debug, Serialize)]
pub struct DriftReport {
    /// Whether the existing world differs from the desired one.
    pub has_changes: bool,
    /// Resources to create.
    pub creates: Vec<String>,
    /// Resources to update.
    pub updates: Vec<String>,
    /// Resources to delete.
    pub deletes: Vec<String>,
    /// Number of resources already as desired.
    pub unchanged: usize,
    /// Number of existing resources read from the state source.
    pub existing_count: usize,
}

impl<'a, S: PlanStore> Reconciler<'a, S> {
    /// Creates a new reconciler.
    #[must_use]
    pub const fn new(
        document: &'a PlanDocument,
        state_source: &'a dyn StateSource,
        store: &'a S,
        provider: &'a dyn ExecutionProvider,
    ) -> Self {
        Self {
            document,
            state_source,
            store,
            provider,
        }
    }

    /// Loads the existing state and builds a planning engine over it.
    ///
    /// # Errors
    ///
    /// Returns `StateUnavailable` if the state source fails.
    pub async fn engine(&self) -> Result<PlanningEngine> {
        let existing = self.state_source.existing().await?;
        debug!(
            "Loaded {} existing resources from {}",
            existing.len(),
            self.state_source.name()
        );
        Ok(PlanningEngine::new(self.document.planning_input(existing)))
    }

    /// Plans the changes, optionally saving the plan for a later apply.
    ///
    /// # Errors
    ///
    /// Returns any planning or store error.
    pub async fn plan(&self, save: bool) -> Result<PlanOutcome> {
        let outcome = self.engine().await?.plan()?;

        if save {
            let record = PlanRecord::new(
                &self.document.project.name,
                &self.document.project.environment,
                outcome.plan.clone(),
            );
            self.store.save(&record).await?;
        }

        Ok(outcome)
    }

    /// Plans and applies the changes.
    ///
    /// # Errors
    ///
    /// Returns any planning error, and `ProviderFailure` if an operation
    /// fails. The failed run is still recorded in the history.
    pub async fn apply(&self) -> Result<ReconciliationResult> {
        info!(
            "Starting reconciliation for {}/{}",
            self.document.project.name, self.document.project.environment
        );

        let outcome = self.plan(false).await?;
        if outcome.plan.is_empty() {
            info!("No changes required - state is converged");
            return Ok(ReconciliationResult::converged(&outcome.plan));
        }

        self.execute(&outcome.plan).await
    }

    /// Applies the saved plan if it still matches the document and state.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no plan was saved, `StalePlan` if the planning
    /// input changed since, and `ProviderFailure` if an operation fails.
    pub async fn apply_saved(&self) -> Result<ReconciliationResult> {
        let record = self.store.load().await?.ok_or_else(|| {
            HalldyllError::Store(StoreError::NotFound {
                location: self.store.location(),
            })
        })?;

        let engine = self.engine().await?;
        if !ConfigHasher::hashes_match(&record.plan.fingerprint, engine.fingerprint()) {
            warn!(
                "Saved plan {} does not match the current input {}",
                record.plan.fingerprint,
                engine.fingerprint()
            );
            return Err(PlanError::StalePlan {
                planned: record.plan.fingerprint,
                current: engine.fingerprint().to_string(),
            }
            .into());
        }

        if record.plan.is_empty() {
            info!("Saved plan is empty - nothing to apply");
            return Ok(ReconciliationResult::converged(&record.plan));
        }

        let result = self.execute(&record.plan).await?;
        self.store.delete().await?;
        Ok(result)
    }

    /// Executes a plan as given and records the run.
    ///
    /// # Errors
    ///
    /// Returns `ProviderFailure` if an operation fails.
    pub async fn execute(&self, plan: &Plan) -> Result<ReconciliationResult> {
        let execution = PlanExecutor::new(self.provider).execute(plan).await;

        if let Err(e) = self
            .store
            .record(HistoryEntry::from_execution(plan, &execution))
            .await
        {
            error!("Failed to record execution history: {e}");
        }

        if let Some(failure) = execution.first_failure() {
            error!(
                "Execution stopped in batch {}: {} batches applied, {} operations not submitted",
                failure.batch, execution.batches_completed, execution.skipped
            );
            return Err(ProviderError::failure(
                failure.operation.to_string(),
                failure.error.clone().unwrap_or_default(),
            )
            .into());
        }

        info!(
            "Applied {} operations in {} batches",
            execution.successful, execution.batches_completed
        );

        Ok(ReconciliationResult {
            fingerprint: plan.fingerprint.clone(),
            created: plan.count(OperationKind::Create),
            updated: plan.count(OperationKind::Update),
            deleted: plan.count(OperationKind::Delete),
            batches: execution.batches_completed,
            execution: Some(execution),
        })
    }

    /// Computes the pending changes without ordering them.
    ///
    /// # Errors
    ///
    /// Returns state, evaluation and changeset errors.
    pub async fn check_changes(&self) -> Result<DriftReport> {
        info!(
            "Checking for changes in {}/{}",
            self.document.project.name, self.document.project.environment
        );

        let engine = self.engine().await?;
        let changeset = engine.changes()?;

        Ok(DriftReport {
            has_changes: !changeset.is_empty(),
            creates: changeset.creates.iter().map(|r| r.key().to_string()).collect(),
            updates: changeset
                .updates
                .iter()
                .map(|u| u.new.key().to_string())
                .collect(),
            deletes: changeset.deletes.iter().map(|r| r.key().to_string()).collect(),
            unchanged: changeset.unchanged.len(),
            existing_count: engine.input().existing.len(),
        })
    }
}

impl ReconciliationResult {
    fn converged(plan: &Plan) -> Self {
        Self {
            fingerprint: plan.fingerprint.clone(),
            created: 0,
            updated: 0,
            deleted: 0,
            batches: 0,
            execution: None,
        }
    }
}

impl DriftReport {
    /// Returns true if the existing world is already the desired one.
    #[must_use]
    pub const fn is_converged(&self) -> bool {
        !self.has_changes
    }
}

impl std::fmt::Display for DriftReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.has_changes {
            return write!(f, "No changes - existing state matches the desired state");
        }

        writeln!(f, "Pending changes:")?;
        for key in &self.creates {
            writeln!(f, "  + {key}")?;
        }
        for key in &self.updates {
            writeln!(f, "  ~ {key}")?;
        }
        for key in &self.deletes {
            writeln!(f, "  - {key}")?;
        }
        write!(f, "  ({} unchanged)", self.unchanged)
    }
}

impl std::fmt::Display for ReconciliationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Reconciliation successful:")?;
        writeln!(f, "  Created: {}", self.created)?;
        writeln!(f, "  Updated: {}", self.updated)?;
        writeln!(f, "  Deleted: {}", self.deleted)?;
        write!(f, "  Batches: {}", self.batches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigParser;
    use crate::planner::Operation;
    use crate::provider::{DryRunProvider, InlineStateSource, MockExecutionProvider};
    use crate::store::{LocalPlanStore, STORE_DIR};
    use tempfile::TempDir;

    const DOCUMENT: &str = r"
project: {name: web}
existing:
  - {name: a, type: instance}
  - {name: old, type: bucket}
desired:
  - {name: a, type: instance, params: {size: large}}
  - {name: b, type: instance}
";

    struct Fixture {
        document: PlanDocument,
        source: InlineStateSource,
        store: LocalPlanStore,
        _temp: TempDir,
    }

    fn fixture(yaml: &str) -> Fixture {
        let document = ConfigParser::new().parse_yaml(yaml, None).unwrap();
        let source = InlineStateSource::new(document.existing.clone());
        let temp = TempDir::new().expect("Failed to create temp dir");
        let store = LocalPlanStore::with_base_dir(temp.path().join(STORE_DIR));
        Fixture {
            document,
            source,
            store,
            _temp: temp,
        }
    }

    #[tokio::test]
    async fn test_check_changes() {
        let f = fixture(DOCUMENT);
        let provider = DryRunProvider::new();
        let reconciler = Reconciler::new(&f.document, &f.source, &f.store, &provider);

        let report = reconciler.check_changes().await.unwrap();

        assert!(!report.is_converged());
        assert_eq!(report.creates, vec!["instance.b"]);
        assert_eq!(report.updates, vec!["instance.a"]);
        assert_eq!(report.deletes, vec!["bucket.old"]);
        assert_eq!(report.existing_count, 2);
    }

    #[tokio::test]
    async fn test_apply_records_history() {
        let f = fixture(DOCUMENT);
        let provider = DryRunProvider::new();
        let reconciler = Reconciler::new(&f.document, &f.source, &f.store, &provider);

        let result = reconciler.apply().await.unwrap();

        assert_eq!((result.created, result.updated, result.deleted), (1, 1, 1));
        let history = f.store.history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].fingerprint, result.fingerprint);
    }

    #[tokio::test]
    async fn test_converged_state_applies_nothing() {
        let f = fixture(
            r"
project: {name: web}
existing:
  - {name: a, type: instance}
desired:
  - {name: a, type: instance}
",
        );
        let mut provider = MockExecutionProvider::new();
        provider.expect_apply().never();
        let reconciler = Reconciler::new(&f.document, &f.source, &f.store, &provider);

        let result = reconciler.apply().await.unwrap();

        assert!(result.execution.is_none());
        assert!(f.store.history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_reported_and_recorded() {
        let f = fixture(DOCUMENT);
        let mut provider = MockExecutionProvider::new();
        provider.expect_name().return_const("mock");
        provider.expect_apply().returning(|op: &Operation| {
            if op.kind == OperationKind::Delete {
                Err(ProviderError::failure(op.to_string(), "permission denied"))
            } else {
                Ok(())
            }
        });
        let reconciler = Reconciler::new(&f.document, &f.source, &f.store, &provider);

        let err = reconciler.apply().await.unwrap_err();

        assert!(matches!(
            err,
            HalldyllError::Provider(ProviderError::ProviderFailure { ref operation, .. })
                if operation == "delete bucket.old"
        ));
        let history = f.store.history().await.unwrap();
        assert!(!history[0].success);
        assert!(history[0].error.as_deref().unwrap().contains("permission denied"));
    }

    #[tokio::test]
    async fn test_apply_saved_plan() {
        let f = fixture(DOCUMENT);
        let provider = DryRunProvider::new();
        let reconciler = Reconciler::new(&f.document, &f.source, &f.store, &provider);

        let outcome = reconciler.plan(true).await.unwrap();
        let result = reconciler.apply_saved().await.unwrap();

        assert_eq!(result.fingerprint, outcome.plan.fingerprint);
        assert!(f.store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_saved_rejects_stale_plan() {
        let f = fixture(DOCUMENT);
        let provider = DryRunProvider::new();
        Reconciler::new(&f.document, &f.source, &f.store, &provider)
            .plan(true)
            .await
            .unwrap();

        // The infrastructure moved on since the plan was saved.
        let drifted = InlineStateSource::new(Vec::new());
        let err = Reconciler::new(&f.document, &drifted, &f.store, &provider)
            .apply_saved()
            .await
            .unwrap_err();

        assert!(matches!(err, HalldyllError::Plan(PlanError::StalePlan { .. })));
        assert!(f.store.load().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_apply_saved_without_plan() {
        let f = fixture(DOCUMENT);
        let provider = DryRunProvider::new();
        let err = Reconciler::new(&f.document, &f.source, &f.store, &provider)
            .apply_saved()
            .await
            .unwrap_err();

        assert!(matches!(err, HalldyllError::Store(StoreError::NotFound { .. })));
    }
}
