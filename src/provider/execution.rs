//! Execution providers.
//!
//! A provider applies one operation at a time against real infrastructure.
//! The planner only ever talks to it through [`ExecutionProvider`].

use async_trait::async_trait;
use tracing::info;

use crate::error::ProviderError;
use crate::planner::Operation;

/// Applies operations to infrastructure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExecutionProvider: Send + Sync {
    /// Applies a single operation.
    ///
    /// # Errors
    ///
    /// Returns `ProviderFailure` if the operation could not be applied.
    async fn apply(&self, operation: &Operation) -> Result<(), ProviderError>;

    /// Gets the provider name.
    fn name(&self) -> &'static str;
}

/// Provider that logs operations without touching anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct DryRunProvider;

impl DryRunProvider {
    /// Creates a new dry-run provider.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExecutionProvider for DryRunProvider {
    async fn apply(&self, operation: &Operation) -> Result<(), ProviderError> {
        info!("[dry-run] {operation}");
        for change in &operation.changes {
            info!("[dry-run]   {change}");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "dry-run"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{Resource, Temporal, Term};

    #[tokio::test]
    async fn test_dry_run_always_succeeds() {
        let provider = DryRunProvider::new();
        let op = Operation::create(&Resource::new(
            "b",
            "instance",
            Term::empty_map(),
            Temporal::Desired,
        ));

        assert!(provider.apply(&op).await.is_ok());
        assert_eq!(provider.name(), "dry-run");
    }
}
