//! Plan persistence.
//!
//! This module stores the last synthesized plan, so it can be applied later
//! exactly as reviewed, and the history of execution runs.

mod local;
mod plan_store;
mod types;

pub use local::{LocalPlanStore, STORE_DIR};
pub use plan_store::PlanStore;
pub use types::{HistoryEntry, MAX_HISTORY_ENTRIES, PlanRecord, STORE_VERSION};
