//! Inventory reconciliation
//!
//! Normalizes both backends' records into canonical items, diffs them,
//! plans the actions that converge the two sides, and executes the plan.

pub mod diff;
pub mod engine;
pub mod executor;
pub mod normalize;
pub mod planner;
pub mod report;
pub mod types;

#[cfg(test)]
pub(crate) mod memory;

pub use diff::TrackedFields;
pub use engine::{SyncRun, SyncSettings, run_sync};
pub use executor::Backends;
pub use planner::{ConflictResolution, SyncDirection, SyncPolicy};
