//! Sync engine
//!
//! One run: read both backends, normalize, diff, plan and execute.

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;

use super::diff::{DiffStats, TrackedFields, diff};
use super::executor::{Backends, Executor};
use super::normalize::{MalformedRecordError, normalize};
use super::planner::{SyncPolicy, plan};
use super::report::SyncReport;
use super::types::SourceSystem;
use crate::api::resilience::{ResilienceConfig, RetryPolicy};
use crate::api::RawRecord;

/// Everything that shapes a run besides the backends themselves
#[derive(Debug, Clone, Default)]
pub struct SyncSettings {
    pub policy: SyncPolicy,
    pub tracked: TrackedFields,
    pub resilience: ResilienceConfig,
}

/// Outcome of a completed run
#[derive(Debug, Clone)]
pub struct SyncRun {
    pub report: SyncReport,
    /// Source records excluded as malformed
    pub rejected: Vec<MalformedRecordError>,
    pub stats: DiffStats,
}

/// Run one reconciliation pass.
///
/// Failing to read either backend aborts the run before anything is
/// written. Failures while writing are recorded in the report instead.
pub async fn run_sync(
    backends: &Backends,
    settings: &SyncSettings,
    dry_run: bool,
    cancel: &CancellationToken,
) -> Result<SyncRun> {
    let retry = RetryPolicy::new(settings.resilience.retry.clone());

    log::info!("Reading inventory from both backends");
    let (raw_a, raw_b) = tokio::try_join!(
        fetch(backends, SourceSystem::InventoryService, &retry, cancel),
        fetch(backends, SourceSystem::LabRegistry, &retry, cancel),
    )?;

    let normalized_a = normalize(&raw_a, SourceSystem::InventoryService);
    let normalized_b = normalize(&raw_b, SourceSystem::LabRegistry);

    let mut rejected = normalized_a.rejected;
    rejected.extend(normalized_b.rejected);
    if !rejected.is_empty() {
        log::warn!("{} malformed records were excluded", rejected.len());
    }

    let diff_result = diff(&normalized_a.items, &normalized_b.items, &settings.tracked);
    let stats = DiffStats::from_diff(&diff_result);
    log::info!("{}", stats);
    if diff_result.is_converged() {
        log::info!("Backends are already in sync");
    }

    let actions = plan(&diff_result, &settings.policy);

    let executor = Executor::new(backends.clone(), &settings.resilience);
    let report = executor.execute(actions, dry_run, cancel).await;

    Ok(SyncRun {
        report,
        rejected,
        stats,
    })
}

async fn fetch(
    backends: &Backends,
    system: SourceSystem,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<Vec<RawRecord>> {
    let client = backends.get(system);
    let description = format!("list items from {}", client.system());
    let records = retry
        .run(&description, cancel, || client.list_items())
        .await
        .with_context(|| format!("Failed to read inventory from {}", system))?;
    log::info!("Read {} records from {}", records.len(), system);
    Ok(records)
}
