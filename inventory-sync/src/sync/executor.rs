//! Executor
//!
//! Applies planned actions against the two backends and records an outcome
//! for each one. Actions bound for different backends run in two concurrent
//! lanes; within a lane, calls are gated by that backend's concurrency
//! limiter. One failed action never stops the others.

use futures::stream::{self, StreamExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::normalize::{create_payload, to_native};
use super::report::{ReportEntry, SyncOutcome, SyncReport};
use super::types::{SourceSystem, SyncAction};
use crate::api::resilience::{ConcurrencyLimiter, ResilienceConfig, RetryPolicy};
use crate::api::{BackendClient, BackendError};

/// The pair of backend clients a run talks to
#[derive(Clone)]
pub struct Backends {
    pub inventory_service: Arc<dyn BackendClient>,
    pub lab_registry: Arc<dyn BackendClient>,
}

impl Backends {
    pub fn new(inventory_service: Arc<dyn BackendClient>, lab_registry: Arc<dyn BackendClient>) -> Self {
        debug_assert_eq!(inventory_service.system(), SourceSystem::InventoryService);
        debug_assert_eq!(lab_registry.system(), SourceSystem::LabRegistry);
        Self {
            inventory_service,
            lab_registry,
        }
    }

    pub fn get(&self, system: SourceSystem) -> &Arc<dyn BackendClient> {
        match system {
            SourceSystem::InventoryService => &self.inventory_service,
            SourceSystem::LabRegistry => &self.lab_registry,
        }
    }
}

fn limiter_for(resilience: &ResilienceConfig, system: SourceSystem) -> ConcurrencyLimiter {
    ConcurrencyLimiter::new(system, resilience.concurrency.cap_for(system))
}

/// Applies sync actions with retries, per-backend limits and cancellation
pub struct Executor {
    backends: Backends,
    retry: RetryPolicy,
    inventory_limiter: ConcurrencyLimiter,
    registry_limiter: ConcurrencyLimiter,
}

impl Executor {
    pub fn new(backends: Backends, resilience: &ResilienceConfig) -> Self {
        Self {
            backends,
            retry: RetryPolicy::new(resilience.retry.clone()),
            inventory_limiter: limiter_for(resilience, SourceSystem::InventoryService),
            registry_limiter: limiter_for(resilience, SourceSystem::LabRegistry),
        }
    }

    fn limiter(&self, system: SourceSystem) -> &ConcurrencyLimiter {
        match system {
            SourceSystem::InventoryService => &self.inventory_limiter,
            SourceSystem::LabRegistry => &self.registry_limiter,
        }
    }

    /// Execute `actions` and report on each, in the order given.
    ///
    /// In a dry run no backend is called and every entry is `DryRun`.
    /// Once `cancel` fires, no further action starts; the report then holds
    /// only the actions that were processed and is flagged cancelled.
    pub async fn execute(
        &self,
        actions: Vec<SyncAction>,
        dry_run: bool,
        cancel: &CancellationToken,
    ) -> SyncReport {
        if dry_run {
            let entries = actions
                .into_iter()
                .map(|action| {
                    log::debug!("Dry run: {}", action);
                    ReportEntry {
                        action,
                        outcome: SyncOutcome::DryRun,
                    }
                })
                .collect();
            return SyncReport::new(entries, true, false);
        }

        let total = actions.len();
        let mut lanes: BTreeMap<Option<SourceSystem>, Vec<(usize, SyncAction)>> = BTreeMap::new();
        for (index, action) in actions.into_iter().enumerate() {
            lanes.entry(action.target()).or_default().push((index, action));
        }

        let skip_lane = lanes.remove(&None).unwrap_or_default();
        let inventory_lane = lanes
            .remove(&Some(SourceSystem::InventoryService))
            .unwrap_or_default();
        let registry_lane = lanes.remove(&Some(SourceSystem::LabRegistry)).unwrap_or_default();

        let (skipped, inventory, registry) = tokio::join!(
            async move { self.run_skips(skip_lane, cancel) },
            self.run_lane(SourceSystem::InventoryService, inventory_lane, cancel),
            self.run_lane(SourceSystem::LabRegistry, registry_lane, cancel),
        );

        let mut processed: Vec<(usize, ReportEntry)> = skipped
            .into_iter()
            .chain(inventory)
            .chain(registry)
            .flatten()
            .collect();
        processed.sort_by_key(|(index, _)| *index);

        for limiter in [&self.inventory_limiter, &self.registry_limiter] {
            let stats = limiter.stats();
            log::debug!(
                "{} limiter: {} calls, {} waited for a permit",
                limiter.system(),
                stats.requests_acquired,
                stats.requests_waited
            );
        }

        let cancelled = processed.len() < total;
        if cancelled {
            log::warn!(
                "Run cancelled: {} of {} actions processed",
                processed.len(),
                total
            );
        }

        let entries = processed.into_iter().map(|(_, entry)| entry).collect();
        SyncReport::new(entries, false, cancelled)
    }

    fn run_skips(
        &self,
        lane: Vec<(usize, SyncAction)>,
        cancel: &CancellationToken,
    ) -> Vec<Option<(usize, ReportEntry)>> {
        lane.into_iter()
            .map(|(index, action)| {
                if cancel.is_cancelled() {
                    return None;
                }
                log::info!("Skipped: {}", action);
                Some((
                    index,
                    ReportEntry {
                        action,
                        outcome: SyncOutcome::Skipped,
                    },
                ))
            })
            .collect()
    }

    async fn run_lane(
        &self,
        system: SourceSystem,
        lane: Vec<(usize, SyncAction)>,
        cancel: &CancellationToken,
    ) -> Vec<Option<(usize, ReportEntry)>> {
        let limiter = self.limiter(system);

        stream::iter(lane)
            .map(|(index, action)| async move {
                if cancel.is_cancelled() {
                    return None;
                }
                let outcome = match limiter.acquire().await {
                    Ok(_permit) => {
                        // Cancellation may have fired while waiting for the permit
                        if cancel.is_cancelled() {
                            return None;
                        }
                        self.apply(&action, cancel).await
                    }
                    Err(err) => SyncOutcome::Failed(format!("{} limiter closed: {}", system, err)),
                };
                Some((index, ReportEntry { action, outcome }))
            })
            .buffered(limiter.max_concurrent())
            .collect()
            .await
    }

    /// Apply a single action against its backend
    async fn apply(&self, action: &SyncAction, cancel: &CancellationToken) -> SyncOutcome {
        let result = match action {
            SyncAction::CreateIn { target, item } => {
                let client = self.backends.get(*target);
                let payload = create_payload(item, *target);
                let description = format!("create {} in {}", item.identity_key, target);
                match self
                    .retry
                    .run(&description, cancel, || client.create_item(&payload))
                    .await
                {
                    Ok(raw_id) => {
                        log::info!("Created {} in {} as {}", item.identity_key, target, raw_id);
                        Ok(())
                    }
                    Err(BackendError::AlreadyExists { message }) => {
                        log::info!(
                            "{} already exists in {}, nothing to do ({})",
                            item.identity_key,
                            target,
                            message
                        );
                        Ok(())
                    }
                    Err(err) => Err(err),
                }
            }
            SyncAction::UpdateIn {
                target,
                identity_key,
                raw_id,
                field_changes,
            } => {
                let client = self.backends.get(*target);
                let payload = to_native(field_changes, *target);
                let description = format!("update {} in {}", identity_key, target);
                self.retry
                    .run(&description, cancel, || client.update_item(raw_id, &payload))
                    .await
                    .map(|()| log::info!("Updated {} in {}", identity_key, target))
            }
            SyncAction::Skip { .. } => return SyncOutcome::Skipped,
        };

        match result {
            Ok(()) => SyncOutcome::Applied,
            Err(err) => {
                log::error!("Failed to {}: {}", action, err);
                SyncOutcome::Failed(err.to_string())
            }
        }
    }
}
