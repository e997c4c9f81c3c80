//! Sync planner
//!
//! Turns a `DiffResult` into an ordered list of `SyncAction`s according to
//! the configured direction and conflict resolution policy.
//!
//! Ordering is fixed so that identical inputs produce identical plans:
//! - Creates first
//! - Then updates
//! - Then skips
//!
//! each group ascending by identity key.

use serde::{Deserialize, Serialize};

use super::types::{Attributes, Conflict, DiffResult, FieldValue, InventoryItem, SourceSystem, SyncAction};

pub const REASON_UNRESOLVED_CONFLICT: &str = "unresolved conflict";

/// Which way records are allowed to flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SyncDirection {
    /// Inventory Service is the source, Lab Registry the target
    AToB,
    /// Lab Registry is the source, Inventory Service the target
    BToA,
    #[default]
    Bidirectional,
}

impl SyncDirection {
    /// Whether this direction permits mutating `target`
    pub fn allows_write_to(&self, target: SourceSystem) -> bool {
        match (self, target) {
            (Self::Bidirectional, _) => true,
            (Self::AToB, SourceSystem::LabRegistry) => true,
            (Self::BToA, SourceSystem::InventoryService) => true,
            _ => false,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::AToB => "a-to-b",
            Self::BToA => "b-to-a",
            Self::Bidirectional => "bidirectional",
        }
    }
}

/// How to settle items that exist on both sides with differing fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictResolution {
    /// Later `last_modified` wins, ties go to the Inventory Service
    #[default]
    PreferNewer,
    PreferA,
    PreferB,
    SkipConflicts,
}

impl ConflictResolution {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PreferNewer => "prefer-newer",
            Self::PreferA => "prefer-a",
            Self::PreferB => "prefer-b",
            Self::SkipConflicts => "skip-conflicts",
        }
    }
}

/// Planning policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncPolicy {
    pub direction: SyncDirection,
    pub conflict_resolution: ConflictResolution,
}

/// Build the ordered action list for a diff
pub fn plan(diff: &DiffResult, policy: &SyncPolicy) -> Vec<SyncAction> {
    let mut actions = Vec::with_capacity(
        diff.only_in_a.len() + diff.only_in_b.len() + diff.conflicting.len(),
    );

    for item in &diff.only_in_a {
        actions.push(plan_create(item, SourceSystem::LabRegistry, policy));
    }
    for item in &diff.only_in_b {
        actions.push(plan_create(item, SourceSystem::InventoryService, policy));
    }
    for conflict in &diff.conflicting {
        actions.push(plan_conflict(conflict, policy));
    }

    actions.sort_by(|x, y| {
        x.group()
            .cmp(&y.group())
            .then_with(|| x.identity_key().cmp(y.identity_key()))
    });

    log::debug!(
        "Planned {} actions ({} / {})",
        actions.len(),
        policy.direction.label(),
        policy.conflict_resolution.label()
    );

    actions
}

fn plan_create(item: &InventoryItem, target: SourceSystem, policy: &SyncPolicy) -> SyncAction {
    if policy.direction.allows_write_to(target) {
        SyncAction::CreateIn {
            target,
            item: item.clone(),
        }
    } else {
        SyncAction::Skip {
            identity_key: item.identity_key.clone(),
            reason: direction_reason(policy.direction, target),
        }
    }
}

fn plan_conflict(conflict: &Conflict, policy: &SyncPolicy) -> SyncAction {
    let Some(winner) = resolve_winner(conflict, policy.conflict_resolution) else {
        return SyncAction::Skip {
            identity_key: conflict.identity_key().to_string(),
            reason: REASON_UNRESOLVED_CONFLICT.to_string(),
        };
    };

    let target = winner.other();
    if !policy.direction.allows_write_to(target) {
        return SyncAction::Skip {
            identity_key: conflict.identity_key().to_string(),
            reason: direction_reason(policy.direction, target),
        };
    }

    SyncAction::UpdateIn {
        target,
        identity_key: conflict.identity_key().to_string(),
        raw_id: conflict.item(target).raw_id.clone(),
        field_changes: winning_values(conflict, winner),
    }
}

/// Decide which side's values win, `None` when the conflict is left alone
pub fn resolve_winner(conflict: &Conflict, resolution: ConflictResolution) -> Option<SourceSystem> {
    match resolution {
        ConflictResolution::PreferNewer => {
            if conflict.item_b.last_modified > conflict.item_a.last_modified {
                Some(SourceSystem::LabRegistry)
            } else {
                Some(SourceSystem::InventoryService)
            }
        }
        ConflictResolution::PreferA => Some(SourceSystem::InventoryService),
        ConflictResolution::PreferB => Some(SourceSystem::LabRegistry),
        ConflictResolution::SkipConflicts => None,
    }
}

/// Only the differing fields, with the winner's values. A field the winner
/// lacks is cleared on the other side.
fn winning_values(conflict: &Conflict, winner: SourceSystem) -> Attributes {
    conflict
        .diffs
        .iter()
        .map(|d| {
            let value = d.value_in(winner).cloned().unwrap_or(FieldValue::Null);
            (d.field_name.clone(), value)
        })
        .collect()
}

fn direction_reason(direction: SyncDirection, target: SourceSystem) -> String {
    format!("direction {} does not write to {}", direction.label(), target)
}
