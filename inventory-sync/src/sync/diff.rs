//! Diff logic for comparing canonical item sets between the two systems
//!
//! This module provides functions to:
//! - Partition identity keys into only-in-A, only-in-B, conflicting and in-sync
//! - Produce field-level diffs for conflicting items
//! - Summarize a diff for reporting

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::normalize::all_canonical_fields;
use super::types::{Attributes, Conflict, DiffResult, FieldDiff, ItemSet, SourceSystem};

/// Fields for which absence on one side counts as a difference.
///
/// Fields present on both sides are always compared; tracking only affects
/// what happens when one side is missing the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedFields(BTreeSet<String>);

impl TrackedFields {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(fields.into_iter().map(Into::into).collect())
    }

    /// Track every canonical field either backend carries
    pub fn all() -> Self {
        Self(all_canonical_fields())
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self(BTreeSet::new())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }
}

impl Default for TrackedFields {
    fn default() -> Self {
        Self::all()
    }
}

/// Compare two canonical item sets and partition their identity keys
///
/// # Arguments
/// * `items_a` - Items read from the Inventory Service
/// * `items_b` - Items read from the Lab Registry
/// * `tracked` - Fields whose absence on one side is a difference
///
/// # Returns
/// A `DiffResult` whose partitions are ordered by identity key, so equal
/// inputs always produce equal output.
pub fn diff(items_a: &ItemSet, items_b: &ItemSet, tracked: &TrackedFields) -> DiffResult {
    let mut result = DiffResult::default();

    for item_a in items_a.iter() {
        match items_b.get(&item_a.identity_key) {
            Some(item_b) => {
                let diffs = compare_attributes(&item_a.attributes, &item_b.attributes, tracked);
                if diffs.is_empty() {
                    result.in_sync += 1;
                } else {
                    result.conflicting.push(Conflict {
                        item_a: item_a.clone(),
                        item_b: item_b.clone(),
                        diffs,
                    });
                }
            }
            None => result.only_in_a.push(item_a.clone()),
        }
    }

    result.only_in_b = items_b
        .iter()
        .filter(|item| !items_a.contains(&item.identity_key))
        .cloned()
        .collect();

    log::debug!(
        "Diff: {} only in A, {} only in B, {} conflicting, {} in sync",
        result.only_in_a.len(),
        result.only_in_b.len(),
        result.conflicting.len(),
        result.in_sync
    );

    result
}

/// Field-level comparison of two attribute maps, ordered by field name.
///
/// A null value counts as absent, so a field cleared on one side matches a
/// side that never had it.
pub fn compare_attributes(a: &Attributes, b: &Attributes, tracked: &TrackedFields) -> Vec<FieldDiff> {
    let names: BTreeSet<&String> = a.keys().chain(b.keys()).collect();

    names
        .into_iter()
        .filter_map(|name| {
            let value_a = a.get(name).filter(|v| !v.is_null());
            let value_b = b.get(name).filter(|v| !v.is_null());
            let differs = match (value_a, value_b) {
                (Some(va), Some(vb)) => va != vb,
                (None, None) => false,
                _ => tracked.contains(name),
            };
            differs.then(|| FieldDiff {
                field_name: name.clone(),
                value_in_a: value_a.cloned(),
                value_in_b: value_b.cloned(),
            })
        })
        .collect()
}

/// Summary statistics for a diff
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub total_a: usize,
    pub total_b: usize,
    pub only_in_a: usize,
    pub only_in_b: usize,
    pub conflicting: usize,
    pub in_sync: usize,
}

impl DiffStats {
    pub fn from_diff(diff: &DiffResult) -> Self {
        Self {
            total_a: diff.only_in_a.len() + diff.conflicting.len() + diff.in_sync,
            total_b: diff.only_in_b.len() + diff.conflicting.len() + diff.in_sync,
            only_in_a: diff.only_in_a.len(),
            only_in_b: diff.only_in_b.len(),
            conflicting: diff.conflicting.len(),
            in_sync: diff.in_sync,
        }
    }
}

impl std::fmt::Display for DiffStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} in sync, {} only in {}, {} only in {}, {} conflicting ({} + {} records read)",
            self.in_sync,
            self.only_in_a,
            SourceSystem::InventoryService,
            self.only_in_b,
            SourceSystem::LabRegistry,
            self.conflicting,
            self.total_a,
            self.total_b
        )
    }
}
