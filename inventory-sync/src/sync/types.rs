//! Core data types for inventory reconciliation
//!
//! These types define the canonical model both backends are normalized into,
//! the diff produced by comparing them, and the actions planned from that diff.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The two systems being reconciled. "A" is always the Inventory Service,
/// "B" is always the Lab Registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceSystem {
    InventoryService,
    LabRegistry,
}

impl SourceSystem {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InventoryService => "Inventory Service",
            Self::LabRegistry => "Lab Registry",
        }
    }

    /// The system on the other side of the reconciliation
    pub fn other(&self) -> Self {
        match self {
            Self::InventoryService => Self::LabRegistry,
            Self::LabRegistry => Self::InventoryService,
        }
    }
}

impl std::fmt::Display for SourceSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// A canonical attribute value
///
/// Whole numbers are always `Int` regardless of how the backend encoded them,
/// so `500` and `500.0` compare equal after normalization. Integers beyond
/// the `i64` range keep their exact digits as a `String`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum FieldValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Parse from a backend JSON value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => FieldValue::Null,
            serde_json::Value::Bool(b) => FieldValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else if n.is_u64() {
                    FieldValue::String(n.to_string())
                } else if let Some(f) = n.as_f64() {
                    // i64::MAX as f64 rounds up to 2^63, which is out of range
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                        FieldValue::Int(f as i64)
                    } else {
                        FieldValue::Float(f)
                    }
                } else {
                    FieldValue::Null
                }
            }
            serde_json::Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    FieldValue::Null
                } else {
                    FieldValue::String(trimmed.to_string())
                }
            }
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                // Nested structures are compared by their serialized form
                FieldValue::String(json.to_string())
            }
        }
    }

    /// Convert to JSON for backend payloads
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            FieldValue::Null => serde_json::Value::Null,
            FieldValue::Bool(b) => serde_json::Value::Bool(*b),
            FieldValue::Int(i) => serde_json::json!(*i),
            FieldValue::Float(f) => serde_json::json!(*f),
            FieldValue::String(s) => serde_json::Value::String(s.clone()),
        }
    }
}

impl std::fmt::Display for FieldValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldValue::Null => write!(f, "(null)"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Float(fl) => write!(f, "{}", fl),
            FieldValue::String(s) => write!(f, "{}", s),
        }
    }
}

/// Canonical attribute mapping, keyed by canonical field name
pub type Attributes = BTreeMap<String, FieldValue>;

/// Canonical inventory record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Stable cross-system key (the barcode)
    pub identity_key: String,
    /// Canonical attributes, excluding the identity field
    pub attributes: Attributes,
    /// Which system this record was read from
    pub source_system: SourceSystem,
    /// Last modification time reported by the source system
    pub last_modified: DateTime<Utc>,
    /// System-native identifier, only used when calling back into that system
    pub raw_id: String,
}

/// A single differing field between two records sharing an identity key.
/// `None` means the field is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub field_name: String,
    pub value_in_a: Option<FieldValue>,
    pub value_in_b: Option<FieldValue>,
}

impl FieldDiff {
    /// Value held by the given side
    pub fn value_in(&self, system: SourceSystem) -> Option<&FieldValue> {
        match system {
            SourceSystem::InventoryService => self.value_in_a.as_ref(),
            SourceSystem::LabRegistry => self.value_in_b.as_ref(),
        }
    }
}

/// Canonical items from one source, unique by identity key
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemSet {
    items: BTreeMap<String, InventoryItem>,
}

impl ItemSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item, handing it back if its identity key is already taken
    pub fn insert(&mut self, item: InventoryItem) -> Result<(), InventoryItem> {
        if self.items.contains_key(&item.identity_key) {
            return Err(item);
        }
        self.items.insert(item.identity_key.clone(), item);
        Ok(())
    }

    pub fn get(&self, identity_key: &str) -> Option<&InventoryItem> {
        self.items.get(identity_key)
    }

    pub fn contains(&self, identity_key: &str) -> bool {
        self.items.contains_key(identity_key)
    }

    /// Items in ascending identity key order
    pub fn iter(&self) -> impl Iterator<Item = &InventoryItem> {
        self.items.values()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

impl FromIterator<InventoryItem> for ItemSet {
    /// Later duplicates of an identity key are dropped
    fn from_iter<I: IntoIterator<Item = InventoryItem>>(iter: I) -> Self {
        let mut set = ItemSet::new();
        for item in iter {
            let _ = set.insert(item);
        }
        set
    }
}

/// Two records with the same identity key whose attributes disagree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub item_a: InventoryItem,
    pub item_b: InventoryItem,
    /// Ordered by field name
    pub diffs: Vec<FieldDiff>,
}

impl Conflict {
    pub fn identity_key(&self) -> &str {
        &self.item_a.identity_key
    }

    pub fn item(&self, system: SourceSystem) -> &InventoryItem {
        match system {
            SourceSystem::InventoryService => &self.item_a,
            SourceSystem::LabRegistry => &self.item_b,
        }
    }
}

/// Three disjoint partitions of the identity keys seen across both sources.
/// Keys that are in sync appear in none of them and are only counted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffResult {
    pub only_in_a: Vec<InventoryItem>,
    pub only_in_b: Vec<InventoryItem>,
    pub conflicting: Vec<Conflict>,
    pub in_sync: usize,
}

impl DiffResult {
    /// True when both systems already agree on everything tracked
    pub fn is_converged(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.conflicting.is_empty()
    }
}

/// A planned mutation (or deliberate non-mutation) against one backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncAction {
    /// Create `item` in `target`
    CreateIn {
        target: SourceSystem,
        item: InventoryItem,
    },
    /// Overwrite `field_changes` on the `target` record identified by `raw_id`
    UpdateIn {
        target: SourceSystem,
        identity_key: String,
        raw_id: String,
        field_changes: Attributes,
    },
    /// Leave the item alone
    Skip {
        identity_key: String,
        reason: String,
    },
}

impl SyncAction {
    pub fn identity_key(&self) -> &str {
        match self {
            Self::CreateIn { item, .. } => &item.identity_key,
            Self::UpdateIn { identity_key, .. } => identity_key,
            Self::Skip { identity_key, .. } => identity_key,
        }
    }

    /// The backend this action mutates, if any
    pub fn target(&self) -> Option<SourceSystem> {
        match self {
            Self::CreateIn { target, .. } | Self::UpdateIn { target, .. } => Some(*target),
            Self::Skip { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateIn { .. } => "create",
            Self::UpdateIn { .. } => "update",
            Self::Skip { .. } => "skip",
        }
    }

    /// Plan ordering group: creates, then updates, then skips
    pub(crate) fn group(&self) -> u8 {
        match self {
            Self::CreateIn { .. } => 0,
            Self::UpdateIn { .. } => 1,
            Self::Skip { .. } => 2,
        }
    }
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CreateIn { target, item } => {
                write!(f, "create {} in {}", item.identity_key, target)
            }
            Self::UpdateIn {
                target,
                identity_key,
                field_changes,
                ..
            } => {
                let fields: Vec<&str> = field_changes.keys().map(String::as_str).collect();
                write!(
                    f,
                    "update {} in {} ({})",
                    identity_key,
                    target,
                    fields.join(", ")
                )
            }
            Self::Skip {
                identity_key,
                reason,
            } => write!(f, "skip {}: {}", identity_key, reason),
        }
    }
}
