//! Record normalization
//!
//! Maps each backend's native record shape into canonical `InventoryItem`s
//! using a statically declared translation table per source system, and
//! maps canonical attributes back into native payloads for writes.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::BTreeSet;

use super::types::{Attributes, FieldValue, InventoryItem, ItemSet, SourceSystem};
use crate::api::RawRecord;

/// Field translation table for one backend
#[derive(Debug)]
pub struct FieldTable {
    pub system: SourceSystem,
    /// Native field holding the system-native identifier
    pub raw_id_field: &'static str,
    /// Native field the identity key is derived from
    pub identity_field: &'static str,
    /// Native field holding the last modification time
    pub modified_field: &'static str,
    /// `(native_name, canonical_name)` pairs
    pub attributes: &'static [(&'static str, &'static str)],
}

/// Container rows exported by the Inventory Service
pub const INVENTORY_SERVICE_FIELDS: FieldTable = FieldTable {
    system: SourceSystem::InventoryService,
    raw_id_field: "id",
    identity_field: "barcode",
    modified_field: "lastupdated",
    attributes: &[
        ("name", "name"),
        ("cas", "cas_number"),
        ("location", "location"),
        ("size", "quantity"),
        ("unit", "unit"),
        ("supplier", "supplier"),
        ("comments", "description"),
    ],
};

/// Starting materials held by the Lab Registry
pub const LAB_REGISTRY_FIELDS: FieldTable = FieldTable {
    system: SourceSystem::LabRegistry,
    raw_id_field: "item_id",
    identity_field: "barcode",
    modified_field: "last_modified",
    attributes: &[
        ("name", "name"),
        ("CAS", "cas_number"),
        ("location", "location"),
        ("size", "quantity"),
        ("size_unit", "unit"),
        ("supplier", "supplier"),
        ("description", "description"),
    ],
};

/// Get the translation table for a source system
pub fn field_table(system: SourceSystem) -> &'static FieldTable {
    match system {
        SourceSystem::InventoryService => &INVENTORY_SERVICE_FIELDS,
        SourceSystem::LabRegistry => &LAB_REGISTRY_FIELDS,
    }
}

impl FieldTable {
    /// Native name for a canonical field, if this backend carries it
    pub fn native_name(&self, canonical: &str) -> Option<&'static str> {
        self.attributes
            .iter()
            .find(|(_, c)| *c == canonical)
            .map(|(n, _)| *n)
    }

    pub fn canonical_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.attributes.iter().map(|(_, c)| *c)
    }
}

/// Every canonical field known to either backend
pub fn all_canonical_fields() -> BTreeSet<String> {
    INVENTORY_SERVICE_FIELDS
        .canonical_fields()
        .chain(LAB_REGISTRY_FIELDS.canonical_fields())
        .map(str::to_string)
        .collect()
}

/// A single source record that could not be normalized
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedRecordError {
    /// The identity field is absent
    MissingIdentity {
        source: SourceSystem,
        index: usize,
        field: &'static str,
    },
    /// The identity field is present but blank or not a scalar
    EmptyIdentity {
        source: SourceSystem,
        index: usize,
        field: &'static str,
    },
    /// Another record from the same source already claimed this key
    DuplicateIdentity {
        source: SourceSystem,
        identity_key: String,
    },
    /// The system-native identifier is absent, so the record cannot be written back
    MissingRawId {
        source: SourceSystem,
        identity_key: String,
    },
    /// The modification timestamp could not be parsed
    InvalidTimestamp {
        source: SourceSystem,
        identity_key: String,
        value: String,
    },
}

impl std::fmt::Display for MalformedRecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MalformedRecordError::MissingIdentity {
                source,
                index,
                field,
            } => write!(f, "{} record #{} has no '{}' field", source, index, field),
            MalformedRecordError::EmptyIdentity {
                source,
                index,
                field,
            } => write!(f, "{} record #{} has an empty '{}' field", source, index, field),
            MalformedRecordError::DuplicateIdentity {
                source,
                identity_key,
            } => write!(
                f,
                "{} has more than one record with key '{}', keeping the first",
                source, identity_key
            ),
            MalformedRecordError::MissingRawId {
                source,
                identity_key,
            } => write!(f, "{} record '{}' has no native id", source, identity_key),
            MalformedRecordError::InvalidTimestamp {
                source,
                identity_key,
                value,
            } => write!(
                f,
                "{} record '{}' has an unparseable timestamp '{}'",
                source, identity_key, value
            ),
        }
    }
}

impl std::error::Error for MalformedRecordError {}

/// Result of normalizing one backend's records
#[derive(Debug, Clone, Default)]
pub struct Normalized {
    pub items: ItemSet,
    pub rejected: Vec<MalformedRecordError>,
}

/// Normalize raw backend records into a canonical item set.
///
/// Malformed records are excluded and reported, never fatal.
pub fn normalize(raw_records: &[RawRecord], source: SourceSystem) -> Normalized {
    let table = field_table(source);
    let mut normalized = Normalized::default();

    for (index, raw) in raw_records.iter().enumerate() {
        let item = match normalize_record(raw, index, table) {
            Ok(item) => item,
            Err(err) => {
                log::warn!("Skipping malformed record: {}", err);
                normalized.rejected.push(err);
                continue;
            }
        };

        if let Err(duplicate) = normalized.items.insert(item) {
            let err = MalformedRecordError::DuplicateIdentity {
                source,
                identity_key: duplicate.identity_key,
            };
            log::warn!("Skipping malformed record: {}", err);
            normalized.rejected.push(err);
        }
    }

    log::debug!(
        "Normalized {} of {} {} records",
        normalized.items.len(),
        raw_records.len(),
        source
    );

    normalized
}

/// Normalize a single record using the given table
pub fn normalize_record(
    raw: &RawRecord,
    index: usize,
    table: &FieldTable,
) -> Result<InventoryItem, MalformedRecordError> {
    let source = table.system;

    let identity_key = match raw.get(table.identity_field) {
        None | Some(serde_json::Value::Null) => {
            return Err(MalformedRecordError::MissingIdentity {
                source,
                index,
                field: table.identity_field,
            });
        }
        Some(value) => match scalar_to_string(value) {
            Some(key) => key,
            None => {
                return Err(MalformedRecordError::EmptyIdentity {
                    source,
                    index,
                    field: table.identity_field,
                });
            }
        },
    };

    let raw_id = raw
        .get(table.raw_id_field)
        .and_then(scalar_to_string)
        .ok_or_else(|| MalformedRecordError::MissingRawId {
            source,
            identity_key: identity_key.clone(),
        })?;

    let last_modified = match raw.get(table.modified_field) {
        None | Some(serde_json::Value::Null) => DateTime::<Utc>::default(),
        Some(value) => {
            parse_timestamp(value).ok_or_else(|| MalformedRecordError::InvalidTimestamp {
                source,
                identity_key: identity_key.clone(),
                value: value.to_string(),
            })?
        }
    };

    let mut attributes = Attributes::new();
    for (native, canonical) in table.attributes {
        if let Some(value) = raw.get(*native) {
            attributes.insert(canonical.to_string(), FieldValue::from_json(value));
        }
    }

    Ok(InventoryItem {
        identity_key,
        attributes,
        source_system: source,
        last_modified,
        raw_id,
    })
}

/// Translate canonical attributes into a native payload for `target`.
/// Fields the target does not carry are dropped.
pub fn to_native(attributes: &Attributes, target: SourceSystem) -> RawRecord {
    let table = field_table(target);
    let mut record = RawRecord::new();
    for (canonical, value) in attributes {
        match table.native_name(canonical) {
            Some(native) => {
                record.insert(native.to_string(), value.to_json());
            }
            None => log::debug!("{} has no field for '{}', dropping it", target, canonical),
        }
    }
    record
}

/// Native payload for creating `item` in `target`, identity field included
pub fn create_payload(item: &InventoryItem, target: SourceSystem) -> RawRecord {
    let mut record = to_native(&item.attributes, target);
    record.insert(
        field_table(target).identity_field.to_string(),
        serde_json::Value::String(item.identity_key.clone()),
    );
    record
}

fn scalar_to_string(value: &serde_json::Value) -> Option<String> {
    let s = match value {
        serde_json::Value::String(s) => s.trim().to_string(),
        serde_json::Value::Number(n) => n.to_string(),
        _ => return None,
    };
    if s.is_empty() { None } else { Some(s) }
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or Unix seconds
fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::Number(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp(secs, 0)
        }
        serde_json::Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(naive.and_utc());
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
            }
            None
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("test record must be an object"),
        }
    }

    #[test]
    fn test_normalize_inventory_service_row() {
        let raw = vec![record(json!({
            "id": 4411,
            "barcode": " X1 ",
            "name": "Acetone",
            "cas": "67-64-1",
            "size": 500.0,
            "unit": "mL",
            "lastupdated": "2024-03-01 10:00:00",
            "internal_flag": true
        }))];

        let normalized = normalize(&raw, SourceSystem::InventoryService);
        assert!(normalized.rejected.is_empty());

        let item = normalized.items.get("X1").unwrap();
        assert_eq!(item.raw_id, "4411");
        assert_eq!(item.source_system, SourceSystem::InventoryService);
        assert_eq!(
            item.attributes.get("cas_number"),
            Some(&FieldValue::String("67-64-1".to_string()))
        );
        assert_eq!(item.attributes.get("quantity"), Some(&FieldValue::Int(500)));
        assert!(!item.attributes.contains_key("internal_flag"));
        assert_eq!(item.last_modified.to_rfc3339(), "2024-03-01T10:00:00+00:00");
    }

    #[test]
    fn test_normalize_lab_registry_uses_its_own_names() {
        let raw = vec![record(json!({
            "item_id": "acetone-1",
            "barcode": "X1",
            "CAS": "67-64-1",
            "size_unit": "mL",
            "last_modified": "2024-03-01T10:00:00Z"
        }))];

        let normalized = normalize(&raw, SourceSystem::LabRegistry);
        let item = normalized.items.get("X1").unwrap();
        assert_eq!(item.raw_id, "acetone-1");
        assert_eq!(
            item.attributes.get("unit"),
            Some(&FieldValue::String("mL".to_string()))
        );
        assert_eq!(
            item.attributes.get("cas_number"),
            Some(&FieldValue::String("67-64-1".to_string()))
        );
    }

    #[test]
    fn test_missing_identity_is_rejected_not_fatal() {
        let raw = vec![
            record(json!({"id": 1, "name": "no barcode"})),
            record(json!({"id": 2, "barcode": "", "name": "blank barcode"})),
            record(json!({"id": 3, "barcode": "X3"})),
        ];

        let normalized = normalize(&raw, SourceSystem::InventoryService);
        assert_eq!(normalized.items.len(), 1);
        assert_eq!(normalized.rejected.len(), 2);
        assert!(matches!(
            normalized.rejected[0],
            MalformedRecordError::MissingIdentity { index: 0, .. }
        ));
        assert!(matches!(
            normalized.rejected[1],
            MalformedRecordError::EmptyIdentity { index: 1, .. }
        ));
    }

    #[test]
    fn test_duplicate_identity_keeps_first() {
        let raw = vec![
            record(json!({"id": 1, "barcode": "X1", "name": "first"})),
            record(json!({"id": 2, "barcode": "X1", "name": "second"})),
        ];

        let normalized = normalize(&raw, SourceSystem::InventoryService);
        assert_eq!(normalized.items.get("X1").unwrap().raw_id, "1");
        assert_eq!(
            normalized.rejected,
            vec![MalformedRecordError::DuplicateIdentity {
                source: SourceSystem::InventoryService,
                identity_key: "X1".to_string(),
            }]
        );
    }

    #[test]
    fn test_timestamps() {
        assert_eq!(
            parse_timestamp(&json!(100)).unwrap().timestamp(),
            100
        );
        assert!(parse_timestamp(&json!("2024-03-01")).is_some());
        assert!(parse_timestamp(&json!("yesterday")).is_none());

        let raw = vec![
            record(json!({"id": 1, "barcode": "X1", "lastupdated": "yesterday"})),
            record(json!({"id": 2, "barcode": "X2"})),
        ];
        let normalized = normalize(&raw, SourceSystem::InventoryService);
        assert!(matches!(
            normalized.rejected[0],
            MalformedRecordError::InvalidTimestamp { .. }
        ));
        assert_eq!(normalized.items.get("X2").unwrap().last_modified.timestamp(), 0);
    }

    #[test]
    fn test_create_payload_translates_and_sets_identity() {
        let mut attributes = Attributes::new();
        attributes.insert("cas_number".to_string(), FieldValue::String("67-64-1".to_string()));
        attributes.insert("unit".to_string(), FieldValue::String("mL".to_string()));
        let item = InventoryItem {
            identity_key: "X1".to_string(),
            attributes,
            source_system: SourceSystem::InventoryService,
            last_modified: DateTime::<Utc>::default(),
            raw_id: "4411".to_string(),
        };

        let payload = create_payload(&item, SourceSystem::LabRegistry);
        assert_eq!(payload.get("CAS"), Some(&json!("67-64-1")));
        assert_eq!(payload.get("size_unit"), Some(&json!("mL")));
        assert_eq!(payload.get("barcode"), Some(&json!("X1")));
        assert!(!payload.contains_key("item_id"));
    }

    #[test]
    fn test_tables_cover_the_same_canonical_fields() {
        let a: BTreeSet<&str> = INVENTORY_SERVICE_FIELDS.canonical_fields().collect();
        let b: BTreeSet<&str> = LAB_REGISTRY_FIELDS.canonical_fields().collect();
        assert_eq!(a, b);
        assert_eq!(all_canonical_fields().len(), a.len());
    }
}
