//! Lab Registry API client
//!
//! Bearer-token JSON API. Inventory lives in the registry's starting
//! materials collection; each record is addressed by its `item_id`.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use super::error::BackendError;
use super::{BackendClient, RawRecord, http_client, join_url};
use crate::sync::types::SourceSystem;

const LIST_ENDPOINT: &str = "starting-materials/";
const CREATE_ENDPOINT: &str = "new-sample/";
const UPDATE_ENDPOINT: &str = "save-item/";

const ITEM_TYPE: &str = "starting_materials";

/// Client for the Lab Registry API
#[derive(Debug, Clone)]
pub struct LabRegistryClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl LabRegistryClient {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        raw_id: Option<&str>,
    ) -> Result<Value, BackendError> {
        let response = request.bearer_auth(&self.api_key).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;
        parse_response(status, &text, raw_id)
    }
}

#[async_trait]
impl BackendClient for LabRegistryClient {
    fn system(&self) -> SourceSystem {
        SourceSystem::LabRegistry
    }

    async fn list_items(&self) -> Result<Vec<RawRecord>, BackendError> {
        let url = join_url(&self.api_url, LIST_ENDPOINT);
        log::debug!("GET {}", url);
        let json = self.send(self.http.get(&url), None).await?;
        extract_items(&json)
    }

    async fn create_item(&self, fields: &RawRecord) -> Result<String, BackendError> {
        let url = join_url(&self.api_url, CREATE_ENDPOINT);
        log::debug!("POST {}", url);
        let body = json!({ "new_sample_data": creation_data(fields)? });
        let json = self.send(self.http.post(&url).json(&body), None).await?;
        extract_created_id(&json)
    }

    async fn update_item(&self, raw_id: &str, fields: &RawRecord) -> Result<(), BackendError> {
        let url = join_url(&self.api_url, UPDATE_ENDPOINT);
        log::debug!("POST {} ({})", url, raw_id);
        let body = json!({ "item_id": raw_id, "data": fields });
        self.send(self.http.post(&url).json(&body), Some(raw_id)).await?;
        Ok(())
    }
}

/// Registry item ids are derived from the barcode, so a repeated create
/// for the same barcode is rejected by the registry as a duplicate.
fn creation_data(fields: &RawRecord) -> Result<RawRecord, BackendError> {
    let mut data = fields.clone();
    if !data.contains_key("item_id") {
        let barcode = data
            .get("barcode")
            .and_then(Value::as_str)
            .ok_or_else(|| BackendError::permanent(None, "cannot create a registry item without a barcode"))?;
        data.insert("item_id".to_string(), Value::String(item_id_for(barcode)));
    }
    data.insert("type".to_string(), Value::String(ITEM_TYPE.to_string()));
    Ok(data)
}

/// Registry ids allow only alphanumerics, `_` and `-`. Every other byte,
/// `_` included, becomes `_` plus two hex digits, so distinct barcodes
/// always get distinct ids.
fn item_id_for(barcode: &str) -> String {
    let mut id = String::with_capacity(barcode.len());
    for byte in barcode.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            id.push(byte as char);
        } else {
            id.push_str(&format!("_{:02x}", byte));
        }
    }
    id
}

fn parse_response(status: u16, body: &str, raw_id: Option<&str>) -> Result<Value, BackendError> {
    if !(200..300).contains(&status) {
        return Err(BackendError::from_status(status, body, raw_id));
    }

    let json: Value = serde_json::from_str(body).map_err(|_| {
        BackendError::permanent(Some(status), format!("Bad response from Lab Registry: {}", body))
    })?;

    match json.get("status").and_then(Value::as_str) {
        Some("success") | None => Ok(json),
        Some(_) => {
            let message = json
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| json.to_string());
            Err(BackendError::from_error_body(&message, raw_id))
        }
    }
}

fn extract_items(json: &Value) -> Result<Vec<RawRecord>, BackendError> {
    let items = json
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::permanent(None, "list response has no items"))?;

    Ok(items
        .iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(map.clone()),
            other => {
                log::warn!("Ignoring non-object registry item: {}", other);
                None
            }
        })
        .collect())
}

fn extract_created_id(json: &Value) -> Result<String, BackendError> {
    json.get("sample_list_entry")
        .and_then(|entry| entry.get("item_id"))
        .or_else(|| json.get("item_id"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| BackendError::permanent(None, format!("create response has no item_id: {}", json)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_data_derives_item_id() {
        let mut fields = RawRecord::new();
        fields.insert("barcode".to_string(), json!("LAB 0042/a"));
        fields.insert("name".to_string(), json!("Acetone"));

        let data = creation_data(&fields).unwrap();
        assert_eq!(data.get("item_id"), Some(&json!("LAB_200042_2fa")));
        assert_eq!(data.get("type"), Some(&json!("starting_materials")));
        assert_eq!(data.get("name"), Some(&json!("Acetone")));
    }

    #[test]
    fn test_item_ids_never_collide() {
        let barcodes = ["LAB 0042/a", "LAB_0042_a", "LAB-0042-a", "LAB/0042 a", "LAB_200042_2fa", "LAB\u{e9}"];
        let ids: Vec<String> = barcodes.iter().map(|b| item_id_for(b)).collect();
        assert_eq!(ids[1], "LAB_5f0042_5fa");
        assert_eq!(ids[2], "LAB-0042-a");
        assert_eq!(ids[5], "LAB_c3_a9");

        let unique: std::collections::BTreeSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), barcodes.len());
        assert!(ids.iter().all(|id| id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')));
    }

    #[test]
    fn test_creation_data_requires_barcode() {
        assert!(creation_data(&RawRecord::new()).is_err());
    }

    #[test]
    fn test_parse_response_classification() {
        assert!(parse_response(200, r#"{"status":"success","items":[]}"#, None).is_ok());
        assert!(matches!(
            parse_response(409, "item_id already exists", None),
            Err(BackendError::AlreadyExists { .. })
        ));
        assert_eq!(
            parse_response(404, "", Some("acetone-1")),
            Err(BackendError::NotFound {
                raw_id: "acetone-1".to_string()
            })
        );
        assert!(parse_response(500, "oops", None).unwrap_err().is_transient());
        assert!(matches!(
            parse_response(200, r#"{"status":"error","message":"validation failed"}"#, None),
            Err(BackendError::Permanent { .. })
        ));
    }

    #[test]
    fn test_extract_items_and_created_id() {
        let items = extract_items(&json!({"status": "success", "items": [{"item_id": "a"}]})).unwrap();
        assert_eq!(items.len(), 1);
        assert!(extract_items(&json!({"status": "success"})).is_err());

        let id = extract_created_id(&json!({"sample_list_entry": {"item_id": "X1"}})).unwrap();
        assert_eq!(id, "X1");
    }
}
