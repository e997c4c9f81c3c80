//! Inventory Service API client
//!
//! Every call is a JSON POST whose body carries the `authtoken`. A call only
//! succeeds when the response is HTTP 200, parses as JSON, reports
//! `"status": "success"` and contains a `data` key.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::time::Duration;

use super::error::BackendError;
use super::{BackendClient, RawRecord, http_client, join_url};
use crate::sync::types::SourceSystem;

pub const DEFAULT_API_URL: &str = "https://app.cheminventory.net/api";

const DETAILS_ENDPOINT: &str = "general/getdetails";
const EXPORT_ENDPOINT: &str = "inventorymanagement/export";
const ADD_CONTAINER_ENDPOINT: &str = "inventorymanagement/addcontainer";
const EDIT_CONTAINER_ENDPOINT: &str = "inventorymanagement/editcontainer";

/// The inventory a token is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryDetails {
    pub number: i64,
    pub name: String,
}

/// Client for the Inventory Service API
#[derive(Debug, Clone)]
pub struct InventoryServiceClient {
    http: reqwest::Client,
    api_url: String,
    auth_token: String,
}

impl InventoryServiceClient {
    pub fn new(api_url: impl Into<String>, auth_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: http_client(timeout)?,
            api_url: api_url.into(),
            auth_token: auth_token.into(),
        })
    }

    /// Verify the token and report which inventory it is connected to
    pub async fn connect(&self) -> Result<InventoryDetails, BackendError> {
        let data = self.post(DETAILS_ENDPOINT, RawRecord::new(), None).await?;
        let details = parse_details(&data)?;
        log::info!(
            "Connected to Inventory Service: {} ({})",
            details.name,
            details.number
        );
        Ok(details)
    }

    /// POST to an endpoint, returning the `data` payload of the response
    async fn post(
        &self,
        endpoint: &str,
        body: RawRecord,
        raw_id: Option<&str>,
    ) -> Result<Value, BackendError> {
        let url = join_url(&self.api_url, endpoint);
        let mut payload = body;
        payload.insert("authtoken".to_string(), Value::String(self.auth_token.clone()));

        log::debug!("POST {}", url);
        let response = self.http.post(&url).json(&payload).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        parse_envelope(status, &text, raw_id)
    }
}

#[async_trait]
impl BackendClient for InventoryServiceClient {
    fn system(&self) -> SourceSystem {
        SourceSystem::InventoryService
    }

    async fn list_items(&self) -> Result<Vec<RawRecord>, BackendError> {
        let data = self.post(EXPORT_ENDPOINT, RawRecord::new(), None).await?;
        extract_rows(&data)
    }

    async fn create_item(&self, fields: &RawRecord) -> Result<String, BackendError> {
        let mut body = RawRecord::new();
        body.insert("container".to_string(), Value::Object(fields.clone()));
        let data = self.post(ADD_CONTAINER_ENDPOINT, body, None).await?;
        extract_created_id(&data)
    }

    async fn update_item(&self, raw_id: &str, fields: &RawRecord) -> Result<(), BackendError> {
        let mut body = RawRecord::new();
        body.insert("containerid".to_string(), json!(raw_id));
        body.insert("container".to_string(), Value::Object(fields.clone()));
        self.post(EDIT_CONTAINER_ENDPOINT, body, Some(raw_id)).await?;
        Ok(())
    }
}

/// Validate a response envelope and pull out its `data`
fn parse_envelope(status: u16, body: &str, raw_id: Option<&str>) -> Result<Value, BackendError> {
    if status != 200 {
        return Err(BackendError::from_status(status, body, raw_id));
    }

    let json: Value = serde_json::from_str(body).map_err(|_| {
        BackendError::permanent(Some(status), format!("Bad response from Inventory Service: {}", body))
    })?;

    if json.get("status").and_then(Value::as_str) != Some("success") {
        let message = json
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| json.to_string());
        return Err(BackendError::from_error_body(&message, raw_id));
    }

    json.get("data").cloned().ok_or_else(|| {
        BackendError::permanent(Some(status), format!("Response does not contain data key: {}", json))
    })
}

fn parse_details(data: &Value) -> Result<InventoryDetails, BackendError> {
    let user = data
        .get("user")
        .ok_or_else(|| BackendError::permanent(None, "details response has no user"))?;
    let number = user
        .get("inventory")
        .and_then(|v| v.as_i64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
        .ok_or_else(|| BackendError::permanent(None, "details response has no inventory number"))?;
    let name = user
        .get("inventoryname")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Ok(InventoryDetails { number, name })
}

fn extract_rows(data: &Value) -> Result<Vec<RawRecord>, BackendError> {
    let rows = data
        .get("rows")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::permanent(None, "export response has no rows"))?;

    Ok(rows
        .iter()
        .filter_map(|row| match row {
            Value::Object(map) => Some(map.clone()),
            other => {
                log::warn!("Ignoring non-object export row: {}", other);
                None
            }
        })
        .collect())
}

fn extract_created_id(data: &Value) -> Result<String, BackendError> {
    let id = data.get("id").or_else(|| data.get("containerid"));
    match id {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(BackendError::permanent(None, format!("create response has no id: {}", data))),
    }
}
