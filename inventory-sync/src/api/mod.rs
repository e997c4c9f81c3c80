//! Backend API clients
//!
//! Each backend is reached through the `BackendClient` trait so the
//! reconciliation core never sees HTTP details. The two production
//! clients speak to the Inventory Service and the Lab Registry.

pub mod error;
pub mod inventory_service;
pub mod lab_registry;
pub mod resilience;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::sync::types::SourceSystem;

pub use error::BackendError;
pub use inventory_service::InventoryServiceClient;
pub use lab_registry::LabRegistryClient;

/// A backend record in its native shape
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Minimal surface the reconciliation engine needs from a backend
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Which system this client talks to
    fn system(&self) -> SourceSystem;

    /// Read every inventory record
    async fn list_items(&self) -> Result<Vec<RawRecord>, BackendError>;

    /// Create a record from native fields, returning its native id
    async fn create_item(&self, fields: &RawRecord) -> Result<String, BackendError>;

    /// Overwrite the given native fields on an existing record
    async fn update_item(&self, raw_id: &str, fields: &RawRecord) -> Result<(), BackendError>;
}

/// User agent sent with every request
pub fn user_agent() -> String {
    format!("inventory-sync/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the shared HTTP client for a backend
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(10)))
        .user_agent(user_agent())
        .build()
        .context("Failed to build HTTP client")
}

/// Join a base URL and an endpoint with exactly one slash
pub(crate) fn join_url(base: &str, endpoint: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), endpoint.trim_start_matches('/'))
}
