//! Configuration management
//!
//! Settings come from an optional TOML file; credentials come only from the
//! environment. Command-line flags are applied on top by the CLI layer.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::api::inventory_service::DEFAULT_API_URL;
use crate::api::resilience::{ConcurrencyConfig, ResilienceConfig, RetryConfig};
use crate::sync::{ConflictResolution, SyncDirection, SyncPolicy, SyncSettings, TrackedFields};

pub const INVENTORY_API_KEY_VAR: &str = "INVENTORY_API_KEY";
pub const INVENTORY_API_URL_VAR: &str = "INVENTORY_API_URL";
pub const REGISTRY_API_URL_VAR: &str = "REGISTRY_API_URL";
pub const REGISTRY_API_KEY_VAR: &str = "REGISTRY_API_KEY";

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub sync: SyncSection,
    pub retry: RetrySection,
    pub concurrency: ConcurrencySection,
    pub inventory_service: InventoryServiceSection,
    pub lab_registry: LabRegistrySection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSection {
    pub direction: SyncDirection,
    pub conflict_resolution: ConflictResolution,
    /// Fields whose absence on one side counts as a difference; all when unset
    pub tracked_fields: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySection {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConcurrencySection {
    pub inventory_service: usize,
    pub lab_registry: usize,
}

impl Default for ConcurrencySection {
    fn default() -> Self {
        Self {
            inventory_service: 1,
            lab_registry: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InventoryServiceSection {
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for InventoryServiceSection {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabRegistrySection {
    pub timeout_secs: u64,
}

impl Default for LabRegistrySection {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

impl Config {
    /// Default location: `<config_dir>/inventory-sync/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("inventory-sync").join("config.toml"))
    }

    /// Load from `path`, or from the default location when `path` is `None`.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config = Self::parse(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn policy(&self) -> SyncPolicy {
        SyncPolicy {
            direction: self.sync.direction,
            conflict_resolution: self.sync.conflict_resolution,
        }
    }

    pub fn tracked_fields(&self) -> TrackedFields {
        match &self.sync.tracked_fields {
            Some(fields) => TrackedFields::new(fields.iter().cloned()),
            None => TrackedFields::all(),
        }
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_retries: self.retry.max_retries,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                backoff_multiplier: self.retry.backoff_multiplier,
                jitter: self.retry.jitter,
            })
            .concurrency_config(ConcurrencyConfig {
                inventory_service: self.concurrency.inventory_service,
                lab_registry: self.concurrency.lab_registry,
            })
            .build()
    }

    pub fn settings(&self) -> SyncSettings {
        SyncSettings {
            policy: self.policy(),
            tracked: self.tracked_fields(),
            resilience: self.resilience(),
        }
    }
}

/// Backend endpoints and secrets, read from the environment
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub inventory_api_url: String,
    pub inventory_api_key: String,
    pub registry_api_url: String,
    pub registry_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("inventory_api_url", &self.inventory_api_url)
            .field("inventory_api_key", &"<redacted>")
            .field("registry_api_url", &self.registry_api_url)
            .field("registry_api_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn from_env(config: &Config) -> Result<Self> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolve credentials through `lookup`. Blank values count as missing.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |name: &str| {
            get(name).with_context(|| format!("Missing required environment variable {}", name))
        };

        Ok(Self {
            inventory_api_url: get(INVENTORY_API_URL_VAR)
                .unwrap_or_else(|| config.inventory_service.api_url.clone()),
            inventory_api_key: require(INVENTORY_API_KEY_VAR)?,
            registry_api_url: require(REGISTRY_API_URL_VAR)?,
            registry_api_key: require(REGISTRY_API_KEY_VAR)?,
        })
    }
}
