//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry policies and per-backend
//! concurrency caps with sane defaults.

use super::retry::RetryConfig;
use crate::sync::types::SourceSystem;

/// Global resilience configuration for backend calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub concurrency: ConcurrencyConfig,
}

/// Maximum in-flight calls per backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyConfig {
    pub inventory_service: usize,
    pub lab_registry: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            inventory_service: 1,
            lab_registry: 1,
        }
    }
}

impl ConcurrencyConfig {
    pub fn cap_for(&self, system: SourceSystem) -> usize {
        match system {
            SourceSystem::InventoryService => self.inventory_service,
            SourceSystem::LabRegistry => self.lab_registry,
        }
    }
}

impl ResilienceConfig {
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// No retries, serialized calls
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig::none(),
            concurrency: ConcurrencyConfig::default(),
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ResilienceConfig::default(),
        }
    }

    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn concurrency_config(mut self, concurrency: ConcurrencyConfig) -> Self {
        self.config.concurrency = concurrency;
        self
    }

    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}

impl Default for ResilienceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = ResilienceConfig::default();

        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay, Duration::from_secs(1));
        assert_eq!(config.retry.max_delay, Duration::from_secs(10));
        assert_eq!(config.concurrency.cap_for(SourceSystem::InventoryService), 1);
        assert_eq!(config.concurrency.cap_for(SourceSystem::LabRegistry), 1);
    }

    #[test]
    fn test_disabled_config() {
        let config = ResilienceConfig::disabled();
        assert_eq!(config.retry.max_retries, 0);
        assert_eq!(config.retry.delay_for(1), Duration::ZERO);
    }

    #[test]
    fn test_builder_pattern() {
        let config = ResilienceConfig::builder()
            .retry_config(RetryConfig {
                max_retries: 5,
                ..RetryConfig::default()
            })
            .concurrency_config(ConcurrencyConfig {
                inventory_service: 1,
                lab_registry: 4,
            })
            .build();

        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.concurrency.cap_for(SourceSystem::LabRegistry), 4);
        assert_eq!(config.concurrency.cap_for(SourceSystem::InventoryService), 1);
    }
}
