//! Resilience features for backend calls
//!
//! Provides retry policies and per-backend concurrency limiting.

pub mod concurrency;
pub mod config;
pub mod retry;

pub use concurrency::ConcurrencyLimiter;
pub use config::{ConcurrencyConfig, ResilienceConfig};
pub use retry::{RetryConfig, RetryPolicy, RetryableError};
