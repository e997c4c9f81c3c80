//! Concurrency limiter implementation
//!
//! Provides a semaphore-based limiter that caps how many calls may be in
//! flight against a single backend at once.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

use crate::sync::types::SourceSystem;

/// Semaphore-based concurrency limiter for one backend
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    system: SourceSystem,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    requests_acquired: Arc<AtomicU64>,
    requests_waited: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    /// Create a limiter allowing `max_concurrent` calls (at least one)
    pub fn new(system: SourceSystem, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            system,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            requests_acquired: Arc::new(AtomicU64::new(0)),
            requests_waited: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire a permit for making a call. Waits if at capacity.
    /// The permit releases automatically when dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        if self.available_permits() == 0 {
            self.requests_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "{} limiter: waiting for permit ({} in use)",
                self.system, self.max_concurrent
            );
        }

        let permit = self.semaphore.clone().acquire_owned().await?;
        self.requests_acquired.fetch_add(1, Ordering::Relaxed);

        debug!(
            "{} limiter: acquired permit ({}/{} in use)",
            self.system,
            self.max_concurrent - self.available_permits(),
            self.max_concurrent
        );

        Ok(permit)
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn system(&self) -> SourceSystem {
        self.system
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            requests_acquired: self.requests_acquired.load(Ordering::Relaxed),
            requests_waited: self.requests_waited.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for a concurrency limiter
#[derive(Debug, Clone)]
pub struct ConcurrencyStats {
    /// Total permits acquired since creation
    pub requests_acquired: u64,
    /// Number of times a call had to wait for a permit
    pub requests_waited: u64,
}
