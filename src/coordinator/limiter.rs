// ABOUTME: Concurrency limiter - a thin facade over a lease store for one key.
// ABOUTME: Generates lease ids and exposes acquire/release without retries or queueing.

use std::sync::Arc;

use uuid::Uuid;

use super::lease::{AcquireLease, Admission, Lease, LeaseStore, ReleaseOutcome};
use crate::error::StoreError;

/// Caps how many holders may work under `key` at once.
///
/// Busy outcomes are returned to the caller as-is; what "busy" means for a
/// turn is decided by the caller.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    store: Arc<dyn LeaseStore>,
    key: String,
    limit: u32,
    lease_ttl_ms: u64,
}

impl ConcurrencyLimiter {
    pub fn new(
        store: Arc<dyn LeaseStore>,
        key: impl Into<String>,
        limit: u32,
        lease_ttl_ms: u64,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            limit,
            lease_ttl_ms,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn lease_ttl_ms(&self) -> u64 {
        self.lease_ttl_ms
    }

    /// Attempt to take one slot under a fresh lease id.
    pub async fn try_acquire(&self) -> Result<Admission, StoreError> {
        let request = AcquireLease {
            key: self.key.clone(),
            limit: self.limit,
            ttl_ms: self.lease_ttl_ms,
            lease_id: Uuid::new_v4().to_string(),
        };
        self.store.try_acquire(&request).await
    }

    /// Give a slot back before its TTL elapses.
    pub async fn release(&self, lease: &Lease) -> Result<ReleaseOutcome, StoreError> {
        self.store.release(&lease.key, &lease.lease_id).await
    }
}

impl std::fmt::Debug for ConcurrencyLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrencyLimiter")
            .field("store", &self.store.kind())
            .field("key", &self.key)
            .field("limit", &self.limit)
            .field("lease_ttl_ms", &self.lease_ttl_ms)
            .finish()
    }
}
