// ABOUTME: Lease store contract - a TTL-bounded, capacity-limited semaphore per key.
// ABOUTME: Includes the in-process implementation serialized per key.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::clock::{Clock, system_clock};
use super::keyed::{Idle, KeyedState};
use crate::error::StoreError;

/// A time-bounded reservation of one unit of capacity under a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lease {
    pub key: String,
    pub lease_id: String,
    pub expires_at_ms: u64,
}

/// Input to [`LeaseStore::try_acquire`].
#[derive(Debug, Clone)]
pub struct AcquireLease {
    pub key: String,
    pub limit: u32,
    pub ttl_ms: u64,
    pub lease_id: String,
}

impl AcquireLease {
    pub(crate) fn validate(&self) -> Result<(), StoreError> {
        if self.limit == 0 {
            return Err(StoreError::InvalidArgument(
                "limit must be a positive number".into(),
            ));
        }
        if self.ttl_ms == 0 {
            return Err(StoreError::InvalidArgument(
                "ttl_ms must be a positive number".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of an acquire attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// A slot was reserved. `count` includes the new lease.
    Acquired { lease: Lease, count: u32 },
    /// The key is at capacity. `retry_after_ms` is the time until the
    /// earliest live lease expires, when known.
    Busy {
        count: u32,
        retry_after_ms: Option<u64>,
    },
}

impl Admission {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Admission::Acquired { .. })
    }

    /// Number of live leases after this attempt.
    pub fn count(&self) -> u32 {
        match self {
            Admission::Acquired { count, .. } | Admission::Busy { count, .. } => *count,
        }
    }

    pub fn lease(&self) -> Option<&Lease> {
        match self {
            Admission::Acquired { lease, .. } => Some(lease),
            Admission::Busy { .. } => None,
        }
    }

    pub fn into_lease(self) -> Option<Lease> {
        match self {
            Admission::Acquired { lease, .. } => Some(lease),
            Admission::Busy { .. } => None,
        }
    }
}

/// Outcome of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseOutcome {
    /// Whether the lease was still held when released.
    pub released: bool,
    /// Live leases remaining under the key.
    pub count: u32,
}

/// A distributed semaphore-like store.
///
/// Implementations must be atomic per key: concurrent acquires never admit
/// more than `limit` live leases, and a lease stops counting once its TTL
/// has elapsed, released or not.
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Short identifier of the backing implementation.
    fn kind(&self) -> &'static str;

    async fn try_acquire(&self, request: &AcquireLease) -> Result<Admission, StoreError>;

    async fn release(&self, key: &str, lease_id: &str) -> Result<ReleaseOutcome, StoreError>;

    async fn close(&self);
}

#[derive(Default)]
struct LeaseSet {
    expiries: HashMap<String, u64>,
}

impl LeaseSet {
    fn drop_expired(&mut self, now: u64) {
        self.expiries.retain(|_, expires_at| *expires_at > now);
    }

    fn len(&self) -> u32 {
        u32::try_from(self.expiries.len()).unwrap_or(u32::MAX)
    }

    fn earliest_expiry(&self) -> Option<u64> {
        self.expiries.values().copied().min()
    }
}

impl Idle for LeaseSet {
    fn is_idle(&self, now_ms: u64) -> bool {
        self.expiries.values().all(|expires_at| *expires_at <= now_ms)
    }
}

/// In-process lease store. Suitable for tests and single-process deployments.
pub struct InMemoryLeaseStore {
    clock: Arc<dyn Clock>,
    leases: KeyedState<LeaseSet>,
    closed: AtomicBool,
}

impl Default for InMemoryLeaseStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLeaseStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            leases: KeyedState::new(clock.clone()),
            clock,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl LeaseStore for InMemoryLeaseStore {
    fn kind(&self) -> &'static str {
        "in-memory"
    }

    async fn try_acquire(&self, request: &AcquireLease) -> Result<Admission, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        request.validate()?;

        let clock = &self.clock;
        let admission = self
            .leases
            .with_key(&request.key, |set| {
                let now = clock.now_ms();
                set.drop_expired(now);

                let count = set.len();
                if count >= request.limit {
                    return Admission::Busy {
                        count,
                        retry_after_ms: set
                            .earliest_expiry()
                            .map(|earliest| earliest.saturating_sub(now)),
                    };
                }

                let expires_at_ms = now.saturating_add(request.ttl_ms);
                set.expiries.insert(request.lease_id.clone(), expires_at_ms);
                Admission::Acquired {
                    lease: Lease {
                        key: request.key.clone(),
                        lease_id: request.lease_id.clone(),
                        expires_at_ms,
                    },
                    count: set.len(),
                }
            })
            .await;

        Ok(admission)
    }

    async fn release(&self, key: &str, lease_id: &str) -> Result<ReleaseOutcome, StoreError> {
        let unreleased = ReleaseOutcome {
            released: false,
            count: 0,
        };
        if self.closed.load(Ordering::SeqCst) {
            return Ok(unreleased);
        }

        let clock = &self.clock;
        let outcome = self
            .leases
            .with_existing(key, |set| {
                let released = set.expiries.remove(lease_id).is_some();
                set.drop_expired(clock.now_ms());
                ReleaseOutcome {
                    released,
                    count: set.len(),
                }
            })
            .await;

        Ok(outcome.unwrap_or(unreleased))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.leases.clear();
    }
}

#[cfg(test)]
impl InMemoryLeaseStore {
    pub(crate) fn tracked_keys(&self) -> usize {
        self.leases.len()
    }
}
