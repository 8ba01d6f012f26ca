// ABOUTME: Coordinator module for admission control across concurrent turns.
// ABOUTME: Contains lease stores, concurrency limiters, and fixed-window rate limiting.

mod clock;
mod factory;
mod keyed;
mod lease;
mod limiter;
mod rate_limiter;
mod redis;

pub use clock::{Clock, ManualClock, SystemClock};
pub use factory::{Limiters, PROVIDER_LEASE_KEY, StoreFactory, TOOL_LEASE_KEY};
pub use lease::{AcquireLease, Admission, InMemoryLeaseStore, Lease, LeaseStore, ReleaseOutcome};
pub use limiter::ConcurrencyLimiter;
pub use rate_limiter::{
    InMemoryRateLimitStore, RateDecision, RateLimitStore, RateLimiter, RateQuota, RateWindow,
};
pub use redis::{RedisBackend, RedisLeaseStore, RedisOptions, RedisRateLimitStore};

#[cfg(test)]
mod lease_test;
#[cfg(test)]
mod redis_test;
