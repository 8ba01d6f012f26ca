// ABOUTME: Tests for the Redis-backed stores that need no running server.
// ABOUTME: Covers fail-closed, degraded admission, configuration errors, and close.

use std::sync::Arc;
use std::time::Duration;

use super::lease::{AcquireLease, LeaseStore};
use super::rate_limiter::RateLimitStore;
use super::redis::{RedisBackend, RedisLeaseStore, RedisOptions, RedisRateLimitStore};
use crate::error::StoreError;

const UNREACHABLE: &str = "redis://127.0.0.1:1/";

fn backend(suppress: bool) -> Arc<RedisBackend> {
    let mut options = RedisOptions::new(UNREACHABLE);
    options.connect_timeout = Duration::from_millis(200);
    options.suppress_connection_errors = suppress;
    Arc::new(RedisBackend::new(options).unwrap())
}

fn request(lease_id: &str) -> AcquireLease {
    AcquireLease {
        key: "provider:mock".to_string(),
        limit: 1,
        ttl_ms: 1_000,
        lease_id: lease_id.to_string(),
    }
}

#[tokio::test]
async fn test_unreachable_backend_fails_closed_by_default() {
    let store = RedisLeaseStore::new(backend(false));

    let result = store.try_acquire(&request("a")).await;
    assert!(
        matches!(result, Err(StoreError::Connection(_))),
        "Expected connection error, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_unreachable_backend_degrades_to_admission() {
    let backend = backend(true);
    let store = RedisLeaseStore::new(backend.clone());

    let first = store.try_acquire(&request("a")).await.unwrap();
    let second = store.try_acquire(&request("b")).await.unwrap();

    assert!(first.is_acquired());
    assert!(second.is_acquired(), "Degraded mode admits past the limit");
    assert_eq!(second.count(), 1);
    assert!(backend.is_degraded().await);

    let released = store.release("provider:mock", "a").await.unwrap();
    assert!(released.released);
}

#[tokio::test]
async fn test_degraded_rate_store_always_reports_first_hit() {
    let store = RedisRateLimitStore::new(backend(true));

    for _ in 0..3 {
        let window = store.increment_with_ttl("client", 500).await.unwrap();
        assert_eq!(window.count, 1);
        assert!(window.expires_at_ms > 0);
    }
    assert_eq!(store.kind(), "redis");
}

#[tokio::test]
async fn test_rate_store_fails_closed_by_default() {
    let store = RedisRateLimitStore::new(backend(false));
    assert!(matches!(
        store.increment_with_ttl("client", 500).await,
        Err(StoreError::Connection(_))
    ));
}

#[tokio::test]
async fn test_invalid_arguments_rejected_before_connecting() {
    let store = RedisLeaseStore::new(backend(false));
    let mut zero = request("a");
    zero.limit = 0;
    assert!(matches!(
        store.try_acquire(&zero).await,
        Err(StoreError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn test_closed_backend_refuses_work() {
    let backend = backend(true);
    let leases = RedisLeaseStore::new(backend.clone());
    let windows = RedisRateLimitStore::new(backend);

    leases.close().await;

    assert!(matches!(
        leases.try_acquire(&request("a")).await,
        Err(StoreError::Closed)
    ));
    assert!(!leases.release("provider:mock", "a").await.unwrap().released);
    assert!(matches!(
        windows.increment_with_ttl("client", 500).await,
        Err(StoreError::Closed)
    ));
}

#[test]
fn test_malformed_url_is_a_configuration_error() {
    let result = RedisBackend::new(RedisOptions::new("not a url"));
    assert!(matches!(result, Err(StoreError::Configuration(_))));
}

#[tokio::test]
async fn test_degraded_expiry_saturates_on_huge_ttl() {
    let backend = backend(true);
    let leases = RedisLeaseStore::new(backend.clone());
    let mut huge = request("a");
    huge.ttl_ms = u64::MAX;
    let lease = leases.try_acquire(&huge).await.unwrap().into_lease().unwrap();
    assert_eq!(lease.expires_at_ms, u64::MAX);

    let rates = RedisRateLimitStore::new(backend);
    let window = rates.increment_with_ttl("client", u64::MAX).await.unwrap();
    assert_eq!(window.expires_at_ms, u64::MAX);
}
