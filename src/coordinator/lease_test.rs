// ABOUTME: Tests for the in-process lease store.
// ABOUTME: Covers capacity, expiry, retry hints, release, and closing.

use std::sync::Arc;

use super::clock::ManualClock;
use super::lease::{AcquireLease, Admission, InMemoryLeaseStore, LeaseStore};
use crate::error::StoreError;

fn request(key: &str, limit: u32, ttl_ms: u64, lease_id: &str) -> AcquireLease {
    AcquireLease {
        key: key.to_string(),
        limit,
        ttl_ms,
        lease_id: lease_id.to_string(),
    }
}

fn store_at(start_ms: u64) -> (InMemoryLeaseStore, ManualClock) {
    let clock = ManualClock::new(start_ms);
    let store = InMemoryLeaseStore::with_clock(Arc::new(clock.clone()));
    (store, clock)
}

#[tokio::test]
async fn test_acquire_within_limit() {
    let (store, _clock) = store_at(1_000);

    let first = store.try_acquire(&request("p", 2, 500, "a")).await.unwrap();
    let second = store.try_acquire(&request("p", 2, 500, "b")).await.unwrap();

    assert_eq!(first.count(), 1);
    assert_eq!(second.count(), 2);
    let lease = second.into_lease().unwrap();
    assert_eq!(lease.lease_id, "b");
    assert_eq!(lease.expires_at_ms, 1_500);
}

#[tokio::test]
async fn test_busy_reports_time_until_earliest_expiry() {
    let (store, clock) = store_at(1_000);

    store.try_acquire(&request("p", 2, 500, "a")).await.unwrap();
    clock.advance(100);
    store.try_acquire(&request("p", 2, 500, "b")).await.unwrap();
    clock.advance(50);

    let denied = store.try_acquire(&request("p", 2, 500, "c")).await.unwrap();
    assert_eq!(
        denied,
        Admission::Busy {
            count: 2,
            retry_after_ms: Some(350),
        }
    );
}

#[tokio::test]
async fn test_expired_lease_no_longer_counts() {
    let (store, clock) = store_at(0);

    store.try_acquire(&request("p", 1, 100, "a")).await.unwrap();
    assert!(
        !store
            .try_acquire(&request("p", 1, 100, "b"))
            .await
            .unwrap()
            .is_acquired()
    );

    clock.advance(100);
    let after = store.try_acquire(&request("p", 1, 100, "b")).await.unwrap();
    assert!(after.is_acquired());
    assert_eq!(after.count(), 1);
}

#[tokio::test]
async fn test_release_frees_a_slot() {
    let (store, _clock) = store_at(0);

    store.try_acquire(&request("p", 1, 1_000, "a")).await.unwrap();
    let outcome = store.release("p", "a").await.unwrap();
    assert!(outcome.released);
    assert_eq!(outcome.count, 0);

    assert!(
        store
            .try_acquire(&request("p", 1, 1_000, "b"))
            .await
            .unwrap()
            .is_acquired()
    );
}

#[tokio::test]
async fn test_release_unknown_lease_is_not_an_error() {
    let (store, _clock) = store_at(0);

    let never_seen = store.release("missing", "x").await.unwrap();
    assert!(!never_seen.released);

    store.try_acquire(&request("p", 3, 1_000, "a")).await.unwrap();
    let wrong_id = store.release("p", "zzz").await.unwrap();
    assert!(!wrong_id.released);
    assert_eq!(wrong_id.count, 1);
}

#[tokio::test]
async fn test_non_positive_arguments_are_rejected() {
    let (store, _clock) = store_at(0);

    let zero_limit = store.try_acquire(&request("p", 0, 1_000, "a")).await;
    assert!(matches!(zero_limit, Err(StoreError::InvalidArgument(_))));

    let zero_ttl = store.try_acquire(&request("p", 1, 0, "a")).await;
    assert!(matches!(zero_ttl, Err(StoreError::InvalidArgument(_))));
}

#[tokio::test]
async fn test_keys_have_independent_capacity() {
    let (store, _clock) = store_at(0);

    assert!(
        store
            .try_acquire(&request("provider:a", 1, 1_000, "1"))
            .await
            .unwrap()
            .is_acquired()
    );
    assert!(
        store
            .try_acquire(&request("provider:b", 1, 1_000, "2"))
            .await
            .unwrap()
            .is_acquired()
    );
}

#[tokio::test]
async fn test_concurrent_acquires_never_exceed_limit() {
    let store = Arc::new(InMemoryLeaseStore::new());
    let mut handles = Vec::new();

    for i in 0..25 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .try_acquire(&request("shared", 5, 10_000, &format!("lease-{}", i)))
                .await
        }));
    }

    let mut acquired = Vec::new();
    let mut denied = 0;
    for handle in handles {
        match handle.await.unwrap().unwrap() {
            Admission::Acquired { lease, .. } => acquired.push(lease),
            Admission::Busy { retry_after_ms, .. } => {
                assert!(retry_after_ms.is_some());
                denied += 1;
            }
        }
    }

    assert_eq!(acquired.len(), 5);
    assert_eq!(denied, 20);

    let released = acquired.pop().unwrap();
    store.release(&released.key, &released.lease_id).await.unwrap();
    assert!(
        store
            .try_acquire(&request("shared", 5, 10_000, "late"))
            .await
            .unwrap()
            .is_acquired()
    );
}

#[tokio::test]
async fn test_closed_store_refuses_acquire() {
    let (store, _clock) = store_at(0);
    store.try_acquire(&request("p", 1, 1_000, "a")).await.unwrap();

    store.close().await;

    assert!(matches!(
        store.try_acquire(&request("p", 1, 1_000, "b")).await,
        Err(StoreError::Closed)
    ));
    assert!(!store.release("p", "a").await.unwrap().released);
    assert_eq!(store.kind(), "in-memory");
}

#[tokio::test]
async fn test_huge_ttl_saturates_expiry() {
    let (store, _clock) = store_at(5_000);

    let admission = store
        .try_acquire(&request("p", 1, u64::MAX, "a"))
        .await
        .unwrap();
    assert_eq!(admission.into_lease().unwrap().expires_at_ms, u64::MAX);
}

#[tokio::test]
async fn test_released_keys_are_forgotten() {
    let (store, clock) = store_at(0);

    for key in ["a", "b", "c"] {
        let lease = store
            .try_acquire(&request(key, 1, 100, "l"))
            .await
            .unwrap()
            .into_lease()
            .unwrap();
        store.release(&lease.key, &lease.lease_id).await.unwrap();
    }
    assert_eq!(store.tracked_keys(), 0);

    // An expired lease is dropped on the next touch of its key.
    store.try_acquire(&request("d", 1, 100, "l")).await.unwrap();
    assert_eq!(store.tracked_keys(), 1);
    clock.advance(200);
    store.release("d", "other").await.unwrap();
    assert_eq!(store.tracked_keys(), 0);
}
