// ABOUTME: Fixed-window rate limiting for per-key request throttling.
// ABOUTME: The first write to a window fixes its expiry; later increments never extend it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::clock::{Clock, system_clock};
use super::keyed::{Idle, KeyedState};
use crate::error::StoreError;

/// State of one counting window after an increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateWindow {
    pub count: u64,
    pub expires_at_ms: u64,
}

/// Atomic increment-with-expiry per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Increment the counter for `key`, opening a new window of `ttl_ms`
    /// when none is live.
    async fn increment_with_ttl(&self, key: &str, ttl_ms: u64) -> Result<RateWindow, StoreError>;

    async fn close(&self);
}

#[derive(Default)]
struct WindowState {
    count: u64,
    expires_at_ms: u64,
}

impl Idle for WindowState {
    fn is_idle(&self, now_ms: u64) -> bool {
        self.count == 0 || self.expires_at_ms <= now_ms
    }
}

/// In-process fixed-window store.
pub struct InMemoryRateLimitStore {
    clock: Arc<dyn Clock>,
    windows: KeyedState<WindowState>,
    closed: AtomicBool,
}

impl Default for InMemoryRateLimitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            windows: KeyedState::new(clock.clone()),
            clock,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    fn kind(&self) -> &'static str {
        "in-memory"
    }

    async fn increment_with_ttl(&self, key: &str, ttl_ms: u64) -> Result<RateWindow, StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StoreError::Closed);
        }
        if ttl_ms == 0 {
            return Err(StoreError::InvalidArgument(
                "ttl_ms must be a positive number".into(),
            ));
        }

        let clock = &self.clock;
        let window = self
            .windows
            .with_key(key, |state| {
                let now = clock.now_ms();
                if state.count == 0 || state.expires_at_ms <= now {
                    state.count = 0;
                    state.expires_at_ms = now.saturating_add(ttl_ms);
                }
                state.count += 1;
                RateWindow {
                    count: state.count,
                    expires_at_ms: state.expires_at_ms,
                }
            })
            .await;

        Ok(window)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.windows.clear();
    }
}

#[cfg(test)]
impl InMemoryRateLimitStore {
    pub(crate) fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

/// Allow/deny verdict for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
    pub allowed: bool,
    pub count: u64,
    pub limit: u64,
    pub remaining: u64,
    pub reset_at_ms: u64,
    /// Present only when the request was denied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

/// Requests allowed per window for one caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateQuota {
    pub limit: u64,
    pub window_ms: u64,
}

/// Fixed-window rate limiter.
///
/// Every call counts against the window, including denied ones, so a client
/// hammering past its limit does not get a fresh budget until the window
/// expires.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>) -> Self {
        Self::with_clock(store, system_clock())
    }

    pub fn with_clock(store: Arc<dyn RateLimitStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Count one request against `key` and classify it.
    pub async fn consume(
        &self,
        key: &str,
        limit: u64,
        window_ms: u64,
    ) -> Result<RateDecision, StoreError> {
        if limit == 0 {
            return Err(StoreError::InvalidArgument(
                "limit must be a positive number".into(),
            ));
        }

        let window = self.store.increment_with_ttl(key, window_ms).await?;
        let allowed = window.count <= limit;
        let retry_after_ms = if allowed {
            None
        } else {
            Some(window.expires_at_ms.saturating_sub(self.clock.now_ms()))
        };

        Ok(RateDecision {
            allowed,
            count: window.count,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_at_ms: window.expires_at_ms,
            retry_after_ms,
        })
    }
}
