// ABOUTME: Redis-backed lease and rate-limit stores driven by atomic Lua scripts.
// ABOUTME: The shared backend is Connected, Degraded (always admit), or Closed.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use super::clock::{Clock, system_clock};
use super::lease::{AcquireLease, Admission, Lease, LeaseStore, ReleaseOutcome};
use super::rate_limiter::{RateLimitStore, RateWindow};
use crate::error::StoreError;

const ACQUIRE_SCRIPT: &str = r"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local limit = tonumber(ARGV[2])
local ttl = tonumber(ARGV[3])
local lease_id = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now)
local count = redis.call('ZCARD', key)
if count >= limit then
  local earliest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
  local earliest_expiry = -1
  if earliest[2] then
    earliest_expiry = tonumber(earliest[2])
  end
  return {0, count, earliest_expiry}
end

local expires_at = now + ttl
redis.call('ZADD', key, expires_at, lease_id)
redis.call('PEXPIRE', key, ttl + 1000)
return {1, count + 1, expires_at}
";

const RELEASE_SCRIPT: &str = r"
local key = KEYS[1]
local removed = redis.call('ZREM', key, ARGV[1])
redis.call('ZREMRANGEBYSCORE', key, '-inf', tonumber(ARGV[2]))
return {removed, redis.call('ZCARD', key)}
";

const INCREMENT_SCRIPT: &str = r"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])
local count = redis.call('INCR', key)
local remaining = redis.call('PTTL', key)
if count == 1 or remaining < 0 then
  redis.call('PEXPIRE', key, ttl)
  remaining = ttl
end
return {count, remaining}
";

/// Connection settings for the shared backend.
#[derive(Debug, Clone)]
pub struct RedisOptions {
    pub url: String,
    pub key_prefix: String,
    pub connect_timeout: Duration,
    /// Admit everything instead of failing when the backend is unreachable.
    pub suppress_connection_errors: bool,
}

impl RedisOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            key_prefix: "turnstile:".to_string(),
            connect_timeout: Duration::from_millis(500),
            suppress_connection_errors: false,
        }
    }
}

enum BackendState {
    Idle,
    Connected(MultiplexedConnection),
    Degraded,
    Closed,
}

enum Link {
    Connected(MultiplexedConnection),
    Degraded,
}

/// Shared connection to Redis, used by both store kinds.
///
/// The first call connects lazily. When the connection cannot be made (or
/// drops) and `suppress_connection_errors` is set, the backend switches to
/// degraded mode for good and every store built on it admits unconditionally.
/// The switch is logged once.
pub struct RedisBackend {
    client: redis::Client,
    options: RedisOptions,
    clock: Arc<dyn Clock>,
    state: Mutex<BackendState>,
}

impl RedisBackend {
    pub fn new(options: RedisOptions) -> Result<Self, StoreError> {
        Self::with_clock(options, system_clock())
    }

    pub fn with_clock(options: RedisOptions, clock: Arc<dyn Clock>) -> Result<Self, StoreError> {
        let client = redis::Client::open(options.url.as_str())
            .map_err(|e| StoreError::Configuration(format!("invalid redis url: {}", e)))?;
        Ok(Self {
            client,
            options,
            clock,
            state: Mutex::new(BackendState::Idle),
        })
    }

    pub fn options(&self) -> &RedisOptions {
        &self.options
    }

    /// Whether the backend has given up on Redis and admits everything.
    pub async fn is_degraded(&self) -> bool {
        matches!(*self.state.lock().await, BackendState::Degraded)
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn key(&self, namespace: &str, key: &str) -> String {
        format!("{}{}:{}", self.options.key_prefix, namespace, key)
    }

    async fn link(&self, store: &'static str) -> Result<Link, StoreError> {
        let mut state = self.state.lock().await;
        match &*state {
            BackendState::Connected(conn) => return Ok(Link::Connected(conn.clone())),
            BackendState::Degraded => return Ok(Link::Degraded),
            BackendState::Closed => return Err(StoreError::Closed),
            BackendState::Idle => {}
        }

        let connect = tokio::time::timeout(
            self.options.connect_timeout,
            self.client.get_multiplexed_async_connection(),
        )
        .await;

        let reason = match connect {
            Ok(Ok(conn)) => {
                tracing::debug!(store, "connected to redis");
                *state = BackendState::Connected(conn.clone());
                return Ok(Link::Connected(conn));
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!(
                "timed out after {}ms",
                self.options.connect_timeout.as_millis()
            ),
        };

        if self.options.suppress_connection_errors {
            self.degrade(&mut state, store, &reason);
            Ok(Link::Degraded)
        } else {
            Err(StoreError::Connection(reason))
        }
    }

    /// Classify a failed script call. Connection-level failures degrade the
    /// backend when suppression is on; everything else is returned.
    async fn fail(&self, store: &'static str, err: redis::RedisError) -> Result<(), StoreError> {
        let connection_lost = err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout();
        if !connection_lost {
            return Err(StoreError::Backend(err));
        }

        let mut state = self.state.lock().await;
        if self.options.suppress_connection_errors {
            self.degrade(&mut state, store, &err.to_string());
            return Ok(());
        }
        if matches!(*state, BackendState::Connected(_)) {
            *state = BackendState::Idle;
        }
        Err(StoreError::Backend(err))
    }

    fn degrade(&self, state: &mut BackendState, store: &'static str, reason: &str) {
        if matches!(state, BackendState::Degraded | BackendState::Closed) {
            return;
        }
        tracing::warn!(
            store,
            url = %self.options.url,
            error = %reason,
            "redis unavailable; admitting all requests without coordination"
        );
        *state = BackendState::Degraded;
    }

    async fn close(&self) {
        *self.state.lock().await = BackendState::Closed;
    }
}

fn reply_value(reply: &[i64], index: usize, script: &str) -> Result<i64, StoreError> {
    reply.get(index).copied().ok_or_else(|| {
        StoreError::UnexpectedReply(format!("{} script returned {:?}", script, reply))
    })
}

fn reply_u64(value: i64) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::UnexpectedReply(format!("negative value {}", value)))
}

fn reply_u32(value: i64) -> Result<u32, StoreError> {
    u32::try_from(value)
        .map_err(|_| StoreError::UnexpectedReply(format!("count out of range: {}", value)))
}

/// Lease store whose per-key state lives in a Redis sorted set scored by
/// expiry.
pub struct RedisLeaseStore {
    backend: Arc<RedisBackend>,
    acquire: Script,
    release: Script,
}

impl RedisLeaseStore {
    pub fn new(backend: Arc<RedisBackend>) -> Self {
        Self {
            backend,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }

    fn degraded_admission(&self, request: &AcquireLease, now: u64) -> Admission {
        Admission::Acquired {
            lease: Lease {
                key: request.key.clone(),
                lease_id: request.lease_id.clone(),
                expires_at_ms: now.saturating_add(request.ttl_ms),
            },
            count: 1,
        }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn try_acquire(&self, request: &AcquireLease) -> Result<Admission, StoreError> {
        request.validate()?;
        let now = self.backend.now_ms();

        let mut conn = match self.backend.link("lease").await? {
            Link::Connected(conn) => conn,
            Link::Degraded => return Ok(self.degraded_admission(request, now)),
        };

        let mut invocation = self.acquire.key(self.backend.key("conc", &request.key));
        invocation
            .arg(now)
            .arg(request.limit)
            .arg(request.ttl_ms)
            .arg(&request.lease_id);

        let reply: Vec<i64> = match invocation.invoke_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) => {
                self.backend.fail("lease", e).await?;
                return Ok(self.degraded_admission(request, now));
            }
        };

        let acquired = reply_value(&reply, 0, "acquire")? == 1;
        let count = reply_u32(reply_value(&reply, 1, "acquire")?)?;
        let expiry = reply_value(&reply, 2, "acquire")?;

        if acquired {
            return Ok(Admission::Acquired {
                lease: Lease {
                    key: request.key.clone(),
                    lease_id: request.lease_id.clone(),
                    expires_at_ms: reply_u64(expiry)?,
                },
                count,
            });
        }

        let retry_after_ms = u64::try_from(expiry)
            .ok()
            .map(|earliest| earliest.saturating_sub(now));
        Ok(Admission::Busy {
            count,
            retry_after_ms,
        })
    }

    async fn release(&self, key: &str, lease_id: &str) -> Result<ReleaseOutcome, StoreError> {
        let degraded = ReleaseOutcome {
            released: true,
            count: 0,
        };

        let mut conn = match self.backend.link("lease").await {
            Ok(Link::Connected(conn)) => conn,
            Ok(Link::Degraded) => return Ok(degraded),
            Err(StoreError::Closed) => {
                return Ok(ReleaseOutcome {
                    released: false,
                    count: 0,
                });
            }
            Err(e) => return Err(e),
        };

        let mut invocation = self.release.key(self.backend.key("conc", key));
        invocation.arg(lease_id).arg(self.backend.now_ms());

        let reply: Vec<i64> = match invocation.invoke_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) => {
                self.backend.fail("lease", e).await?;
                return Ok(degraded);
            }
        };

        Ok(ReleaseOutcome {
            released: reply_value(&reply, 0, "release")? > 0,
            count: reply_u32(reply_value(&reply, 1, "release")?)?,
        })
    }

    async fn close(&self) {
        self.backend.close().await;
    }
}

/// Fixed-window counter stored as a Redis integer with a millisecond TTL.
pub struct RedisRateLimitStore {
    backend: Arc<RedisBackend>,
    increment: Script,
}

impl RedisRateLimitStore {
    pub fn new(backend: Arc<RedisBackend>) -> Self {
        Self {
            backend,
            increment: Script::new(INCREMENT_SCRIPT),
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn increment_with_ttl(&self, key: &str, ttl_ms: u64) -> Result<RateWindow, StoreError> {
        if ttl_ms == 0 {
            return Err(StoreError::InvalidArgument(
                "ttl_ms must be a positive number".into(),
            ));
        }
        let now = self.backend.now_ms();
        let degraded = RateWindow {
            count: 1,
            expires_at_ms: now.saturating_add(ttl_ms),
        };

        let mut conn = match self.backend.link("rate_limit").await? {
            Link::Connected(conn) => conn,
            Link::Degraded => return Ok(degraded),
        };

        let mut invocation = self.increment.key(self.backend.key("rl", key));
        invocation.arg(ttl_ms);

        let reply: Vec<i64> = match invocation.invoke_async(&mut conn).await {
            Ok(reply) => reply,
            Err(e) => {
                self.backend.fail("rate_limit", e).await?;
                return Ok(degraded);
            }
        };

        let count = reply_u64(reply_value(&reply, 0, "increment")?)?;
        let remaining = reply_u64(reply_value(&reply, 1, "increment")?)?;
        Ok(RateWindow {
            count,
            expires_at_ms: now.saturating_add(remaining),
        })
    }

    async fn close(&self) {
        self.backend.close().await;
    }
}
