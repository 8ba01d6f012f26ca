// ABOUTME: Builds lease and rate-limit stores from configuration.
// ABOUTME: Also wires the provider and tool concurrency limiters onto one shared store.

use std::sync::Arc;
use std::time::Duration;

use super::lease::{InMemoryLeaseStore, LeaseStore};
use super::limiter::ConcurrencyLimiter;
use super::rate_limiter::{InMemoryRateLimitStore, RateLimitStore, RateLimiter, RateQuota};
use super::redis::{RedisBackend, RedisLeaseStore, RedisOptions, RedisRateLimitStore};
use crate::config::{RedisConfig, StoreMode, TurnstileConfig};
use crate::error::StoreError;

/// Lease key shared by every planner call.
pub const PROVIDER_LEASE_KEY: &str = "provider";
/// Lease key shared by every tool execution.
pub const TOOL_LEASE_KEY: &str = "tool";

/// Chooses and constructs store implementations.
///
/// All Redis-backed stores built by one factory share a single backend, so
/// they connect once and degrade together.
pub struct StoreFactory {
    backend: Option<Arc<RedisBackend>>,
}

impl StoreFactory {
    pub fn new(config: &RedisConfig) -> Result<Self, StoreError> {
        let backend = match &config.url {
            Some(url) => {
                let options = RedisOptions {
                    url: url.clone(),
                    key_prefix: config.key_prefix.clone(),
                    connect_timeout: Duration::from_millis(config.connect_timeout_ms),
                    suppress_connection_errors: config.suppress_connection_errors,
                };
                Some(Arc::new(RedisBackend::new(options)?))
            }
            None => None,
        };
        Ok(Self { backend })
    }

    fn redis(&self, mode: StoreMode) -> Result<Option<Arc<RedisBackend>>, StoreError> {
        match (mode, &self.backend) {
            (StoreMode::Memory, _) | (StoreMode::Auto, None) => Ok(None),
            (StoreMode::Redis | StoreMode::Auto, Some(backend)) => Ok(Some(backend.clone())),
            (StoreMode::Redis, None) => Err(StoreError::Configuration(
                "store mode 'redis' requires redis.url".into(),
            )),
        }
    }

    pub fn lease_store(&self, mode: StoreMode) -> Result<Arc<dyn LeaseStore>, StoreError> {
        let store: Arc<dyn LeaseStore> = match self.redis(mode)? {
            Some(backend) => Arc::new(RedisLeaseStore::new(backend)),
            None => Arc::new(InMemoryLeaseStore::new()),
        };
        tracing::info!(kind = store.kind(), "lease store ready");
        Ok(store)
    }

    pub fn rate_limit_store(&self, mode: StoreMode) -> Result<Arc<dyn RateLimitStore>, StoreError> {
        let store: Arc<dyn RateLimitStore> = match self.redis(mode)? {
            Some(backend) => Arc::new(RedisRateLimitStore::new(backend)),
            None => Arc::new(InMemoryRateLimitStore::new()),
        };
        tracing::info!(kind = store.kind(), "rate limit store ready");
        Ok(store)
    }
}

/// The admission controls a service needs, built from one configuration.
pub struct Limiters {
    pub provider: ConcurrencyLimiter,
    pub tool: ConcurrencyLimiter,
    /// Absent when rate limiting is disabled.
    pub rate: Option<RateLimiter>,
    pub rate_quota: RateQuota,
    leases: Arc<dyn LeaseStore>,
    rate_store: Option<Arc<dyn RateLimitStore>>,
}

impl Limiters {
    pub fn from_config(config: &TurnstileConfig) -> Result<Self, StoreError> {
        let factory = StoreFactory::new(&config.redis)?;
        let leases = factory.lease_store(config.concurrency.store)?;

        let provider = ConcurrencyLimiter::new(
            leases.clone(),
            PROVIDER_LEASE_KEY,
            config.concurrency.provider_max,
            config.concurrency.lease_ttl_ms,
        );
        let tool = ConcurrencyLimiter::new(
            leases.clone(),
            TOOL_LEASE_KEY,
            config.concurrency.tool_max,
            config.concurrency.lease_ttl_ms,
        );

        let rate_store = if config.rate_limit.enabled {
            Some(factory.rate_limit_store(config.rate_limit.store)?)
        } else {
            None
        };
        let rate = rate_store.clone().map(RateLimiter::new);

        Ok(Self {
            provider,
            tool,
            rate,
            rate_quota: RateQuota {
                limit: config.rate_limit.limit,
                window_ms: config.rate_limit.window_ms,
            },
            leases,
            rate_store,
        })
    }

    /// Close the underlying stores.
    pub async fn close(&self) {
        self.leases.close().await;
        if let Some(store) = &self.rate_store {
            store.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_build_in_memory_limiters() {
        let config = TurnstileConfig::default();
        let limiters = Limiters::from_config(&config).unwrap();

        assert_eq!(limiters.provider.key(), PROVIDER_LEASE_KEY);
        assert_eq!(limiters.provider.limit(), 10);
        assert_eq!(limiters.tool.key(), TOOL_LEASE_KEY);
        assert_eq!(limiters.tool.lease_ttl_ms(), 30_000);
        assert!(limiters.rate.is_some());
        assert_eq!(limiters.rate_quota.limit, 60);
        assert_eq!(limiters.rate_quota.window_ms, 60_000);

        assert!(limiters.provider.try_acquire().await.unwrap().is_acquired());
        limiters.close().await;
    }

    #[test]
    fn test_redis_mode_without_url_is_rejected() {
        let mut config = TurnstileConfig::default();
        config.concurrency.store = StoreMode::Redis;

        let result = Limiters::from_config(&config);
        assert!(matches!(result, Err(StoreError::Configuration(_))));
    }

    #[test]
    fn test_auto_mode_prefers_redis_when_configured() {
        let mut config = RedisConfig::default();
        config.url = Some("redis://127.0.0.1:6379".into());
        let factory = StoreFactory::new(&config).unwrap();

        assert_eq!(factory.lease_store(StoreMode::Auto).unwrap().kind(), "redis");
        assert_eq!(
            factory.rate_limit_store(StoreMode::Memory).unwrap().kind(),
            "in-memory"
        );
    }

    #[test]
    fn test_disabled_rate_limit_builds_no_limiter() {
        let mut config = TurnstileConfig::default();
        config.rate_limit.enabled = false;
        let limiters = Limiters::from_config(&config).unwrap();
        assert!(limiters.rate.is_none());
    }
}
