// ABOUTME: Runtime configuration loaded from an optional TOML file and TURNSTILE__* env vars.
// ABOUTME: Double underscores separate nested keys, e.g. TURNSTILE__CONCURRENCY__PROVIDER_MAX=4.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TurnstileConfig {
    pub redis: RedisConfig,
    pub concurrency: ConcurrencyConfig,
    pub rate_limit: RateLimitConfig,
    pub tools: ToolsConfig,
}

/// Which store implementation to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    /// Redis when a URL is configured, otherwise in-process.
    #[default]
    Auto,
    Memory,
    Redis,
}

/// [redis]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,
    pub key_prefix: String,
    pub connect_timeout_ms: u64,
    /// Degrade to unconditional admission instead of failing when Redis is down.
    pub suppress_connection_errors: bool,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: "turnstile:".to_string(),
            connect_timeout_ms: 500,
            suppress_connection_errors: false,
        }
    }
}

/// [concurrency]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub provider_max: u32,
    pub tool_max: u32,
    pub lease_ttl_ms: u64,
    pub store: StoreMode,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            provider_max: 10,
            tool_max: 10,
            lease_ttl_ms: 30_000,
            store: StoreMode::Auto,
        }
    }
}

/// [rate_limit]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub limit: u64,
    pub window_ms: u64,
    pub store: StoreMode,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            limit: 60,
            window_ms: 60_000,
            store: StoreMode::Auto,
        }
    }
}

/// [tools]
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub timeout_ms: u64,
    pub output_limit_bytes: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2_000,
            output_limit_bytes: 50_000,
        }
    }
}

impl TurnstileConfig {
    /// Load from `config_path` (when it exists) overlaid with the process
    /// environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::build(config_path, None)
    }

    /// Load from an explicit set of environment variables instead of the
    /// process environment.
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self, ConfigError> {
        Self::build(None, Some(vars))
    }

    fn build(
        config_path: Option<&Path>,
        vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();

        if let Some(path) = config_path {
            if path.exists() {
                builder = builder.add_source(config::File::from(path).required(false));
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .source(vars),
        );

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a store or executor unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("concurrency.provider_max", u64::from(self.concurrency.provider_max)),
            ("concurrency.tool_max", u64::from(self.concurrency.tool_max)),
            ("concurrency.lease_ttl_ms", self.concurrency.lease_ttl_ms),
            ("rate_limit.limit", self.rate_limit.limit),
            ("rate_limit.window_ms", self.rate_limit.window_ms),
            ("tools.timeout_ms", self.tools.timeout_ms),
            ("tools.output_limit_bytes", self.tools.output_limit_bytes as u64),
            ("redis.connect_timeout_ms", self.redis.connect_timeout_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::Invalid {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }

        let wants_redis = self.concurrency.store == StoreMode::Redis
            || (self.rate_limit.enabled && self.rate_limit.store == StoreMode::Redis);
        if wants_redis && self.redis.url.is_none() {
            return Err(ConfigError::Invalid {
                field: "redis.url".to_string(),
                reason: "required when a store mode is 'redis'".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let config = TurnstileConfig::from_vars(HashMap::new()).unwrap();
        assert_eq!(config.concurrency.provider_max, 10);
        assert_eq!(config.concurrency.tool_max, 10);
        assert_eq!(config.concurrency.lease_ttl_ms, 30_000);
        assert_eq!(config.rate_limit.limit, 60);
        assert_eq!(config.rate_limit.window_ms, 60_000);
        assert_eq!(config.tools.timeout_ms, 2_000);
        assert_eq!(config.tools.output_limit_bytes, 50_000);
        assert_eq!(config.redis.key_prefix, "turnstile:");
        assert!(config.redis.url.is_none());
    }

    #[test]
    fn test_env_overrides_nested_keys() {
        let config = TurnstileConfig::from_vars(vars(&[
            ("TURNSTILE__CONCURRENCY__PROVIDER_MAX", "2"),
            ("TURNSTILE__CONCURRENCY__STORE", "memory"),
            ("TURNSTILE__RATE_LIMIT__ENABLED", "false"),
            ("TURNSTILE__REDIS__URL", "redis://localhost:6379"),
        ]))
        .unwrap();

        assert_eq!(config.concurrency.provider_max, 2);
        assert_eq!(config.concurrency.store, StoreMode::Memory);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.redis.url.as_deref(), Some("redis://localhost:6379"));
    }

    #[test]
    fn test_zero_capacity_is_invalid() {
        let result =
            TurnstileConfig::from_vars(vars(&[("TURNSTILE__CONCURRENCY__TOOL_MAX", "0")]));
        match result {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "concurrency.tool_max"),
            other => panic!("Expected Invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_redis_mode_requires_url() {
        let mut config = TurnstileConfig::default();
        config.rate_limit.store = StoreMode::Redis;
        assert!(config.validate().is_err());

        config.redis.url = Some("redis://localhost".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_ignored() {
        let config =
            TurnstileConfig::load(Some(Path::new("/nonexistent/turnstile.toml"))).unwrap();
        assert!(config.rate_limit.enabled);
    }
}
