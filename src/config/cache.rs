use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Cache backend configuration.
///
/// The cache holds every piece of cross-request state: pending
/// authentication contexts, authorization codes, token-bound userinfo, and
/// the rate-limit counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// In-memory cache. Single-node deployments only; state is lost on
    /// restart and not shared across nodes.
    Memory(MemoryCacheConfig),

    /// Redis cache. Required for multi-node deployments.
    Redis(RedisCacheConfig),
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory(MemoryCacheConfig::default())
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::Memory(c) => c.validate(),
            CacheConfig::Redis(c) => c.validate(),
        }
    }
}

/// In-memory cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Maximum number of entries before expired entries are swept.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl MemoryCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "cache.max_entries must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_entries() -> usize {
    100_000
}

/// Redis cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Redis connection URL: redis://[user:password@]host:port[/database]
    pub url: String,

    /// Prefix applied to every key so the broker can share a Redis
    /// deployment with other clients.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl RedisCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ConfigError::Validation(
                "cache.url must start with redis:// or rediss://".into(),
            ));
        }
        Ok(())
    }
}

fn default_key_prefix() -> String {
    "eidbridge:".to_string()
}
