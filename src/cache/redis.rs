use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;

use super::{error::CacheResult, traits::Cache};
use crate::config::RedisCacheConfig;

/// Lua script for atomic increment that preserves an existing TTL.
///
/// Only sets the TTL when the key has no expiry (TTL < 0), so a counter
/// window is fixed at the first increment instead of sliding on every hit.
const INCR_PRESERVE_TTL_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])

local new_value = redis.call('INCR', key)
if ttl > 0 and redis.call('TTL', key) < 0 then
    redis.call('EXPIRE', key, ttl)
end
return new_value
"#;

/// Redis-backed cache.
///
/// Keys are namespaced with a configurable prefix so the instance can share a
/// Redis deployment with other clients. Required for multi-node deployments:
/// relay-state lookups and rate-limit counters must be shared across nodes.
pub struct RedisCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisCache {
    pub fn from_config(config: &RedisCacheConfig) -> CacheResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        Ok(Self {
            client,
            key_prefix: config.key_prefix.clone(),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    async fn get_connection(&self) -> CacheResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let data: Option<Vec<u8>> = redis::cmd("GET").arg(&full_key).query_async(&mut conn).await?;
        Ok(data)
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        if ttl.as_secs() > 0 {
            let _: () = redis::cmd("SETEX")
                .arg(&full_key)
                .arg(ttl.as_secs())
                .arg(value)
                .query_async(&mut conn)
                .await?;
        } else {
            let _: () = redis::cmd("SET")
                .arg(&full_key)
                .arg(value)
                .query_async(&mut conn)
                .await?;
        }
        Ok(())
    }

    async fn take_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        // GETDEL is a single atomic command, the at-most-once primitive for
        // authorization codes and relay-state tokens.
        let data: Option<Vec<u8>> = redis::cmd("GETDEL")
            .arg(&full_key)
            .query_async(&mut conn)
            .await?;
        Ok(data)
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let _: () = redis::cmd("DEL").arg(&full_key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        if ttl.as_secs() > 0 {
            let result: i64 = redis::Script::new(INCR_PRESERVE_TTL_SCRIPT)
                .key(&full_key)
                .arg(ttl.as_secs() as i64)
                .invoke_async(&mut conn)
                .await?;
            Ok(result)
        } else {
            let result: i64 = redis::cmd("INCR")
                .arg(&full_key)
                .query_async(&mut conn)
                .await?;
            Ok(result)
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let result: i64 = redis::cmd("EXPIRE")
            .arg(&full_key)
            .arg(ttl.as_secs())
            .query_async(&mut conn)
            .await?;
        Ok(result == 1)
    }
}
