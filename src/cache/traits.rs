use std::time::Duration;

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;

use super::error::CacheResult;

/// Number of random bytes in a generated token. 32 bytes (256 bits) keeps the
/// collision probability negligible over the lifetime of the deployment.
const TOKEN_BYTES: usize = 32;

/// Key/value store with TTL backing all cross-request state.
///
/// Implementations must make every operation independently atomic; callers
/// never need multi-key transactions. `incr` is the one primitive that has to
/// be atomic across concurrent callers (rate-limit counters), and
/// `take_bytes` must be an atomic get-and-delete so that authorization codes
/// and relay-state tokens are consumed at most once.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Get raw bytes from cache.
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Set raw bytes in cache with TTL. A zero TTL means no expiry.
    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()>;

    /// Atomically get and delete. Returns the value if the key existed.
    async fn take_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>>;

    /// Delete a value from cache.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Increment a counter, returning the new value. Creates the key at 1 if
    /// absent. Sets the TTL only when the key has none yet, so a counter
    /// window is fixed at first increment rather than sliding on every hit.
    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64>;

    /// Set or refresh the TTL of a key. Returns false if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool>;

    /// Typed scalar read: integer. Absent or unparseable values read as None.
    async fn get_i64(&self, key: &str) -> CacheResult<Option<i64>> {
        Ok(self
            .get_bytes(key)
            .await?
            .and_then(|b| String::from_utf8(b).ok())
            .and_then(|s| s.trim().parse().ok()))
    }

    /// Typed scalar read: string. Absent or non-UTF-8 values read as None.
    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self
            .get_bytes(key)
            .await?
            .and_then(|b| String::from_utf8(b).ok()))
    }

    /// Typed scalar read: boolean. Anything but an explicit truthy marker
    /// ("1" or "true") reads as false, including an absent key.
    async fn get_bool(&self, key: &str) -> CacheResult<bool> {
        Ok(self
            .get_string(key)
            .await?
            .map(|s| {
                let s = s.trim();
                s == "1" || s.eq_ignore_ascii_case("true")
            })
            .unwrap_or(false))
    }

    /// Generate a cryptographically random, URL-safe token suitable for
    /// relay-state values and authorization codes.
    fn generate_token(&self) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

/// JSON helpers for structured values (contexts).
pub trait CacheExt: Cache {
    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        use super::error::CacheError;
        match self.get_bytes(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        use super::error::CacheError;
        let bytes =
            serde_json::to_vec(value).map_err(|e| CacheError::Serialization(e.to_string()))?;
        self.set_bytes(key, &bytes, ttl).await
    }

    /// Atomic get-and-delete of a structured value.
    async fn take_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        use super::error::CacheError;
        match self.take_bytes(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Deserialization(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }
}

// Blanket implementation for all Cache types
impl<T: Cache + ?Sized> CacheExt for T {}
