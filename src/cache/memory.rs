use std::{
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{error::CacheResult, traits::Cache};

struct CacheEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        Self { data, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

struct Counter {
    value: Arc<AtomicI64>,
    expires_at: Option<Instant>,
}

/// In-memory cache implementation using DashMap for concurrent access.
///
/// Suitable for a single node only: rate-limit counters and pending
/// authentication contexts live in process memory, so a multi-node
/// deployment must use the Redis backend to share state.
pub struct MemoryCache {
    data: Arc<DashMap<String, CacheEntry>>,
    counters: Arc<DashMap<String, Counter>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            data: Arc::new(DashMap::new()),
            counters: Arc::new(DashMap::new()),
            max_entries: max_entries.max(1),
        }
    }

    fn evict_if_needed(&self) {
        if self.data.len() < self.max_entries {
            return;
        }
        self.data.retain(|_, entry| !entry.is_expired());
        self.counters
            .retain(|_, c| !c.expires_at.is_some_and(|exp| Instant::now() > exp));
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        if let Some(entry) = self.data.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.data.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.data.clone()));
        }
        // Scalar reads fall through to counters so that get_i64 on a
        // rate-limit key observes incremented values.
        if let Some(counter) = self.counters.get(key) {
            if counter.expires_at.is_some_and(|exp| Instant::now() > exp) {
                drop(counter);
                self.counters.remove(key);
                return Ok(None);
            }
            return Ok(Some(
                counter.value.load(Ordering::SeqCst).to_string().into_bytes(),
            ));
        }
        Ok(None)
    }

    async fn set_bytes(&self, key: &str, value: &[u8], ttl: Duration) -> CacheResult<()> {
        self.evict_if_needed();
        self.data
            .insert(key.to_string(), CacheEntry::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn take_bytes(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        match self.data.remove(key) {
            Some((_, entry)) if !entry.is_expired() => Ok(Some(entry.data)),
            _ => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.data.remove(key);
        self.counters.remove(key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl: Duration) -> CacheResult<i64> {
        let mut entry = self.counters.entry(key.to_string()).or_insert_with(|| Counter {
            value: Arc::new(AtomicI64::new(0)),
            expires_at: None,
        });

        // An expired counter restarts at zero; the window is fixed at the
        // first increment and never extended by later ones.
        if entry.expires_at.is_some_and(|exp| Instant::now() > exp) {
            entry.value.store(0, Ordering::SeqCst);
            entry.expires_at = None;
        }
        if entry.expires_at.is_none() && !ttl.is_zero() {
            entry.expires_at = Some(Instant::now() + ttl);
        }

        Ok(entry.value.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> CacheResult<bool> {
        if let Some(mut entry) = self.data.get_mut(key) {
            entry.expires_at = if ttl.is_zero() {
                None
            } else {
                Some(Instant::now() + ttl)
            };
            return Ok(true);
        }
        if let Some(mut counter) = self.counters.get_mut(key) {
            counter.expires_at = if ttl.is_zero() {
                None
            } else {
                Some(Instant::now() + ttl)
            };
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_roundtrip() {
        let cache = MemoryCache::new(16);
        cache
            .set_bytes("k", b"value", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get_bytes("k").await.unwrap(), Some(b"value".to_vec()));
    }

    #[tokio::test]
    async fn get_after_ttl_returns_none() {
        let cache = MemoryCache::new(16);
        cache
            .set_bytes("k", b"value", Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get_bytes("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn take_consumes_exactly_once() {
        let cache = MemoryCache::new(16);
        cache
            .set_bytes("code", b"ctx", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            cache.take_bytes("code").await.unwrap(),
            Some(b"ctx".to_vec())
        );
        assert_eq!(cache.take_bytes("code").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_and_window_expires() {
        let cache = MemoryCache::new(16);
        assert_eq!(cache.incr("ip", Duration::from_millis(20)).await.unwrap(), 1);
        assert_eq!(cache.incr("ip", Duration::from_millis(20)).await.unwrap(), 2);
        tokio::time::sleep(Duration::from_millis(40)).await;
        // Counter restarts once its fixed window has lapsed
        assert_eq!(cache.incr("ip", Duration::from_millis(20)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scalar_reads_tolerate_absent_and_wrong_type() {
        let cache = MemoryCache::new(16);
        assert_eq!(cache.get_i64("absent").await.unwrap(), None);
        assert!(!cache.get_bool("absent").await.unwrap());
        cache
            .set_bytes("s", b"not a number", Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(cache.get_i64("s").await.unwrap(), None);
        cache.set_bytes("t", b"true", Duration::ZERO).await.unwrap();
        assert!(cache.get_bool("t").await.unwrap());
    }

    #[tokio::test]
    async fn incremented_counter_is_visible_to_scalar_reads() {
        let cache = MemoryCache::new(16);
        cache.incr("n", Duration::from_secs(60)).await.unwrap();
        cache.incr("n", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get_i64("n").await.unwrap(), Some(2));
    }
}
