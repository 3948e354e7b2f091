//! Shared cache for tenant-scoped dashboard data

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Key/value cache shared by the web tier and the invalidation hook
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// The live value under `key`, if any
    async fn get(&self, key: &str) -> CacheResult<Option<Value>>;

    /// Store `value`, expiring after `ttl` when given
    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove `key`; returns whether a live entry was removed
    async fn delete(&self, key: &str) -> CacheResult<bool>;
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// Process-local cache. Expired entries are dropped when next touched.
#[derive(Debug, Default)]
pub struct InMemoryCache {
    entries: DashMap<String, Entry>,
    default_ttl: Option<Duration>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries stored without an explicit TTL expire after `ttl`
    pub fn with_default_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl: Some(ttl),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            if entry.is_live(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        self.entries.remove_if(key, |_, entry| !entry.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: Value, ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove(key)
            .is_some_and(|(_, entry)| entry.is_live(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache
            .set("customer_locations_1", json!([{"lat": -1.28}]), None)
            .await
            .unwrap();

        assert_eq!(
            cache.get("customer_locations_1").await.unwrap(),
            Some(json!([{"lat": -1.28}]))
        );
        assert!(cache.delete("customer_locations_1").await.unwrap());
        assert!(!cache.delete("customer_locations_1").await.unwrap());
        assert_eq!(cache.get("customer_locations_1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_entries_are_dropped_on_read() {
        let cache = InMemoryCache::new();
        cache
            .set("k", json!(1), Some(Duration::from_millis(10)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let cache = InMemoryCache::with_default_ttl(Duration::from_millis(10));
        cache.set("k", json!("v"), None).await.unwrap();
        cache
            .set("pinned", json!("v"), Some(Duration::from_secs(60)))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("k").await.unwrap(), None);
        assert_eq!(cache.get("pinned").await.unwrap(), Some(json!("v")));
    }
}
