//! In-memory response cache with per-entry expiry.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use crate::config::CacheConfig;

pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, (V, Instant)>>,
    default_ttl: Duration,
    enabled: bool,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(default_ttl: Duration, enabled: bool) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            default_ttl,
            enabled,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns a clone of the live value. Expired entries are evicted on read.
    pub async fn get(&self, key: &str) -> Option<V> {
        if !self.enabled {
            return None;
        }

        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((value, expires_at)) if Instant::now() < *expires_at => Some(value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        self.set_with_ttl(key, value, self.default_ttl).await;
    }

    pub async fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        if !self.enabled {
            return;
        }
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .await
            .insert(key.into(), (value, expires_at));
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    /// Drop expired entries and return how many were removed.
    pub async fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = TtlCache::new(Duration::from_secs(60), true);
        cache.set("k", 42).await;
        assert_eq!(cache.get("k").await, Some(42));
        assert_eq!(cache.get("missing").await, None);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = TtlCache::new(Duration::from_secs(60), true);
        cache
            .set_with_ttl("short", "v".to_string(), Duration::from_millis(10))
            .await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(cache.get("short").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_cleanup_expired_counts_removals() {
        let cache = TtlCache::new(Duration::from_secs(60), true);
        cache.set_with_ttl("a", 1, Duration::from_millis(5)).await;
        cache.set_with_ttl("b", 2, Duration::from_millis(5)).await;
        cache.set("c", 3).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(cache.cleanup_expired().await, 2);
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = TtlCache::new(Duration::from_secs(60), true);
        cache.set("a", 1).await;
        cache.set("b", 2).await;
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
        assert_eq!(cache.get("a").await, None);
    }

    #[tokio::test]
    async fn test_disabled_cache_never_stores() {
        let cache = TtlCache::from_config(&CacheConfig {
            enabled: false,
            ..Default::default()
        });
        cache.set("a", 1).await;
        assert!(!cache.is_enabled());
        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.len().await, 0);
    }
}
