//! In-memory TTL cache for upstream responses.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http_client::HttpResponse;

/// Responses older than this are refetched.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Status codes whose responses may be cached.
pub const CACHEABLE_STATUS: std::ops::RangeInclusive<u16> = 200..=206;

/// Whether `response` may be stored.
///
/// Throttling pages are never stored, whatever their status, so a retry after
/// backoff reaches the upstream again.
pub fn is_cacheable(response: &HttpResponse) -> bool {
    CACHEABLE_STATUS.contains(&response.status) && !response.is_rate_limited()
}

/// A cached response body and the status it was served with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: u16,
    pub body: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    expires_at: Instant,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<String, CacheEntry>,
    default_ttl: Duration,
}

impl CacheInner {
    fn new(default_ttl: Duration) -> Self {
        Self {
            map: HashMap::new(),
            default_ttl,
        }
    }

    fn get(&self, key: &str) -> Option<CachedResponse> {
        self.map.get(key).and_then(|entry| {
            if Instant::now() <= entry.expires_at {
                Some(entry.response.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, key: String, response: CachedResponse) {
        let expires_at = Instant::now() + self.default_ttl;
        self.map.insert(
            key,
            CacheEntry {
                response,
                expires_at,
            },
        );
    }

    fn clear_expired(&mut self) {
        let now = Instant::now();
        self.map.retain(|_, entry| entry.expires_at > now);
    }
}

/// Thread-safe in-memory cache of upstream responses keyed by method and URL.
#[derive(Debug, Clone)]
pub struct CacheStore {
    inner: Arc<tokio::sync::RwLock<CacheInner>>,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}

impl CacheStore {
    /// Create a new cache store with a default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            inner: Arc::new(tokio::sync::RwLock::new(CacheInner::new(default_ttl))),
        }
    }

    /// Create a disabled cache; every lookup misses and writes are dropped.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO)
    }

    /// Get a cached response if it exists and hasn't expired.
    pub async fn get(&self, key: &str) -> Option<CachedResponse> {
        let store = self.inner.read().await;
        store.get(key)
    }

    /// Store a response under `key` for the cache TTL. No-op when the cache is disabled.
    pub async fn put(&self, key: String, response: CachedResponse) {
        let mut store = self.inner.write().await;

        if store.default_ttl == Duration::ZERO {
            return;
        }

        store.put(key, response);
    }

    /// Remove expired entries from the cache.
    pub async fn clear_expired(&self) {
        let mut store = self.inner.write().await;
        store.clear_expired();
    }

    /// Clear all entries from the cache.
    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, expired ones included until they are purged.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_disabled(&self) -> bool {
        self.inner.read().await.default_ttl == Duration::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> CachedResponse {
        CachedResponse {
            status: 200,
            body: body.to_owned(),
        }
    }

    #[tokio::test]
    async fn test_cache_store_basic_operations() {
        let cache = CacheStore::new(Duration::from_secs(1));

        assert!(cache.get("key1").await.is_none());

        cache.put("key1".to_string(), response("value1")).await;
        assert_eq!(cache.get("key1").await, Some(response("value1")));

        cache.put("key1".to_string(), response("value2")).await;
        assert_eq!(cache.get("key1").await, Some(response("value2")));
    }

    #[tokio::test]
    async fn test_cache_expiration() {
        let cache = CacheStore::new(Duration::from_millis(100));

        cache.put("key1".to_string(), response("value1")).await;
        assert!(cache.get("key1").await.is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(cache.get("key1").await.is_none());
    }

    #[tokio::test]
    async fn test_cache_clear_expired() {
        let cache = CacheStore::new(Duration::from_millis(100));

        cache.put("key1".to_string(), response("value1")).await;
        cache.put("key2".to_string(), response("value2")).await;
        assert_eq!(cache.len().await, 2);

        tokio::time::sleep(Duration::from_millis(150)).await;
        cache.clear_expired().await;

        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_clear_all() {
        let cache = CacheStore::default();

        cache.put("key1".to_string(), response("value1")).await;
        cache.put("key2".to_string(), response("value2")).await;

        assert_eq!(cache.len().await, 2);
        cache.clear().await;
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let cache = CacheStore::disabled();

        assert!(cache.is_disabled().await);

        cache.put("key1".to_string(), response("value1")).await;
        assert!(cache.get("key1").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[test]
    fn only_successful_payloads_are_cacheable() {
        assert!(is_cacheable(&HttpResponse::new(200, "{}")));
        assert!(is_cacheable(&HttpResponse::new(206, "{}")));
        assert!(!is_cacheable(&HttpResponse::new(207, "{}")));
        assert!(!is_cacheable(&HttpResponse::new(404, "{}")));
        assert!(!is_cacheable(&HttpResponse::new(429, "{}")));
        assert!(!is_cacheable(&HttpResponse::new(200, "Edge: Too Many Requests")));
    }
}
