//! Cached, rate-limited upstream session.
//!
//! ```text
//! request ──▶ cache hit? ──yes──▶ cached response
//!                 │no
//!                 ▼
//!          rate limiter (waits) ──▶ transport ──▶ store if 200..=206 and not throttled
//! ```

use std::sync::Arc;

use tracing::debug;

use crate::cache::{is_cacheable, CacheStore, CachedResponse};
use crate::http_client::{HttpClient, HttpFuture, HttpRequest, HttpResponse};
use crate::throttling::MultiWindowLimiter;

/// Transport wrapper that serves repeated GETs from cache and paces the rest.
#[derive(Clone)]
pub struct UpstreamSession {
    transport: Arc<dyn HttpClient>,
    cache: CacheStore,
    limiter: MultiWindowLimiter,
}

impl std::fmt::Debug for UpstreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamSession")
            .field("cache", &self.cache)
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

impl UpstreamSession {
    pub fn new(transport: Arc<dyn HttpClient>, cache: CacheStore, limiter: MultiWindowLimiter) -> Self {
        Self {
            transport,
            cache,
            limiter,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn limiter(&self) -> &MultiWindowLimiter {
        &self.limiter
    }

    /// Drop every cached response.
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        debug!("upstream response cache cleared");
    }

    /// Number of live cached responses; expired entries are purged first.
    pub async fn cache_size(&self) -> usize {
        self.cache.clear_expired().await;
        self.cache.len().await
    }
}

impl HttpClient for UpstreamSession {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        Box::pin(async move {
            let use_cache = request.cacheable;
            let key = request.cache_key();

            if use_cache {
                if let Some(hit) = self.cache.get(&key).await {
                    debug!(url = %request.url, "cache hit");
                    return Ok(HttpResponse::new(hit.status, hit.body));
                }
            }

            self.limiter.acquire().await;
            let response = self.transport.execute(request).await?;

            if use_cache && is_cacheable(&response) {
                self.cache
                    .put(
                        key,
                        CachedResponse {
                            status: response.status,
                            body: response.body.clone(),
                        },
                    )
                    .await;
            }

            Ok(response)
        })
    }
}
