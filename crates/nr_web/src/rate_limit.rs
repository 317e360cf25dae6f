use axum::{
    extract::{ConnectInfo, Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use nr_cache::keys::rate_limit_key;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::ApiError;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            burst: 10,
        }
    }
}

/// Checks between sweeps of idle buckets.
const SWEEP_EVERY: u64 = 1024;

struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn refilled(&self, now: Instant, per_second: f64, max: f64) -> f64 {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        (self.tokens + elapsed * per_second).min(max)
    }
}

/// Per-client token buckets keyed by `ratelimit:ip:<client>`. Buckets start
/// full at `burst` and refill at `requests_per_minute`. A bucket that has
/// refilled completely is dropped on the next sweep.
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<HashMap<String, TokenBucket>>,
    checks: AtomicU64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    fn max_tokens(&self) -> f64 {
        self.config.burst as f64
    }

    fn per_second(&self) -> f64 {
        self.config.requests_per_minute as f64 / 60.0
    }

    pub async fn allow(&self, client: &str) -> bool {
        let now = Instant::now();
        let max = self.max_tokens();
        let per_second = self.per_second();

        let mut buckets = self.buckets.lock().await;
        if self.checks.fetch_add(1, Ordering::Relaxed) % SWEEP_EVERY == SWEEP_EVERY - 1 {
            let evicted = Self::sweep(&mut buckets, now, per_second, max);
            if evicted > 0 {
                debug!(evicted, remaining = buckets.len(), "Evicted idle rate limit buckets");
            }
        }

        let bucket = buckets
            .entry(rate_limit_key(client))
            .or_insert(TokenBucket {
                tokens: max,
                last_refill: now,
            });

        bucket.tokens = bucket.refilled(now, per_second, max);
        bucket.last_refill = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Drop every bucket that has refilled to `burst`, returning how many went.
    pub async fn evict_idle(&self) -> usize {
        let mut buckets = self.buckets.lock().await;
        Self::sweep(&mut buckets, Instant::now(), self.per_second(), self.max_tokens())
    }

    /// Tracked client count.
    pub async fn len(&self) -> usize {
        self.buckets.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sweep(
        buckets: &mut HashMap<String, TokenBucket>,
        now: Instant,
        per_second: f64,
        max: f64,
    ) -> usize {
        let before = buckets.len();
        buckets.retain(|_, bucket| bucket.refilled(now, per_second, max) < max);
        before - buckets.len()
    }
}

/// First hop of `X-Forwarded-For`, then `X-Real-IP`, then the socket address.
pub fn client_id(headers: &HeaderMap, remote: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
    };

    if let Some(forwarded) = header("x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    if let Some(real_ip) = header("x-real-ip") {
        return real_ip.to_string();
    }
    remote
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_id(request.headers(), remote);

    if !limiter.allow(&client).await {
        warn!(client_ip = %client, uri = %request.uri(), "Rate limit exceeded");
        return ApiError::rate_limited().into_response();
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_burst_then_refill() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for _ in 0..10 {
            assert!(limiter.allow("10.0.0.1").await);
        }
        assert!(!limiter.allow("10.0.0.1").await);
        assert!(limiter.allow("10.0.0.2").await);

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.allow("10.0.0.1").await);
        assert!(!limiter.allow("10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_buckets_are_evicted() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for i in 0..500 {
            assert!(limiter.allow(&format!("198.51.100.{}", i)).await);
        }
        assert_eq!(limiter.len().await, 500);

        // One spent token refills in a second at 60/min.
        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(limiter.evict_idle().await, 0);

        for _ in 0..10 {
            limiter.allow("10.0.0.1").await;
        }
        tokio::time::advance(Duration::from_millis(600)).await;
        assert_eq!(limiter.evict_idle().await, 500);
        assert_eq!(limiter.len().await, 1);

        // A drained bucket keeps its debt instead of being reset to full.
        assert!(!limiter.allow("10.0.0.1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spoofed_clients_do_not_accumulate() {
        let limiter = RateLimiter::new(RateLimitConfig::default());
        for i in 0..10_000u32 {
            limiter.allow(&format!("spoofed-{}", i)).await;
            if i % 100 == 99 {
                tokio::time::advance(Duration::from_millis(250)).await;
            }
        }
        // Only clients seen within the last refill second can still be tracked.
        assert!(limiter.len().await <= 2 * SWEEP_EVERY as usize);
    }

    #[test]
    fn test_client_id_precedence() {
        let remote: SocketAddr = "192.168.1.5:4000".parse().unwrap();
        let mut headers = HeaderMap::new();
        assert_eq!(client_id(&headers, Some(remote)), "192.168.1.5");
        assert_eq!(client_id(&headers, None), "unknown");

        headers.insert("x-real-ip", HeaderValue::from_static("10.1.1.1"));
        assert_eq!(client_id(&headers, Some(remote)), "10.1.1.1");

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_id(&headers, Some(remote)), "203.0.113.7");
    }
}
