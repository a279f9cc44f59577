//! In-memory fixed-window rate limiter applied as axum middleware.
//!
//! Keys requests by client IP (honoring `X-Forwarded-For`), emits the
//! standard `X-RateLimit-*` headers, and answers 429 once a window is
//! exhausted. State lives in a `DashMap`, so limits are per-process.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use metrics::counter;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::errors::ServiceError;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_window: u32,
    pub window_duration: Duration,
    pub enable_headers: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 100,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        }
    }
}

#[derive(Debug)]
struct WindowEntry {
    count: u32,
    window_start: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    entries: DashMap<String, WindowEntry>,
}

/// Outcome of a rate-limit check, used to populate response headers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
        }
    }

    pub fn check(&self, key: &str) -> RateLimitDecision {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| WindowEntry {
                count: 0,
                window_start: now,
            });

        if now.duration_since(entry.window_start) >= self.config.window_duration {
            entry.count = 0;
            entry.window_start = now;
        }

        let allowed = entry.count < self.config.requests_per_window;
        if allowed {
            entry.count += 1;
        }

        let elapsed = now.duration_since(entry.window_start);
        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(elapsed)
            .as_secs();

        RateLimitDecision {
            allowed,
            limit: self.config.requests_per_window,
            remaining: self.config.requests_per_window.saturating_sub(entry.count),
            reset_secs,
        }
    }

    fn headers_enabled(&self) -> bool {
        self.config.enable_headers
    }
}

fn client_key(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(first) = forwarded.split(',').next() {
            let trimmed = first.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<axum::extract::ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn apply_headers(response: &mut Response, decision: &RateLimitDecision) {
    let headers = response.headers_mut();
    headers.insert(
        "x-ratelimit-limit",
        num_header_value(decision.limit),
    );
    headers.insert(
        "x-ratelimit-remaining",
        num_header_value(decision.remaining),
    );
    headers.insert(
        "x-ratelimit-reset",
        num_header_value(decision.reset_secs),
    );
}

fn num_header_value<T: ToString>(n: T) -> HeaderValue {
    HeaderValue::from_str(&n.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0"))
}

pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let key = client_key(&request);
    let decision = limiter.check(&key);

    if !decision.allowed {
        debug!(key, "rate limit exceeded");
        counter!("matchable_http.rate_limited", 1);
        let mut response = ServiceError::RateLimitExceeded.into_response();
        if limiter.headers_enabled() {
            apply_headers(&mut response, &decision);
        }
        return response;
    }

    let mut response = next.run(request).await;
    if limiter.headers_enabled() {
        apply_headers(&mut response, &decision);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 3,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        });

        assert!(limiter.check("1.2.3.4").allowed);
        assert!(limiter.check("1.2.3.4").allowed);
        let third = limiter.check("1.2.3.4");
        assert!(third.allowed);
        assert_eq!(third.remaining, 0);

        let fourth = limiter.check("1.2.3.4");
        assert!(!fourth.allowed);
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_window: 1,
            window_duration: Duration::from_secs(60),
            enable_headers: true,
        });

        assert!(limiter.check("a").allowed);
        assert!(!limiter.check("a").allowed);
        assert!(limiter.check("b").allowed);
    }
}
