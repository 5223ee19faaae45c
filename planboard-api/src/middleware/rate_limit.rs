/// Rate limiting middleware
///
/// Token bucket rate limiting with in-process state. Every key (user id or
/// client IP) gets its own bucket.
///
/// # Algorithm
///
/// - Bucket capacity equals the per-minute limit
/// - Tokens refill continuously at `limit / 60` per second
/// - Each request consumes 1 token
/// - Request blocked if bucket empty
///
/// # Keys
///
/// - Authenticated routes: `user:{user_id}`
/// - `/v1/auth/*`: `ip:{addr}`, taken from the first `X-Forwarded-For` hop,
///   then the socket address
///
/// # Headers
///
/// - `X-RateLimit-Limit`: Requests allowed per minute
/// - `X-RateLimit-Remaining`: Whole tokens left after this request
/// - `Retry-After`: Seconds to wait (429 responses only)

use crate::app::AppState;
use crate::error::ApiError;
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use planboard_shared::auth::context::AuthContext;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");
const REMAINING_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-remaining");

/// Buckets are pruned once the map grows past this many keys
const PRUNE_THRESHOLD: usize = 10_000;

/// Minimum time between two pruning scans
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Token bucket state
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a new full bucket
    fn new(capacity: u32, now: Instant) -> Self {
        TokenBucket {
            tokens: f64::from(capacity),
            last_refill: now,
        }
    }

    /// Refills tokens based on elapsed time
    fn refill(&mut self, rate: f64, capacity: u32, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();

        self.tokens = (self.tokens + elapsed * rate).min(f64::from(capacity));
        self.last_refill = now;
    }

    /// Attempts to consume one token
    fn try_consume(&mut self) -> bool {
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Whole seconds until one token is available
    fn seconds_until_available(&self, rate: f64) -> u64 {
        let deficit = 1.0 - self.tokens;
        if deficit <= 0.0 {
            0
        } else {
            (deficit / rate).ceil().max(1.0) as u64
        }
    }

    fn is_full(&self, capacity: u32) -> bool {
        self.tokens >= f64::from(capacity)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed { remaining: u32 },
    Limited { retry_after: u64 },
}

#[derive(Debug, Default)]
struct Buckets {
    by_key: HashMap<String, TokenBucket>,
    last_prune: Option<Instant>,
}

impl Buckets {
    fn prune_due(&self, now: Instant) -> bool {
        self.by_key.len() >= PRUNE_THRESHOLD
            && self
                .last_prune
                .map_or(true, |last| now.saturating_duration_since(last) >= PRUNE_INTERVAL)
    }
}

/// Keyed token bucket limiter
#[derive(Debug)]
pub struct RateLimiter {
    per_minute: u32,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(per_minute: u32) -> Self {
        Self {
            per_minute: per_minute.max(1),
            buckets: Mutex::new(Buckets::default()),
        }
    }

    pub fn per_minute(&self) -> u32 {
        self.per_minute
    }

    fn refill_rate(&self) -> f64 {
        f64::from(self.per_minute) / 60.0
    }

    /// Consumes a token for `key`
    pub async fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now()).await
    }

    async fn check_at(&self, key: &str, now: Instant) -> Decision {
        let rate = self.refill_rate();
        let capacity = self.per_minute;
        let mut buckets = self.buckets.lock().await;

        if buckets.prune_due(now) {
            prune_full(&mut buckets.by_key, rate, capacity, now);
            buckets.last_prune = Some(now);
        }

        let bucket = buckets
            .by_key
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::new(capacity, now));
        bucket.refill(rate, capacity, now);

        if bucket.try_consume() {
            Decision::Allowed {
                remaining: bucket.tokens.floor() as u32,
            }
        } else {
            Decision::Limited {
                retry_after: bucket.seconds_until_available(rate),
            }
        }
    }
}

/// Drops buckets that have refilled completely
fn prune_full(buckets: &mut HashMap<String, TokenBucket>, rate: f64, capacity: u32, now: Instant) {
    buckets.retain(|_, bucket| {
        bucket.refill(rate, capacity, now);
        !bucket.is_full(capacity)
    });
}

/// Runs the request if `limiter` allows `key`, then adds the rate limit headers
async fn enforce(limiter: &RateLimiter, key: String, request: Request, next: Next) -> Result<Response, ApiError> {
    match limiter.check(&key).await {
        Decision::Allowed { remaining } => {
            let mut response = next.run(request).await;

            let headers = response.headers_mut();
            headers.insert(LIMIT_HEADER, HeaderValue::from(limiter.per_minute()));
            headers.insert(REMAINING_HEADER, HeaderValue::from(remaining));

            Ok(response)
        }
        Decision::Limited { retry_after } => {
            tracing::warn!(key = %key, retry_after, "Rate limit exceeded");

            Err(ApiError::RateLimitExceeded {
                retry_after,
                message: format!("Rate limit exceeded. Try again in {} seconds", retry_after),
            })
        }
    }
}

/// Client address: first `X-Forwarded-For` hop, then the socket address
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|hop| !hop.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

/// Per-user limit for authenticated routes
///
/// Runs after the JWT layer; anonymous requests fall back to the client IP.
pub async fn user_rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = match request.extensions().get::<AuthContext>() {
        Some(auth) => format!("user:{}", auth.user_id),
        None => format!("ip:{}", client_ip(request.headers(), peer_addr(&request))),
    };

    enforce(&state.user_limiter, key, request, next).await
}

/// Per-IP limit for `/v1/auth/*`
pub async fn auth_rate_limit_layer(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = format!("ip:{}", client_ip(request.headers(), peer_addr(&request)));

    enforce(&state.auth_limiter, key, request, next).await
}
