//! Per-IP fixed window rate limiting.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::config::RateLimitConfig;
use crate::http::response::ApiError;
use crate::monitoring;
use crate::observability::metrics;

/// Paths that are never rate limited.
pub const EXEMPT_PREFIXES: [&str; 5] = [
    monitoring::PROXY_HEALTH,
    monitoring::STATUS,
    monitoring::TEST_CONNECTION,
    monitoring::DOWNLOAD_CERT,
    monitoring::CERT_INFO,
];

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// True for monitoring routes.
pub fn is_exempt(path: &str) -> bool {
    EXEMPT_PREFIXES.iter().any(|p| path.starts_with(p))
}

/// Counter for one client within the current window.
#[derive(Debug)]
struct Window {
    count: u32,
    started: Instant,
}

/// Outcome of a limiter check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
    },
    Limited {
        limit: u32,
        reset_after: Duration,
    },
}

impl RateDecision {
    fn write_headers(&self, headers: &mut HeaderMap) {
        let (limit, remaining, reset_after) = match *self {
            RateDecision::Allowed {
                limit,
                remaining,
                reset_after,
            } => (limit, remaining, reset_after),
            RateDecision::Limited { limit, reset_after } => (limit, 0, reset_after),
        };
        headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
        headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
        headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset_after)));
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Process-local request counters keyed by client IP.
pub struct RateLimiter {
    windows: DashMap<IpAddr, Window>,
    window: Duration,
    max_requests: u32,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            windows: DashMap::new(),
            window: config.window,
            max_requests: config.max_requests,
        }
    }

    pub fn check(&self, ip: IpAddr) -> RateDecision {
        self.check_at(ip, Instant::now())
    }

    /// Count one request from `ip` at `now`.
    ///
    /// The map entry stays locked across the check and the increment, so
    /// concurrent requests from one IP cannot undercount.
    pub fn check_at(&self, ip: IpAddr, now: Instant) -> RateDecision {
        let mut entry = self.windows.entry(ip).or_insert_with(|| Window {
            count: 0,
            started: now,
        });

        if now.duration_since(entry.started) >= self.window {
            entry.count = 0;
            entry.started = now;
        }
        let reset_after = self.window.saturating_sub(now.duration_since(entry.started));

        if entry.count >= self.max_requests {
            return RateDecision::Limited {
                limit: self.max_requests,
                reset_after,
            };
        }

        entry.count += 1;
        RateDecision::Allowed {
            limit: self.max_requests,
            remaining: self.max_requests - entry.count,
            reset_after,
        }
    }

    /// Drop windows that have fully elapsed. Returns how many were removed.
    pub fn sweep(&self, now: Instant) -> usize {
        let before = self.windows.len();
        self.windows
            .retain(|_, w| now.duration_since(w.started) < self.window);
        before.saturating_sub(self.windows.len())
    }

    /// Number of clients with a live window.
    pub fn tracked_clients(&self) -> usize {
        self.windows.len()
    }

    /// Periodically sweep expired windows until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.window);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = self.sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!(removed, remaining = self.tracked_clients(), "Expired rate limit windows swept");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Rate limit sweeper stopping");
                    break;
                }
            }
        }
    }
}

/// Middleware function for per-IP rate limiting.
pub async fn rate_limit_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = addr.ip().to_canonical();
    let decision = limiter.check(ip);

    match decision {
        RateDecision::Allowed { .. } => {
            let mut response = next.run(request).await;
            decision.write_headers(response.headers_mut());
            response
        }
        RateDecision::Limited { reset_after, .. } => {
            tracing::warn!(client = %ip, path = %request.uri().path(), "Rate limit exceeded");
            metrics::record_rate_limited();
            let mut response = ApiError::RateLimited {
                retry_after_secs: ceil_secs(reset_after),
            }
            .into_response();
            decision.write_headers(response.headers_mut());
            response
        }
    }
}
