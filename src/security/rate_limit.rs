//! Fixed-window rate limiting with named tiers.
//!
//! Every tier owns its own bucket table keyed by client identity. A bucket is
//! created on first use and its window restarts once the previous one has
//! elapsed; buckets are never removed. Increment and compare happen under the
//! map's entry lock, so concurrent requests for one key cannot both pass on a
//! stale count.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;

use crate::config::schema::{RateLimitConfig, TierConfig};
use crate::error::response::ms_to_secs;
use crate::error::{ApiError, GatewayError};
use crate::observability::metrics;

pub const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
pub const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
pub const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Named rate-limit configurations applied to groups of routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    General,
    Auth,
    PasswordReset,
    Upload,
    Community,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::General,
        Tier::Auth,
        Tier::PasswordReset,
        Tier::Upload,
        Tier::Community,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Tier::General => "general",
            Tier::Auth => "auth",
            Tier::PasswordReset => "password-reset",
            Tier::Upload => "upload",
            Tier::Community => "community",
        }
    }

    fn settings(self, config: &RateLimitConfig) -> &TierConfig {
        match self {
            Tier::General => &config.general,
            Tier::Auth => &config.auth,
            Tier::PasswordReset => &config.password_reset,
            Tier::Upload => &config.upload,
            Tier::Community => &config.community,
        }
    }
}

struct Bucket {
    window_start: Instant,
    count: u32,
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window ends.
    pub reset_after_ms: u64,
    window_start: Instant,
}

/// One tier's limiter. Settings can be swapped without touching counters.
pub struct RateLimiter {
    tier: Tier,
    config: ArcSwap<TierConfig>,
    buckets: DashMap<String, Bucket>,
}

impl RateLimiter {
    pub fn new(tier: Tier, config: TierConfig) -> Self {
        Self {
            tier,
            config: ArcSwap::from_pointee(config),
            buckets: DashMap::new(),
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn config(&self) -> TierConfig {
        self.config.load().as_ref().clone()
    }

    pub fn reconfigure(&self, config: TierConfig) {
        self.config.store(Arc::new(config));
    }

    pub fn check(&self, key: &str) -> Decision {
        self.check_at(key, Instant::now())
    }

    pub fn check_at(&self, key: &str, now: Instant) -> Decision {
        let config = self.config.load();
        let window = Duration::from_millis(config.window_ms);

        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            window_start: now,
            count: 0,
        });

        let mut elapsed = now.saturating_duration_since(bucket.window_start);
        if elapsed >= window {
            bucket.window_start = now;
            bucket.count = 0;
            elapsed = Duration::ZERO;
        }

        // Stop counting once over the limit; rejected requests need no more precision.
        if bucket.count <= config.limit {
            bucket.count += 1;
        }

        Decision {
            allowed: bucket.count <= config.limit,
            limit: config.limit,
            remaining: config.limit.saturating_sub(bucket.count),
            reset_after_ms: (window.saturating_sub(elapsed).as_millis() as u64).max(1),
            window_start: bucket.window_start,
        }
    }

    /// Give back the request counted by `decision`, unless its window has rolled over.
    pub fn refund(&self, key: &str, decision: &Decision) {
        if let Some(mut bucket) = self.buckets.get_mut(key) {
            if bucket.window_start == decision.window_start {
                bucket.count = bucket.count.saturating_sub(1);
            }
        }
    }

    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}

/// One limiter per tier plus the client-keying settings.
pub struct RateLimiters {
    enabled: AtomicBool,
    trust_forwarded_for: AtomicBool,
    limiters: [Arc<RateLimiter>; 5],
}

impl RateLimiters {
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self {
            enabled: AtomicBool::new(config.enabled),
            trust_forwarded_for: AtomicBool::new(config.trust_forwarded_for),
            limiters: Tier::ALL
                .map(|tier| Arc::new(RateLimiter::new(tier, tier.settings(config).clone()))),
        }
    }

    pub fn get(&self, tier: Tier) -> &Arc<RateLimiter> {
        // Same order as Tier::ALL
        &self.limiters[tier as usize]
    }

    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub fn trust_forwarded_for(&self) -> bool {
        self.trust_forwarded_for.load(Ordering::Relaxed)
    }

    /// Apply reloaded settings. Existing counters are kept.
    pub fn apply(&self, config: &RateLimitConfig) {
        self.enabled.store(config.enabled, Ordering::Relaxed);
        self.trust_forwarded_for
            .store(config.trust_forwarded_for, Ordering::Relaxed);
        for tier in Tier::ALL {
            self.get(tier).reconfigure(tier.settings(config).clone());
        }
    }
}

/// Client identity: first `X-Forwarded-For` hop when trusted, else the peer IP.
pub fn client_key(headers: &HeaderMap, peer: Option<SocketAddr>, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|hop| !hop.is_empty());
        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Write `RateLimit-*` headers unless an inner, more specific tier already did.
fn set_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    if headers.contains_key(&RATELIMIT_LIMIT) {
        return;
    }
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(
        RATELIMIT_RESET,
        HeaderValue::from(ms_to_secs(decision.reset_after_ms)),
    );
}

/// Middleware state: the shared limiter set and the tier this layer enforces.
#[derive(Clone)]
pub struct TierGuard {
    pub limiters: Arc<RateLimiters>,
    pub tier: Tier,
}

pub async fn rate_limit(
    State(guard): State<TierGuard>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !guard.limiters.enabled() {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let key = client_key(req.headers(), peer, guard.limiters.trust_forwarded_for());
    let limiter = guard.limiters.get(guard.tier);
    let decision = limiter.check(&key);

    if !decision.allowed {
        let tier = guard.tier.name();
        tracing::warn!(tier, client = %key, limit = decision.limit, "Rate limit exceeded");
        metrics::record_rate_limited(tier);

        let err = GatewayError::RateLimited {
            tier,
            limit: decision.limit,
            retry_after_ms: decision.reset_after_ms,
        };
        let mut response = ApiError::for_request(err, &req).into_response();
        set_quota_headers(response.headers_mut(), &decision);
        return response;
    }

    let mut response = next.run(req).await;
    if limiter.config().skip_successful && response.status().as_u16() < 400 {
        limiter.refund(&key, &decision);
    }
    set_quota_headers(response.headers_mut(), &decision);
    response
}
