//! Tiered fixed-window rate limiting.
//!
//! # Responsibilities
//! - Hold one policy and one counter store per tier
//! - Count a hit per request and reject once the ceiling is passed
//! - Take back hits the policy says not to count (successes or failures)
//!
//! # Design Decisions
//! - Tiers are attached to route groups, never to the global chain
//! - Distinct tiers never share a counter store
//! - A hit whose request is cancelled before a response settles as a failure

use axum::{
    body::Body,
    extract::State,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::{Environment, KeyStrategy, TierConfig};
use crate::http::request::client_ip_of;
use crate::http::response::Rejection;
use crate::observability::audit::{AuditLogger, EventOutcome, SecurityEvent, SecurityEventKind};
use crate::observability::metrics;
use crate::security::store::{CounterStore, InMemoryCounterStore};

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

/// Named rate-limit tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Auth,
    Api,
    Strict,
    Admin,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Auth => "auth",
            Tier::Api => "api",
            Tier::Strict => "strict",
            Tier::Admin => "admin",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type KeyFn = Arc<dyn Fn(&Request<Body>) -> String + Send + Sync>;
pub type SkipFn = Arc<dyn Fn(&Request<Body>) -> bool + Send + Sync>;

/// Immutable limiter configuration for one tier.
#[derive(Clone)]
pub struct Policy {
    pub window: Duration,
    pub max: u32,
    pub skip_successful: bool,
    pub skip_failed: bool,
    pub key_fn: KeyFn,
    pub skip_fn: Option<SkipFn>,
}

impl Policy {
    /// Client-IP keyed policy that counts every request.
    pub fn new(window: Duration, max: u32) -> Self {
        Self {
            window,
            max,
            skip_successful: false,
            skip_failed: false,
            key_fn: Arc::new(client_ip_of),
            skip_fn: None,
        }
    }

    pub fn skip_successful(mut self) -> Self {
        self.skip_successful = true;
        self
    }

    pub fn skip_failed(mut self) -> Self {
        self.skip_failed = true;
        self
    }

    pub fn with_key_fn(mut self, key_fn: KeyFn) -> Self {
        self.key_fn = key_fn;
        self
    }

    pub fn with_skip_fn(mut self, skip_fn: SkipFn) -> Self {
        self.skip_fn = Some(skip_fn);
        self
    }

    /// Build the policy a tier table describes for the given deployment mode.
    pub fn from_tier(tier: &TierConfig, environment: Environment) -> Self {
        let mut policy = Policy::new(tier.window(), tier.max_for(environment));
        policy.skip_successful = tier.skip_successful;
        policy.skip_failed = tier.skip_failed;

        if tier.key == KeyStrategy::ClientIpAndPath {
            policy.key_fn = Arc::new(|req: &Request<Body>| {
                format!("{}:{}", client_ip_of(req), req.uri().path())
            });
        }

        if environment == Environment::Development && !tier.skip_paths_in_development.is_empty() {
            let prefixes = tier.skip_paths_in_development.clone();
            policy.skip_fn = Some(Arc::new(move |req: &Request<Body>| {
                let path = req.uri().path();
                prefixes.iter().any(|p| path.starts_with(p.as_str()))
            }));
        }
        policy
    }
}

impl fmt::Debug for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Policy")
            .field("window", &self.window)
            .field("max", &self.max)
            .field("skip_successful", &self.skip_successful)
            .field("skip_failed", &self.skip_failed)
            .field("has_skip_fn", &self.skip_fn.is_some())
            .finish()
    }
}

/// A counted hit that may still be taken back.
#[derive(Debug, Clone)]
pub struct Hit {
    key: String,
    window_start: Instant,
}

/// Outcome of checking a key against the tier.
#[derive(Debug, Clone)]
pub enum Decision {
    Allow {
        limit: u32,
        remaining: u32,
        reset_after: Duration,
        hit: Hit,
    },
    Reject {
        retry_after_secs: u64,
    },
}

/// One tier's limiter.
pub struct RateLimiter {
    tier: Tier,
    policy: Policy,
    store: Arc<dyn CounterStore>,
    audit: AuditLogger,
}

impl RateLimiter {
    pub fn new(tier: Tier, policy: Policy, audit: AuditLogger) -> Self {
        Self::with_store(tier, policy, Arc::new(InMemoryCounterStore::new()), audit)
    }

    pub fn with_store(
        tier: Tier,
        policy: Policy,
        store: Arc<dyn CounterStore>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            tier,
            policy,
            store,
            audit,
        }
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    pub fn should_skip(&self, req: &Request<Body>) -> bool {
        self.policy.skip_fn.as_ref().is_some_and(|skip| skip(req))
    }

    pub fn key_for(&self, req: &Request<Body>) -> String {
        (self.policy.key_fn)(req)
    }

    /// Count a hit for `key` and decide.
    pub fn check(&self, key: &str) -> Decision {
        let snapshot = self.store.increment(key, self.policy.window);
        let reset_after = snapshot.remaining(Instant::now());

        if snapshot.count > self.policy.max {
            Decision::Reject {
                retry_after_secs: ceil_secs(reset_after),
            }
        } else {
            Decision::Allow {
                limit: self.policy.max,
                remaining: self.policy.max - snapshot.count,
                reset_after,
                hit: Hit {
                    key: key.to_string(),
                    window_start: snapshot.window_start,
                },
            }
        }
    }

    /// Apply the skip rules to a finished request.
    pub fn settle(&self, hit: &Hit, succeeded: bool) {
        let uncount = (succeeded && self.policy.skip_successful)
            || (!succeeded && self.policy.skip_failed);
        if uncount {
            self.store.decrement(&hit.key, hit.window_start);
        }
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("tier", &self.tier)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let secs = d.as_secs();
    if d.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

/// Settles a hit exactly once. Dropped without a response, the request is
/// treated as failed.
struct PendingHit<'a> {
    limiter: &'a RateLimiter,
    hit: Option<Hit>,
}

impl<'a> PendingHit<'a> {
    fn new(limiter: &'a RateLimiter, hit: Hit) -> Self {
        Self {
            limiter,
            hit: Some(hit),
        }
    }

    fn complete(mut self, succeeded: bool) {
        if let Some(hit) = self.hit.take() {
            self.limiter.settle(&hit, succeeded);
        }
    }
}

impl Drop for PendingHit<'_> {
    fn drop(&mut self) {
        if let Some(hit) = self.hit.take() {
            self.limiter.settle(&hit, false);
        }
    }
}

/// Middleware applying one tier to a route group.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if limiter.should_skip(&request) {
        return next.run(request).await;
    }

    let key = limiter.key_for(&request);
    match limiter.check(&key) {
        Decision::Reject { retry_after_secs } => {
            tracing::warn!(
                client = %key,
                tier = %limiter.tier,
                retry_after_secs,
                "Rate limit exceeded"
            );
            metrics::record_rate_limited(limiter.tier.as_str());
            limiter.audit.record(SecurityEvent::new(
                SecurityEventKind::RateLimitExceeded,
                client_ip_of(&request),
                request.method().as_str(),
                request.uri().path(),
                EventOutcome::Rejected,
                format!("tier={} key={}", limiter.tier, key),
            ));
            Rejection::rate_limited(retry_after_secs).into_response()
        }
        Decision::Allow {
            limit,
            remaining,
            reset_after,
            hit,
        } => {
            let pending = PendingHit::new(&limiter, hit);
            let mut response = next.run(request).await;
            pending.complete(response.status().as_u16() < 400);

            let headers = response.headers_mut();
            headers.insert(RATELIMIT_LIMIT, HeaderValue::from(limit));
            headers.insert(RATELIMIT_REMAINING, HeaderValue::from(remaining));
            headers.insert(RATELIMIT_RESET, HeaderValue::from(ceil_secs(reset_after)));
            response
        }
    }
}
