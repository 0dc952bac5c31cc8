//! Tiered token-bucket rate limiting.
//!
//! Each [`Tier`] keeps one token bucket per client identifier. For a request,
//! the applicable tiers are consulted in a fixed order:
//!
//! 1. [`Tier::Global`]: every request under the API prefix.
//! 2. [`Tier::Read`]: `GET`, `HEAD`, `OPTIONS`.
//! 3. [`Tier::Write`]: every other method.
//! 4. [`Tier::CartModify`]: mutating requests to `<prefix>/carts/{id}/items…`.
//!
//! Consumption stops at the first rejection. Tokens already taken from earlier
//! tiers are not returned. Headers are always derived from the first recorded
//! tier outcome, including when a later tier rejected the request.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regex::Regex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::http::{Method, Response};

pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";
pub const HEADER_RETRY_AFTER: &str = "Retry-After";

/// One independent family of buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Global,
    Read,
    Write,
    CartModify,
}

impl Tier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Global => "global",
            Self::Read => "read",
            Self::Write => "write",
            Self::CartModify => "cart_modify",
        }
    }

    fn rejection_message(self) -> &'static str {
        match self {
            Self::Global => "API rate limit exceeded. Please try again later.",
            Self::Read => "Read API rate limit exceeded. Please try again later.",
            Self::Write => "Write API rate limit exceeded. Please try again later.",
            Self::CartModify => "Cart modification rate limit exceeded. Please slow down.",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket shape for one tier.
///
/// A bucket holds at most `limit` tokens and earns `limit` tokens back evenly
/// over `interval`. A zero `interval` disables refill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierPolicy {
    pub limit: u32,
    pub interval: Duration,
}

impl TierPolicy {
    pub const fn new(limit: u32, interval: Duration) -> Self {
        Self { limit, interval }
    }

    /// A bucket that never refills.
    pub const fn fixed(limit: u32) -> Self {
        Self::new(limit, Duration::ZERO)
    }

    // Time to earn a single token, if the bucket refills at all.
    fn per_token(&self) -> Option<Duration> {
        if self.limit == 0 || self.interval.is_zero() {
            None
        } else {
            Some(self.interval / self.limit)
        }
    }
}

/// Policies for all four tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub global: TierPolicy,
    pub read: TierPolicy,
    pub write: TierPolicy,
    pub cart_modify: TierPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let minute = Duration::from_secs(60);
        Self {
            global: TierPolicy::new(100, minute),
            read: TierPolicy::new(60, minute),
            write: TierPolicy::new(30, minute),
            cart_modify: TierPolicy::new(20, minute),
        }
    }
}

impl RateLimitConfig {
    pub fn policy(&self, tier: Tier) -> TierPolicy {
        match tier {
            Tier::Global => self.global,
            Tier::Read => self.read,
            Tier::Write => self.write,
            Tier::CartModify => self.cart_modify,
        }
    }
}

/// Result of consuming one token from one tier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierOutcome {
    pub tier: Tier,
    pub accepted: bool,
    /// Tokens left after this consumption.
    pub remaining: u32,
    pub limit: u32,
    /// When the next token is available. `None` if the bucket never refills
    /// and is empty.
    pub reset_at: Option<DateTime<Utc>>,
}

/// Every tier outcome recorded for one request, in consultation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitReport {
    outcomes: Vec<TierOutcome>,
}

impl RateLimitReport {
    pub fn outcomes(&self) -> &[TierOutcome] {
        &self.outcomes
    }

    /// Tiers consulted, in order.
    pub fn tiers(&self) -> Vec<Tier> {
        self.outcomes.iter().map(|o| o.tier).collect()
    }

    /// The outcome the response headers are derived from: the first one.
    pub fn headline(&self) -> Option<&TierOutcome> {
        self.outcomes.first()
    }

    /// Rate-limit headers as `(name, value)` pairs; empty when no tier applied.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let Some(outcome) = self.headline() else {
            return Vec::new();
        };

        let mut headers = vec![
            (HEADER_REMAINING, outcome.remaining.to_string()),
            (HEADER_LIMIT, outcome.limit.to_string()),
        ];
        if let Some(reset_at) = outcome.reset_at {
            let epoch = reset_at.timestamp().to_string();
            headers.push((HEADER_RESET, epoch.clone()));
            headers.push((HEADER_RETRY_AFTER, epoch));
        }
        headers
    }

    /// Sets the rate-limit headers on `response`, replacing existing values.
    pub fn apply(&self, response: &mut Response) {
        for (name, value) in self.headers() {
            response.set_header(name, value);
        }
    }
}

/// A tier rejected the request.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RateLimitExceeded {
    pub tier: Tier,
    pub message: String,
    /// Outcomes recorded up to and including the rejection.
    pub report: RateLimitReport,
}

impl RateLimitExceeded {
    /// The rejecting tier's own outcome.
    pub fn rejection(&self) -> Option<&TierOutcome> {
        self.report.outcomes.iter().find(|o| !o.accepted)
    }
}

#[derive(Debug, Clone, Copy)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(policy: &TierPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.limit,
            last_refill: now,
        }
    }

    fn refill(&mut self, policy: &TierPolicy, now: Instant) {
        let Some(per_token) = policy.per_token() else {
            return;
        };
        if self.tokens >= policy.limit {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let earned = elapsed.as_nanos() / per_token.as_nanos().max(1);
        if earned == 0 {
            return;
        }

        let missing = u128::from(policy.limit - self.tokens);
        if earned >= missing {
            self.tokens = policy.limit;
            self.last_refill = now;
        } else {
            // `earned < missing <= u32::MAX`
            let earned = earned as u32;
            self.tokens += earned;
            self.last_refill += per_token * earned;
        }
    }

    // Time until one more token is earned.
    fn next_token_in(&self, policy: &TierPolicy, now: Instant) -> Option<Duration> {
        if self.tokens > 0 {
            return Some(Duration::ZERO);
        }
        let per_token = policy.per_token()?;
        let since = now.saturating_duration_since(self.last_refill);
        Some(per_token.saturating_sub(since))
    }
}

// One tier's buckets, keyed by client identifier.
#[derive(Debug)]
struct TierLimiter {
    tier: Tier,
    policy: TierPolicy,
    buckets: DashMap<String, TokenBucket>,
}

impl TierLimiter {
    fn new(tier: Tier, policy: TierPolicy) -> Self {
        Self {
            tier,
            policy,
            buckets: DashMap::new(),
        }
    }

    // The bucket stays locked from refill through consumption.
    fn consume(&self, client: &str) -> TierOutcome {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(client.to_owned())
            .or_insert_with(|| TokenBucket::full(&self.policy, now));

        bucket.refill(&self.policy, now);
        let accepted = bucket.tokens > 0;
        if accepted {
            bucket.tokens -= 1;
        }

        let reset_at = bucket
            .next_token_in(&self.policy, now)
            .and_then(|wait| chrono::Duration::from_std(wait).ok())
            .map(|wait| Utc::now() + wait);

        TierOutcome {
            tier: self.tier,
            accepted,
            remaining: bucket.tokens,
            limit: self.policy.limit,
            reset_at,
        }
    }

    // A bucket that has refilled completely is indistinguishable from the one
    // a first request would create, so it can go.
    fn prune_full(&self, now: Instant) -> usize {
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            bucket.refill(&self.policy, now);
            bucket.tokens < self.policy.limit
        });
        before.saturating_sub(self.buckets.len())
    }
}

/// The four-tier limiter.
///
/// # Examples
///
/// ```
/// use cartd::http::Method;
/// use cartd::security::{RateLimitConfig, Tier, TieredRateLimiter};
///
/// let limiter = TieredRateLimiter::new("/api", RateLimitConfig::default()).unwrap();
/// let report = limiter
///     .evaluate(&Method::Post, "/api/carts/42/items", "10.0.0.1")
///     .unwrap();
/// assert_eq!(report.tiers(), vec![Tier::Global, Tier::Write, Tier::CartModify]);
/// ```
#[derive(Debug)]
pub struct TieredRateLimiter {
    scope: String,
    cart_items: Regex,
    global: TierLimiter,
    read: TierLimiter,
    write: TierLimiter,
    cart_modify: TierLimiter,
}

impl TieredRateLimiter {
    /// Builds a limiter for requests under `api_prefix` (e.g. `/api`).
    ///
    /// # Errors
    ///
    /// Returns the regex error if the prefix produces an invalid pattern.
    pub fn new(api_prefix: &str, config: RateLimitConfig) -> Result<Self, regex::Error> {
        let prefix = api_prefix.trim_end_matches('/');
        let cart_items = Regex::new(&format!(
            "^{}/carts/[^/]+/items",
            regex::escape(prefix)
        ))?;

        Ok(Self {
            scope: format!("{prefix}/"),
            cart_items,
            global: TierLimiter::new(Tier::Global, config.global),
            read: TierLimiter::new(Tier::Read, config.read),
            write: TierLimiter::new(Tier::Write, config.write),
            cart_modify: TierLimiter::new(Tier::CartModify, config.cart_modify),
        })
    }

    /// Tiers that apply to a request, in consultation order.
    pub fn applicable_tiers(&self, method: &Method, path: &str) -> Vec<Tier> {
        if !path.starts_with(&self.scope) {
            return Vec::new();
        }

        let mut tiers = vec![Tier::Global];
        tiers.push(if method.is_read() { Tier::Read } else { Tier::Write });
        if method.is_mutating() && self.cart_items.is_match(path) {
            tiers.push(Tier::CartModify);
        }
        tiers
    }

    /// Consumes one token per applicable tier for `client`.
    ///
    /// # Errors
    ///
    /// [`RateLimitExceeded`] naming the first tier whose bucket was empty. Later
    /// tiers are not consulted.
    pub fn evaluate(
        &self,
        method: &Method,
        path: &str,
        client: &str,
    ) -> Result<RateLimitReport, RateLimitExceeded> {
        let mut report = RateLimitReport::default();

        for tier in self.applicable_tiers(method, path) {
            let outcome = self.limiter(tier).consume(client);
            let accepted = outcome.accepted;
            report.outcomes.push(outcome);

            if !accepted {
                warn!(tier = %tier, client, %method, path, "rate limit exceeded");
                return Err(RateLimitExceeded {
                    tier,
                    message: tier.rejection_message().to_owned(),
                    report,
                });
            }
        }

        debug!(client, tiers = report.outcomes.len(), "rate limit passed");
        Ok(report)
    }

    /// Forgets every client bucket that is full again and returns how many
    /// went. Buckets that never refill are kept once used.
    pub fn prune_idle(&self) -> usize {
        let now = Instant::now();
        let pruned: usize = [&self.global, &self.read, &self.write, &self.cart_modify]
            .into_iter()
            .map(|limiter| limiter.prune_full(now))
            .sum();
        if pruned > 0 {
            debug!(pruned, "idle rate-limit buckets pruned");
        }
        pruned
    }

    /// Number of client buckets held across all tiers.
    pub fn bucket_count(&self) -> usize {
        [&self.global, &self.read, &self.write, &self.cart_modify]
            .into_iter()
            .map(|limiter| limiter.buckets.len())
            .sum()
    }

    fn limiter(&self, tier: Tier) -> &TierLimiter {
        match tier {
            Tier::Global => &self.global,
            Tier::Read => &self.read,
            Tier::Write => &self.write,
            Tier::CartModify => &self.cart_modify,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn roomy() -> TierPolicy {
        TierPolicy::fixed(1_000)
    }

    fn config(global: TierPolicy, read: TierPolicy, write: TierPolicy, cart: TierPolicy) -> RateLimitConfig {
        RateLimitConfig {
            global,
            read,
            write,
            cart_modify: cart,
        }
    }

    fn limiter(config: RateLimitConfig) -> TieredRateLimiter {
        TieredRateLimiter::new("/api", config).unwrap()
    }

    #[test]
    fn sixth_request_on_five_token_bucket_is_rejected() {
        let limiter = limiter(config(TierPolicy::fixed(5), roomy(), roomy(), roomy()));

        for expected in (0..5).rev() {
            let report = limiter.evaluate(&Method::Get, "/api/carts", "1.2.3.4").unwrap();
            assert_eq!(report.headline().unwrap().remaining, expected);
        }

        let err = limiter
            .evaluate(&Method::Get, "/api/carts", "1.2.3.4")
            .unwrap_err();
        assert_eq!(err.tier, Tier::Global);
        assert_eq!(err.message, "API rate limit exceeded. Please try again later.");
        let rejected = err.rejection().unwrap();
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.limit, 5);
        assert!(rejected.reset_at.is_none());
    }

    #[test]
    fn write_to_items_consults_three_tiers() {
        let limiter = limiter(RateLimitConfig::default());
        let report = limiter
            .evaluate(&Method::Post, "/api/carts/abc/items", "c")
            .unwrap();
        assert_eq!(report.tiers(), vec![Tier::Global, Tier::Write, Tier::CartModify]);

        let report = limiter
            .evaluate(&Method::Delete, "/api/carts/abc/items/xyz", "c")
            .unwrap();
        assert_eq!(report.tiers(), vec![Tier::Global, Tier::Write, Tier::CartModify]);
    }

    #[test]
    fn read_of_cart_consults_global_and_read() {
        let limiter = limiter(RateLimitConfig::default());
        let report = limiter.evaluate(&Method::Get, "/api/carts/abc", "c").unwrap();
        assert_eq!(report.tiers(), vec![Tier::Global, Tier::Read]);

        let report = limiter
            .evaluate(&Method::Get, "/api/carts/abc/items", "c")
            .unwrap();
        assert_eq!(report.tiers(), vec![Tier::Global, Tier::Read]);
    }

    #[test]
    fn cart_creation_is_a_plain_write() {
        let limiter = limiter(RateLimitConfig::default());
        assert_eq!(
            limiter.applicable_tiers(&Method::Post, "/api/carts"),
            vec![Tier::Global, Tier::Write]
        );
    }

    #[test]
    fn paths_outside_prefix_are_exempt() {
        let limiter = limiter(config(TierPolicy::fixed(0), roomy(), roomy(), roomy()));
        let report = limiter.evaluate(&Method::Get, "/health", "c").unwrap();
        assert!(report.outcomes().is_empty());
        assert!(report.headers().is_empty());
        assert!(limiter.applicable_tiers(&Method::Get, "/api").is_empty());
        assert!(limiter.applicable_tiers(&Method::Get, "/apiary/x").is_empty());
    }

    #[test]
    fn clients_have_independent_buckets() {
        let limiter = limiter(config(TierPolicy::fixed(1), roomy(), roomy(), roomy()));
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "a").is_ok());
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "b").is_ok());
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "a").is_err());
    }

    #[test]
    fn later_rejection_keeps_earlier_consumption_and_stops() {
        let limiter = limiter(config(
            TierPolicy::fixed(10),
            roomy(),
            TierPolicy::fixed(0),
            TierPolicy::fixed(10),
        ));

        let err = limiter
            .evaluate(&Method::Patch, "/api/carts/a/items/b", "c")
            .unwrap_err();
        assert_eq!(err.tier, Tier::Write);
        assert_eq!(err.report.tiers(), vec![Tier::Global, Tier::Write]);

        // headers still come from the global outcome
        let headers = err.report.headers();
        assert_eq!(headers[0], (HEADER_REMAINING, "9".to_owned()));
        assert_eq!(headers[1], (HEADER_LIMIT, "10".to_owned()));

        // global token was spent, cart tier untouched
        let report = limiter.evaluate(&Method::Get, "/api/carts", "c").unwrap();
        assert_eq!(report.headline().unwrap().remaining, 8);
        assert!(limiter.cart_modify.buckets.is_empty());
    }

    #[test]
    fn accepted_outcome_resets_now_and_emits_all_headers() {
        let limiter = limiter(RateLimitConfig::default());
        let before = Utc::now().timestamp();
        let report = limiter.evaluate(&Method::Get, "/api/carts", "c").unwrap();

        let headers = report.headers();
        let names: Vec<_> = headers.iter().map(|(n, _)| *n).collect();
        assert_eq!(
            names,
            vec![HEADER_REMAINING, HEADER_LIMIT, HEADER_RESET, HEADER_RETRY_AFTER]
        );
        assert_eq!(headers[0].1, "99");
        assert_eq!(headers[1].1, "100");
        assert_eq!(headers[2].1, headers[3].1);
        assert!(headers[2].1.parse::<i64>().unwrap() >= before);
    }

    #[tokio::test(start_paused = true)]
    async fn buckets_refill_over_time() {
        let limiter = limiter(config(
            TierPolicy::new(2, Duration::from_secs(10)),
            roomy(),
            roomy(),
            roomy(),
        ));

        assert!(limiter.evaluate(&Method::Get, "/api/carts", "c").is_ok());
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "c").is_ok());
        let err = limiter.evaluate(&Method::Get, "/api/carts", "c").unwrap_err();
        assert!(err.rejection().unwrap().reset_at.is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        let report = limiter.evaluate(&Method::Get, "/api/carts", "c").unwrap();
        assert_eq!(report.headline().unwrap().remaining, 0);
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "c").is_err());

        tokio::time::advance(Duration::from_secs(60)).await;
        let report = limiter.evaluate(&Method::Get, "/api/carts", "c").unwrap();
        assert_eq!(report.headline().unwrap().remaining, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn refilled_buckets_are_pruned_and_used_ones_kept() {
        let limiter = limiter(config(
            TierPolicy::new(2, Duration::from_secs(10)),
            TierPolicy::fixed(2),
            roomy(),
            roomy(),
        ));

        assert!(limiter.evaluate(&Method::Get, "/api/carts", "a").is_ok());
        assert_eq!(limiter.bucket_count(), 2);
        assert_eq!(limiter.prune_idle(), 0);

        tokio::time::advance(Duration::from_secs(10)).await;
        // The global bucket is full again; the read tier never refills.
        assert_eq!(limiter.prune_idle(), 1);
        assert_eq!(limiter.bucket_count(), 1);

        let report = limiter.evaluate(&Method::Get, "/api/carts", "a").unwrap();
        assert_eq!(report.headline().unwrap().remaining, 1);
        assert!(limiter.evaluate(&Method::Get, "/api/carts", "a").is_err());
    }

    #[test]
    fn concurrent_consumers_never_exceed_capacity() {
        let limiter = Arc::new(limiter(config(
            TierPolicy::fixed(50),
            roomy(),
            roomy(),
            roomy(),
        )));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| limiter.evaluate(&Method::Get, "/api/carts", "same").is_ok())
                        .count()
                })
            })
            .collect();

        let accepted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(accepted, 50);
    }
}
