//! Request admission control.
//!
//! - [`TieredRateLimiter`]: per-client token buckets across four tiers.
//! - [`RateLimitMiddleware`]: applies the limiter in the middleware chain and
//!   writes the `X-RateLimit-*` / `Retry-After` headers.

mod middleware;
mod rate_limit;

pub use middleware::RateLimitMiddleware;
pub use rate_limit::{
    HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, HEADER_RETRY_AFTER, RateLimitConfig,
    RateLimitExceeded, RateLimitReport, Tier, TierOutcome, TierPolicy, TieredRateLimiter,
};
