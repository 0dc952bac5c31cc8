//! Runs the tiered limiter before any handler.
//!
//! On acceptance the request continues down the chain and the response is
//! decorated with the rate-limit headers. On rejection the chain is
//! short-circuited with a `429 Too Many Requests` carrying the same headers.

use std::pin::Pin;
use std::sync::Arc;

use crate::{
    Response,
    api::ApiError,
    context::Context,
    middleware::{Middleware, Next},
};

use super::TieredRateLimiter;

/// Middleware wrapper around a shared [`TieredRateLimiter`].
///
/// The client identifier is the peer IP address, or `"unknown"` when the
/// request did not come off a socket.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use cartd::middleware::{Pipeline, LoggerMiddleware};
/// use cartd::security::{RateLimitConfig, RateLimitMiddleware, TieredRateLimiter};
/// use cartd::{Response, StatusCode};
///
/// let limiter = Arc::new(TieredRateLimiter::new("/api", RateLimitConfig::default()).unwrap());
/// let pipeline = Pipeline::new(|_ctx| async { Response::new(StatusCode::Ok) })
///     .layer(Arc::new(LoggerMiddleware))
///     .layer(Arc::new(RateLimitMiddleware::new(limiter)));
/// ```
pub struct RateLimitMiddleware {
    limiter: Arc<TieredRateLimiter>,
}

impl RateLimitMiddleware {
    pub fn new(limiter: Arc<TieredRateLimiter>) -> Self {
        Self { limiter }
    }
}

impl Middleware for RateLimitMiddleware {
    /// Evaluate the limiter, then either forward or short-circuit.
    ///
    /// # Returns
    ///
    /// The downstream response with rate-limit headers, or a `429` built by
    /// [`ApiError::into_response`] when a tier rejects the request.
    fn handle(&self, ctx: Context, next: Next) -> Pin<Box<dyn Future<Output = Response> + Send>> {
        let limiter = Arc::clone(&self.limiter);

        Box::pin(async move {
            let request = ctx.request();
            let client = request.client_id();
            let verdict = limiter.evaluate(request.method(), request.path(), &client);

            match verdict {
                Ok(report) => {
                    let mut response = next.run(ctx).await;
                    report.apply(&mut response);
                    response
                }
                Err(exceeded) => ApiError::from(exceeded).into_response(),
            }
        })
    }
}
