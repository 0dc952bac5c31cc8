//! The cart HTTP API: route table, shared state, and the default pipeline.
//!
//! | Method | Path                                   | Handler                        |
//! |--------|----------------------------------------|--------------------------------|
//! | GET    | `<prefix>/carts`                       | [`handlers::list_carts`]       |
//! | POST   | `<prefix>/carts`                       | [`handlers::create_cart`]      |
//! | GET    | `<prefix>/carts/:id`                   | [`handlers::show_cart`]        |
//! | POST   | `<prefix>/carts/:id/items`             | [`handlers::add_item`]         |
//! | PATCH  | `<prefix>/carts/:id/items/:item_id`    | [`handlers::update_item`]      |
//! | DELETE | `<prefix>/carts/:id/items/:item_id`    | [`handlers::remove_item`]      |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::CartCache;
use crate::config::AppConfig;
use crate::context::Context;
use crate::database::{CartLocks, CartRepository, InMemoryCartRepository};
use crate::middleware::{LoggerMiddleware, Pipeline};
use crate::router::{IntoHandler, Router};
use crate::security::{RateLimitMiddleware, TieredRateLimiter};
use crate::Response;

mod errors;
pub mod handlers;
pub mod payload;
mod sweeper;

pub use errors::{ApiError, TypeMismatch};
pub use sweeper::{SweepReport, spawn_sweeper, sweep};

/// What every handler shares.
pub struct AppState {
    pub carts: Arc<dyn CartRepository>,
    pub cache: CartCache,
    /// Serializes item writes per cart.
    pub cart_locks: CartLocks,
}

impl AppState {
    pub fn new(carts: Arc<dyn CartRepository>, cache_ttl: Duration) -> Self {
        Self {
            carts,
            cache: CartCache::new(cache_ttl),
            cart_locks: CartLocks::new(),
        }
    }

    /// State over a fresh [`InMemoryCartRepository`].
    pub fn in_memory(cache_ttl: Duration) -> Self {
        Self::new(Arc::new(InMemoryCartRepository::new()), cache_ttl)
    }
}

/// Registers the cart routes under `prefix` (e.g. `/api`).
pub fn router(prefix: &str, state: &Arc<AppState>) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let carts = format!("{prefix}/carts");
    let cart = format!("{carts}/:id");
    let items = format!("{cart}/items");
    let item = format!("{items}/:item_id");

    let mut router = Router::new();
    router.get(&carts, with_state(state, handlers::list_carts));
    router.post(&carts, with_state(state, handlers::create_cart));
    router.get(&cart, with_state(state, handlers::show_cart));
    router.post(&items, with_state(state, handlers::add_item));
    router.patch(&item, with_state(state, handlers::update_item));
    router.delete(&item, with_state(state, handlers::remove_item));
    router.fallback(handlers::not_found);
    router
}

/// The full request path: logging, then rate limiting, then the router.
///
/// # Errors
///
/// Returns the regex error if the configured prefix cannot be compiled into
/// the cart-items matcher.
pub fn pipeline(config: &AppConfig, state: Arc<AppState>) -> Result<Pipeline, regex::Error> {
    let limiter = Arc::new(TieredRateLimiter::new(&config.api_prefix, config.rate_limits)?);
    Ok(pipeline_with_limiter(&config.api_prefix, state, limiter))
}

/// [`pipeline`] over a caller-owned limiter, so the sweeper can prune it.
pub fn pipeline_with_limiter(
    prefix: &str,
    state: Arc<AppState>,
    limiter: Arc<TieredRateLimiter>,
) -> Pipeline {
    let router = Arc::new(router(prefix, &state));

    let endpoint = move |ctx: Context| {
        let router = Arc::clone(&router);
        async move { router.dispatch(ctx).await }
    };

    Pipeline::new(endpoint)
        .layer(Arc::new(LoggerMiddleware))
        .layer(Arc::new(RateLimitMiddleware::new(limiter)))
}

// Binds shared state to a fallible handler and renders its error.
fn with_state<H, F>(state: &Arc<AppState>, handler: H) -> impl IntoHandler
where
    H: Fn(Arc<AppState>, Context) -> F + Send + Sync + 'static,
    F: Future<Output = Result<Response, ApiError>> + Send + 'static,
{
    let state = Arc::clone(state);
    move |ctx: Context| {
        let outcome = handler(Arc::clone(&state), ctx);
        async move { outcome.await.unwrap_or_else(ApiError::into_response) }
    }
}
