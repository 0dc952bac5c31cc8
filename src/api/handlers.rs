//! Cart endpoint handlers.
//!
//! Reads go through the [`CartCache`](crate::cache::CartCache); writes save
//! through the repository and evict the affected cache entries before the
//! response is built. Item writes run under the cart's lock from load to
//! eviction.

use std::sync::Arc;

use bytes::Bytes;
use tracing::info;
use uuid::Uuid;

use super::errors::ApiError;
use super::payload;
use super::AppState;
use crate::cart::{Cart, CartDetail, CartSummary};
use crate::context::Context;
use crate::error::CartError;
use crate::http::{Response, StatusCode};

/// Largest page size a list request may ask for; also the default.
pub const MAX_PAGE_LIMIT: u32 = 9999;

type HandlerResult = Result<Response, ApiError>;

/// `GET /carts`: one page of carts, summaries or (with `expand=items`) details.
pub async fn list_carts(state: Arc<AppState>, ctx: Context) -> HandlerResult {
    let request = ctx.request();
    let page = positive_query(request.query_param("page"), "page")?.unwrap_or(1);
    let limit = positive_query(request.query_param("limit"), "limit")?
        .unwrap_or(MAX_PAGE_LIMIT)
        .min(MAX_PAGE_LIMIT);
    let expanded = request.query_param("expand") == Some("items");

    let body = state
        .cache
        .get_cart_list(page, limit, expanded, || async {
            let carts = state.carts.list().await?;
            let skip = (page as usize - 1).saturating_mul(limit as usize);
            let page_of = carts.iter().skip(skip).take(limit as usize);

            let body = if expanded {
                serde_json::to_vec(&page_of.map(Cart::to_detail).collect::<Vec<CartDetail>>())?
            } else {
                serde_json::to_vec(&page_of.map(Cart::to_summary).collect::<Vec<CartSummary>>())?
            };
            Ok::<_, ApiError>(Bytes::from(body))
        })
        .await?;

    Ok(Response::json_bytes(StatusCode::Ok, body.to_vec()))
}

/// `POST /carts`: creates an empty cart.
pub async fn create_cart(state: Arc<AppState>, _ctx: Context) -> HandlerResult {
    let cart = Cart::new();
    state.carts.save(&cart).await?;
    state.cache.invalidate_all_lists();

    info!(cart = %cart.id(), "cart created");
    Ok(Response::json(StatusCode::Created, &cart.to_detail()))
}

/// `GET /carts/:id`
pub async fn show_cart(state: Arc<AppState>, ctx: Context) -> HandlerResult {
    let cart_id = cart_id(&ctx)?;
    let key = cart_id.to_string();

    let body = state
        .cache
        .get_cart(&key, || async {
            let cart = find_cart(&state, cart_id).await?;
            Ok::<_, ApiError>(Bytes::from(serde_json::to_vec(&cart.to_detail())?))
        })
        .await?;

    Ok(Response::json_bytes(StatusCode::Ok, body.to_vec()))
}

/// `POST /carts/:id/items`: answers with the whole cart.
pub async fn add_item(state: Arc<AppState>, ctx: Context) -> HandlerResult {
    let cart_id = cart_id(&ctx)?;
    let _lock = state.cart_locks.acquire(cart_id).await;
    let mut cart = find_cart(&state, cart_id).await?;
    let body = payload::decode_object(ctx.request().body(), true)?;
    let new_item = payload::new_cart_item(&body)?;

    let item_id = cart.add_item(new_item)?.id();
    state.carts.save(&cart).await?;
    state.cache.invalidate_cart(&cart.id().to_string());

    info!(cart = %cart.id(), item = %item_id, "item added");
    Ok(Response::json(StatusCode::Created, &cart.to_detail()))
}

/// `PATCH /carts/:id/items/:item_id`: answers with the updated item.
pub async fn update_item(state: Arc<AppState>, ctx: Context) -> HandlerResult {
    let cart_id = cart_id(&ctx)?;
    let _lock = state.cart_locks.acquire(cart_id).await;
    let mut cart = find_cart(&state, cart_id).await?;
    let body = payload::decode_object(ctx.request().body(), false)?;
    let quantity = payload::quantity(&body)?;
    if quantity <= 0 {
        return Err(CartError::invalid_quantity().into());
    }

    let item_id = item_id(&ctx)?;
    let view = cart.set_item_quantity(item_id, quantity)?.to_view();
    state.carts.save(&cart).await?;
    state.cache.invalidate_cart(&cart.id().to_string());

    info!(cart = %cart.id(), item = %item_id, quantity, "item quantity updated");
    Ok(Response::json(StatusCode::Ok, &view))
}

/// `DELETE /carts/:id/items/:item_id`
pub async fn remove_item(state: Arc<AppState>, ctx: Context) -> HandlerResult {
    let cart_id = cart_id(&ctx)?;
    let _lock = state.cart_locks.acquire(cart_id).await;
    let mut cart = find_cart(&state, cart_id).await?;
    let item_id = item_id(&ctx)?;

    cart.remove_item(item_id)?;
    state.carts.save(&cart).await?;
    state.cache.invalidate_cart(&cart.id().to_string());

    info!(cart = %cart.id(), item = %item_id, "item removed");
    Ok(Response::new(StatusCode::NoContent))
}

/// Fallback for paths no route matches.
pub async fn not_found(_ctx: Context) -> Response {
    ApiError::RouteNotFound.into_response()
}

async fn find_cart(state: &AppState, id: Uuid) -> Result<Cart, ApiError> {
    state
        .carts
        .find(id)
        .await?
        .ok_or_else(|| CartError::CartNotFound { cart_id: id.to_string() }.into())
}

// An id that is not a UUID cannot name a stored cart.
fn cart_id(ctx: &Context) -> Result<Uuid, ApiError> {
    let raw = ctx.param("id").unwrap_or_default();
    Uuid::parse_str(raw).map_err(|_| {
        CartError::CartNotFound {
            cart_id: raw.to_owned(),
        }
        .into()
    })
}

fn item_id(ctx: &Context) -> Result<Uuid, ApiError> {
    let raw = ctx.param("item_id").unwrap_or_default();
    Uuid::parse_str(raw).map_err(|_| {
        CartError::ItemNotFound {
            item_id: raw.to_owned(),
        }
        .into()
    })
}

fn positive_query(raw: Option<&str>, name: &str) -> Result<Option<u32>, ApiError> {
    match raw {
        None => Ok(None),
        Some(raw) => raw
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("{name} must be a positive integer"))),
    }
}
