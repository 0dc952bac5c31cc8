//! Domain errors raised by the cart aggregate.
//!
//! These carry no HTTP knowledge. Translation to status codes and wire bodies
//! happens at the boundary in [`crate::api::ApiError`].

use thiserror::Error;

/// A single rejected field on a [`NewCartItem`](crate::cart::NewCartItem).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Payload field name in wire casing, e.g. `productId`.
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

impl Violation {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors produced by cart and cart-item operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart not found")]
    CartNotFound { cart_id: String },

    #[error("Item not found")]
    ItemNotFound { item_id: String },

    /// Item construction rejected one or more fields.
    #[error("Validation failed")]
    InvalidItem { violations: Vec<Violation> },

    #[error("{message}")]
    InvalidQuantity { message: String },
}

impl CartError {
    pub(crate) fn invalid_quantity() -> Self {
        Self::InvalidQuantity {
            message: "Quantity must be greater than 0".to_owned(),
        }
    }
}
