//! Cart aggregate: a cart and the line items it owns.
//!
//! A [`Cart`] exclusively owns its [`CartItem`]s in insertion order. Items keep
//! only the owning cart's id, so there is no reference cycle and an item can
//! never be moved to another cart.
//!
//! Money uses [`BigDecimal`]: prices are rounded to two decimals when an item
//! is created, subtotals are exact products, and the cart total is the exact
//! sum of subtotals. Totals are derived on every call and never stored.
//!
//! ```
//! use std::str::FromStr;
//! use bigdecimal::BigDecimal;
//! use cartd::cart::{Cart, NewCartItem};
//!
//! let mut cart = Cart::new();
//! let price = BigDecimal::from_str("999.99").unwrap();
//! let item_id = cart.add_item(NewCartItem::new(123, "Laptop", price, 2)).unwrap().id();
//! assert_eq!(cart.total(), BigDecimal::from_str("1999.98").unwrap());
//!
//! cart.set_item_quantity(item_id, 5).unwrap();
//! assert_eq!(cart.total(), BigDecimal::from_str("4999.95").unwrap());
//! ```

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::error::CartError;

mod item;
mod view;

pub use item::{CartItem, MAX_TEXT_LEN, NewCartItem, PRICE_SCALE};
pub use view::{CartDetail, CartItemView, CartSummary, format_money};

/// The cart aggregate root.
#[derive(Debug, Clone, PartialEq)]
pub struct Cart {
    id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    items: Vec<CartItem>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    /// Creates an empty cart with a fresh id, stamped `created_at = now`.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: None,
            items: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Items in insertion order.
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Validates `new_item`, builds a [`CartItem`] owned by this cart, and
    /// appends it.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidItem`] when any field fails validation. The cart is
    /// left untouched in that case.
    pub fn add_item(&mut self, new_item: NewCartItem) -> Result<&CartItem, CartError> {
        let item = new_item.into_item(self.id)?;
        let item_id = item.id();
        self.attach(item);

        self.find_item(item_id)
            .ok_or_else(|| CartError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    // Appends `item` unless an item with the same id is already present.
    // Returns whether the item was appended.
    fn attach(&mut self, item: CartItem) -> bool {
        debug_assert_eq!(item.cart_id(), self.id);

        if self.items.iter().any(|existing| existing.id() == item.id()) {
            debug!(cart = %self.id, item = %item.id(), "item already present, ignoring");
            return false;
        }

        self.items.push(item);
        self.touch();
        true
    }

    /// Removes and returns the item with `item_id`.
    ///
    /// # Errors
    ///
    /// [`CartError::ItemNotFound`] when no such item is in this cart.
    pub fn remove_item(&mut self, item_id: Uuid) -> Result<CartItem, CartError> {
        let position = self
            .items
            .iter()
            .position(|item| item.id() == item_id)
            .ok_or_else(|| CartError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;

        let removed = self.items.remove(position);
        self.touch();
        Ok(removed)
    }

    /// Exact-identity lookup.
    pub fn find_item(&self, item_id: Uuid) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id() == item_id)
    }

    /// Sets the quantity of one item and stamps both the item and the cart.
    ///
    /// # Errors
    ///
    /// - [`CartError::ItemNotFound`]: no such item in this cart.
    /// - [`CartError::InvalidQuantity`]: `quantity` is not positive.
    pub fn set_item_quantity(&mut self, item_id: Uuid, quantity: i64) -> Result<&CartItem, CartError> {
        let position = self
            .items
            .iter()
            .position(|item| item.id() == item_id)
            .ok_or_else(|| CartError::ItemNotFound {
                item_id: item_id.to_string(),
            })?;

        self.items[position].set_quantity(quantity)?;
        self.touch();
        Ok(&self.items[position])
    }

    /// Sum of item subtotals; zero for an empty cart.
    pub fn total(&self) -> BigDecimal {
        self.items
            .iter()
            .fold(BigDecimal::from(0), |total, item| total + item.subtotal())
    }

    fn touch(&mut self) {
        self.updated_at = Some(later_than(self.updated_at));
    }
}

// Current time, clamped so a timestamp never moves backwards.
pub(crate) fn later_than(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now();
    match previous {
        Some(prev) if prev > now => prev,
        _ => now,
    }
}
