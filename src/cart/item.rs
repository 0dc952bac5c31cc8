//! Cart line items and the validated constructor input.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{CartError, Violation};

use super::later_than;

/// Longest accepted `productName`, `category`, or `sku`, in characters.
pub const MAX_TEXT_LEN: usize = 255;

/// Fraction digits kept on a stored price.
pub const PRICE_SCALE: i64 = 2;

/// Unvalidated input for [`Cart::add_item`](super::Cart::add_item).
///
/// Numeric fields are signed so that out-of-range values coming off the wire
/// reach [`validate`](Self::validate) instead of failing to decode.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use bigdecimal::BigDecimal;
/// use cartd::cart::NewCartItem;
///
/// let item = NewCartItem::new(123, "Laptop", BigDecimal::from_str("999.99").unwrap(), 2)
///     .with_category("electronics")
///     .with_sku("LAP-001");
/// assert!(item.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct NewCartItem {
    pub product_id: i64,
    pub product_name: String,
    pub price: BigDecimal,
    pub quantity: i64,
    pub category: Option<String>,
    pub sku: Option<String>,
}

impl NewCartItem {
    pub fn new(
        product_id: i64,
        product_name: impl Into<String>,
        price: BigDecimal,
        quantity: i64,
    ) -> Self {
        Self {
            product_id,
            product_name: product_name.into(),
            price,
            quantity,
            category: None,
            sku: None,
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    #[must_use]
    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = Some(sku.into());
        self
    }

    /// Checks every field and reports all violations at once.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidItem`] listing each rejected field, in payload order.
    pub fn validate(&self) -> Result<(), CartError> {
        let mut violations = Vec::new();

        if self.product_id <= 0 {
            violations.push(Violation::new(
                "productId",
                "Product ID must be a positive integer",
            ));
        }

        let name_len = self.product_name.chars().count();
        if self.product_name.is_empty() {
            violations.push(Violation::new("productName", "ProductName required"));
        } else if name_len > MAX_TEXT_LEN {
            violations.push(Violation::new(
                "productName",
                format!("Product name cannot be longer than {MAX_TEXT_LEN} characters"),
            ));
        }

        if self.price < BigDecimal::from(0) {
            violations.push(Violation::new("price", "Price cannot be negative"));
        }

        if self.quantity <= 0 || u32::try_from(self.quantity).is_err() {
            violations.push(Violation::new("quantity", "Quantity must be greater than 0"));
        }

        if exceeds_max(self.category.as_deref()) {
            violations.push(Violation::new(
                "category",
                format!("Category cannot be longer than {MAX_TEXT_LEN} characters"),
            ));
        }

        if exceeds_max(self.sku.as_deref()) {
            violations.push(Violation::new(
                "sku",
                format!("SKU cannot be longer than {MAX_TEXT_LEN} characters"),
            ));
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(CartError::InvalidItem { violations })
        }
    }

    // Validates and materializes the item for `cart_id`.
    pub(super) fn into_item(self, cart_id: Uuid) -> Result<CartItem, CartError> {
        self.validate()?;
        let quantity = u32::try_from(self.quantity).map_err(|_| CartError::invalid_quantity())?;

        Ok(CartItem {
            id: Uuid::new_v4(),
            cart_id,
            product_id: self.product_id,
            product_name: self.product_name,
            price: self.price.with_scale_round(PRICE_SCALE, RoundingMode::HalfUp),
            quantity,
            category: self.category,
            sku: self.sku,
            added_at: Utc::now(),
            updated_at: None,
        })
    }
}

fn exceeds_max(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.chars().count() > MAX_TEXT_LEN)
}

/// A single line in a [`Cart`](super::Cart).
///
/// Items are only ever created through [`Cart::add_item`](super::Cart::add_item)
/// and live inside the owning cart's item list. `cart_id` is a lookup key back
/// to that cart, not a handle to it.
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    id: Uuid,
    cart_id: Uuid,
    product_id: i64,
    product_name: String,
    price: BigDecimal,
    quantity: u32,
    category: Option<String>,
    sku: Option<String>,
    added_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
}

impl CartItem {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cart_id(&self) -> Uuid {
        self.cart_id
    }

    pub fn product_id(&self) -> i64 {
        self.product_id
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    /// Unit price, already rounded to two decimals.
    pub fn price(&self) -> &BigDecimal {
        &self.price
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn sku(&self) -> Option<&str> {
        self.sku.as_deref()
    }

    pub fn added_at(&self) -> DateTime<Utc> {
        self.added_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// `price * quantity`, computed on every call.
    pub fn subtotal(&self) -> BigDecimal {
        &self.price * &BigDecimal::from(self.quantity)
    }

    /// Replaces the quantity and stamps `updated_at`.
    ///
    /// Price, product and identity fields are never touched. The new
    /// `updated_at` is never earlier than the previous one.
    ///
    /// # Errors
    ///
    /// [`CartError::InvalidQuantity`] when `quantity` is not a positive `u32`.
    pub fn set_quantity(&mut self, quantity: i64) -> Result<(), CartError> {
        let quantity = u32::try_from(quantity)
            .ok()
            .filter(|q| *q > 0)
            .ok_or_else(CartError::invalid_quantity)?;

        self.quantity = quantity;
        self.updated_at = Some(later_than(self.updated_at));
        Ok(())
    }
}
