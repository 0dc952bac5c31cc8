//! Wire projections of the aggregate.
//!
//! `CartSummary` is the list shape, `CartDetail` the full read shape. Money
//! is rendered as a decimal string with exactly two fraction digits.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{Cart, CartItem, PRICE_SCALE};

/// Renders an amount with two fraction digits, e.g. `"1999.98"` or `"0.00"`.
///
/// Built from the scaled integer digits, since `BigDecimal`'s `Display`
/// drops the fraction of a zero.
pub fn format_money(amount: &BigDecimal) -> String {
    let (units, _) = amount
        .with_scale_round(PRICE_SCALE, RoundingMode::HalfUp)
        .as_bigint_and_exponent();
    let units = units.to_string();
    let (sign, digits) = match units.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", units.as_str()),
    };

    let padded = format!("{digits:0>3}");
    let (whole, cents) = padded.split_at(padded.len() - 2);
    format!("{sign}{whole}.{cents}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub total: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartDetail {
    #[serde(flatten)]
    pub summary: CartSummary,
    pub items: Vec<CartItemView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemView {
    pub id: Uuid,
    pub product_id: i64,
    pub product_name: String,
    pub category: Option<String>,
    pub sku: Option<String>,
    pub price: String,
    pub quantity: u32,
    pub subtotal: String,
    pub added_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Cart {
    pub fn to_summary(&self) -> CartSummary {
        CartSummary {
            id: self.id(),
            created_at: self.created_at(),
            updated_at: self.updated_at(),
            total: format_money(&self.total()),
        }
    }

    pub fn to_detail(&self) -> CartDetail {
        CartDetail {
            summary: self.to_summary(),
            items: self.items().iter().map(CartItem::to_view).collect(),
        }
    }
}

impl CartItem {
    pub fn to_view(&self) -> CartItemView {
        CartItemView {
            id: self.id(),
            product_id: self.product_id(),
            product_name: self.product_name().to_owned(),
            category: self.category().map(str::to_owned),
            sku: self.sku().map(str::to_owned),
            price: format_money(self.price()),
            quantity: self.quantity(),
            subtotal: format_money(&self.subtotal()),
            added_at: self.added_at(),
            updated_at: self.updated_at(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use serde_json::json;

    use super::*;
    use crate::cart::NewCartItem;

    #[test]
    fn money_always_has_two_digits() {
        assert_eq!(format_money(&BigDecimal::from(10)), "10.00");
        assert_eq!(format_money(&BigDecimal::from_str("0.5").unwrap()), "0.50");
        assert_eq!(format_money(&BigDecimal::from_str("1999.98").unwrap()), "1999.98");
        assert_eq!(format_money(&BigDecimal::from(0)), "0.00");
        assert_eq!(format_money(&BigDecimal::from_str("0.00").unwrap()), "0.00");
        assert_eq!(format_money(&BigDecimal::from_str("0.05").unwrap()), "0.05");
        assert_eq!(format_money(&BigDecimal::from_str("-0.5").unwrap()), "-0.50");
    }

    #[test]
    fn free_items_and_empty_carts_render_zero_money() {
        let empty = serde_json::to_value(Cart::new().to_summary()).unwrap();
        assert_eq!(empty["total"], json!("0.00"));

        let mut cart = Cart::new();
        cart.add_item(NewCartItem::new(5, "Sticker", BigDecimal::from(0), 3))
            .unwrap();
        let value = serde_json::to_value(cart.to_detail()).unwrap();
        assert_eq!(value["total"], json!("0.00"));
        assert_eq!(value["items"][0]["price"], json!("0.00"));
        assert_eq!(value["items"][0]["subtotal"], json!("0.00"));
    }

    #[test]
    fn summary_omits_items() {
        let mut cart = Cart::new();
        cart.add_item(NewCartItem::new(1, "Mug", BigDecimal::from(4), 2))
            .unwrap();

        let value = serde_json::to_value(cart.to_summary()).unwrap();
        assert_eq!(value["total"], json!("8.00"));
        assert!(value.get("items").is_none());
        assert!(value.get("createdAt").is_some());
    }

    #[test]
    fn detail_embeds_item_views() {
        let mut cart = Cart::new();
        cart.add_item(
            NewCartItem::new(9, "Mug", BigDecimal::from_str("4.25").unwrap(), 3).with_sku("MUG-9"),
        )
        .unwrap();

        let value = serde_json::to_value(cart.to_detail()).unwrap();
        assert_eq!(value["id"], json!(cart.id()));
        assert_eq!(value["total"], json!("12.75"));

        let item = &value["items"][0];
        assert_eq!(item["productId"], json!(9));
        assert_eq!(item["productName"], json!("Mug"));
        assert_eq!(item["price"], json!("4.25"));
        assert_eq!(item["subtotal"], json!("12.75"));
        assert_eq!(item["sku"], json!("MUG-9"));
        assert_eq!(item["category"], json!(null));
        assert_eq!(item["updatedAt"], json!(null));
    }
}
