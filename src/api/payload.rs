//! Request body decoding for the item endpoints.
//!
//! Bodies are read as loose JSON objects first so that wrong types, missing
//! fields and domain violations can each be reported in their own shape.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::{Map, Number, Value};

use super::errors::{ApiError, TypeMismatch};
use crate::cart::NewCartItem;
use crate::error::{CartError, Violation};

const INVALID_JSON: &str = "Request payload contains invalid \"json\" data.";

// Field order of the add-item payload. Violations are reported in this order.
const ITEM_FIELDS: [&str; 6] = ["productId", "productName", "price", "quantity", "category", "sku"];

/// Parses `body` as a JSON object. An empty body reads as `{}` when
/// `allow_empty` is set.
///
/// # Errors
///
/// [`ApiError::BadRequest`] for malformed JSON or a non-object document.
pub fn decode_object(body: &[u8], allow_empty: bool) -> Result<Map<String, Value>, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return if allow_empty {
            Ok(Map::new())
        } else {
            Err(ApiError::bad_request("Request body is empty."))
        };
    }

    match serde_json::from_slice(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) | Err(_) => Err(ApiError::bad_request(INVALID_JSON)),
    }
}

/// Builds a [`NewCartItem`] from an add-item payload, checking it completely.
///
/// # Errors
///
/// - [`ApiError::InvalidTypes`] when any field has the wrong JSON type.
/// - [`CartError::InvalidItem`] (as [`ApiError::Cart`]) listing missing and
///   invalid fields together.
pub fn new_cart_item(payload: &Map<String, Value>) -> Result<NewCartItem, ApiError> {
    let field = |name: &str| payload.get(name).filter(|v| !v.is_null());

    let mut mismatches = Vec::new();
    let product_id = typed(field("productId"), "productId", "int", Value::as_i64, &mut mismatches);
    let product_name = typed(
        field("productName"),
        "productName",
        "string",
        |v| v.as_str().map(str::to_owned),
        &mut mismatches,
    );
    let price = typed(field("price"), "price", "float", decimal, &mut mismatches);
    let quantity = typed(field("quantity"), "quantity", "int", Value::as_i64, &mut mismatches);
    let category = typed(
        field("category"),
        "category",
        "string",
        |v| v.as_str().map(str::to_owned),
        &mut mismatches,
    );
    let sku = typed(
        field("sku"),
        "sku",
        "string",
        |v| v.as_str().map(str::to_owned),
        &mut mismatches,
    );

    if !mismatches.is_empty() {
        return Err(ApiError::InvalidTypes { mismatches });
    }

    let mut missing = Vec::new();
    if product_id.is_none() {
        missing.push(Violation::new("productId", "ProductId required"));
    }
    if product_name.is_none() {
        missing.push(Violation::new("productName", "ProductName required"));
    }
    if price.is_none() {
        missing.push(Violation::new("price", "Price required"));
    }
    if quantity.is_none() {
        missing.push(Violation::new("quantity", "Quantity required"));
    }

    // Missing fields get valid stand-ins so validation only reports on what was sent.
    let mut item = NewCartItem::new(
        product_id.unwrap_or(1),
        product_name.unwrap_or_else(|| "-".to_owned()),
        price.unwrap_or_else(|| BigDecimal::from(0)),
        quantity.unwrap_or(1),
    );
    item.category = category;
    item.sku = sku;

    let mut violations = match item.validate() {
        Ok(()) => Vec::new(),
        Err(CartError::InvalidItem { violations }) => violations,
        Err(other) => return Err(other.into()),
    };
    violations.retain(|v| !missing.iter().any(|m| m.field == v.field));
    violations.extend(missing);

    if violations.is_empty() {
        return Ok(item);
    }

    violations.sort_by_key(|v| ITEM_FIELDS.iter().position(|f| *f == v.field));
    Err(CartError::InvalidItem { violations }.into())
}

/// Reads `quantity` from an update payload with integer-cast semantics:
/// floats truncate, numeric strings parse by their leading digits, anything
/// else counts as `0`.
///
/// # Errors
///
/// [`ApiError::QuantityRequired`] when the field is absent or `null`.
pub fn quantity(payload: &Map<String, Value>) -> Result<i64, ApiError> {
    match payload.get("quantity") {
        None | Some(Value::Null) => Err(ApiError::QuantityRequired),
        Some(Value::Number(n)) => Ok(number_to_int(n)),
        Some(Value::String(s)) => Ok(leading_int(s)),
        Some(Value::Bool(b)) => Ok(i64::from(*b)),
        Some(Value::Array(a)) => Ok(i64::from(!a.is_empty())),
        Some(Value::Object(o)) => Ok(i64::from(!o.is_empty())),
    }
}

fn typed<T>(
    value: Option<&Value>,
    field: &'static str,
    expected: &'static str,
    extract: impl Fn(&Value) -> Option<T>,
    mismatches: &mut Vec<TypeMismatch>,
) -> Option<T> {
    let value = value?;
    let extracted = extract(value);
    if extracted.is_none() {
        mismatches.push(TypeMismatch {
            field,
            expected,
            given: json_type(value),
        });
    }
    extracted
}

// Any JSON number, converted through its shortest decimal text.
fn decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(n) => BigDecimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn number_to_int(n: &Number) -> i64 {
    if let Some(i) = n.as_i64() {
        i
    } else if n.is_u64() {
        i64::MAX
    } else {
        // `as` saturates and maps NaN to 0.
        n.as_f64().map_or(0, |f| f.trunc() as i64)
    }
}

fn leading_int(s: &str) -> i64 {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map_or(0, |n| sign * n)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) | Value::Object(_) => "array",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn violations(err: ApiError) -> Vec<(&'static str, String)> {
        match err {
            ApiError::Cart(CartError::InvalidItem { violations }) => {
                violations.into_iter().map(|v| (v.field, v.message)).collect()
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn decode_rejects_malformed_and_non_objects() {
        assert!(matches!(decode_object(b"{oops", true), Err(ApiError::BadRequest { .. })));
        assert!(matches!(decode_object(b"[1,2]", true), Err(ApiError::BadRequest { .. })));
        assert!(matches!(decode_object(b"  ", false), Err(ApiError::BadRequest { .. })));
        assert!(decode_object(b"", true).unwrap().is_empty());
    }

    #[test]
    fn full_payload_builds_item() {
        let payload = object(json!({
            "productId": 123,
            "productName": "Laptop",
            "price": 999.99,
            "quantity": 2,
            "category": "electronics",
            "sku": null,
        }));

        let item = new_cart_item(&payload).unwrap();
        assert_eq!(item.product_id, 123);
        assert_eq!(item.price, BigDecimal::from_str("999.99").unwrap());
        assert_eq!(item.category.as_deref(), Some("electronics"));
        assert_eq!(item.sku, None);
    }

    #[test]
    fn integer_price_is_accepted() {
        let payload = object(json!({"productId": 1, "productName": "Pen", "price": 3, "quantity": 1}));
        assert_eq!(new_cart_item(&payload).unwrap().price, BigDecimal::from(3));
    }

    #[test]
    fn missing_fields_are_reported_in_payload_order() {
        let payload = object(json!({"productName": "Laptop", "quantity": 0}));
        assert_eq!(
            violations(new_cart_item(&payload).unwrap_err()),
            vec![
                ("productId", "ProductId required".to_owned()),
                ("price", "Price required".to_owned()),
                ("quantity", "Quantity must be greater than 0".to_owned()),
            ]
        );
    }

    #[test]
    fn invalid_values_are_reported() {
        let payload = object(json!({
            "productId": 1,
            "productName": "Laptop",
            "price": -10.00,
            "quantity": 1,
        }));
        assert_eq!(
            violations(new_cart_item(&payload).unwrap_err()),
            vec![("price", "Price cannot be negative".to_owned())]
        );
    }

    #[test]
    fn wrong_types_are_reported_before_values() {
        let payload = object(json!({"productId": "abc", "productName": 5, "price": 1, "quantity": 1.5}));
        match new_cart_item(&payload).unwrap_err() {
            ApiError::InvalidTypes { mismatches } => {
                let seen: Vec<_> = mismatches.iter().map(|m| (m.field, m.given)).collect();
                assert_eq!(seen, vec![("productId", "string"), ("productName", "int"), ("quantity", "float")]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn quantity_uses_integer_cast_semantics() {
        assert!(matches!(quantity(&object(json!({}))), Err(ApiError::QuantityRequired)));
        assert!(matches!(quantity(&object(json!({"quantity": null}))), Err(ApiError::QuantityRequired)));
        assert_eq!(quantity(&object(json!({"quantity": 5}))).unwrap(), 5);
        assert_eq!(quantity(&object(json!({"quantity": 2.9}))).unwrap(), 2);
        assert_eq!(quantity(&object(json!({"quantity": "7"}))).unwrap(), 7);
        assert_eq!(quantity(&object(json!({"quantity": "12abc"}))).unwrap(), 12);
        assert_eq!(quantity(&object(json!({"quantity": "abc"}))).unwrap(), 0);
        assert_eq!(quantity(&object(json!({"quantity": -3}))).unwrap(), -3);
    }
}
