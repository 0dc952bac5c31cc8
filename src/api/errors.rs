//! Error-to-HTTP translation.
//!
//! Every failure a handler or middleware stage can raise ends up here as an
//! [`ApiError`] and leaves as a JSON body of the form
//! `{"error": {"message": ..., "code": ...}}`, sometimes with `details`.

use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::{debug, error};

use crate::database::StorageError;
use crate::error::{CartError, Violation};
use crate::http::{Response, StatusCode};
use crate::security::RateLimitExceeded;

/// A payload field that had the wrong JSON type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMismatch {
    pub field: &'static str,
    pub expected: &'static str,
    pub given: &'static str,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Cart(#[from] CartError),

    #[error(transparent)]
    RateLimited(#[from] RateLimitExceeded),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Malformed body or query.
    #[error("{message}")]
    BadRequest { message: String },

    /// Item update without a `quantity`.
    #[error("Quantity required")]
    QuantityRequired,

    #[error("Validation failed")]
    InvalidTypes { mismatches: Vec<TypeMismatch> },

    #[error("Route not found")]
    RouteNotFound,

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Cart(CartError::CartNotFound { .. } | CartError::ItemNotFound { .. }) => {
                StatusCode::NotFound
            }
            Self::Cart(CartError::InvalidItem { .. } | CartError::InvalidQuantity { .. }) => {
                StatusCode::BadRequest
            }
            Self::BadRequest { .. } | Self::QuantityRequired | Self::InvalidTypes { .. } => {
                StatusCode::BadRequest
            }
            Self::RouteNotFound => StatusCode::NotFound,
            Self::RateLimited(_) => StatusCode::TooManyRequests,
            Self::Storage(_) | Self::Internal(_) => StatusCode::InternalServerError,
        }
    }

    /// The machine-readable `error.code`.
    pub fn code(&self) -> String {
        match self {
            Self::Cart(CartError::CartNotFound { .. }) => "CART_NOT_FOUND".to_owned(),
            Self::Cart(CartError::ItemNotFound { .. }) => "ITEM_NOT_FOUND".to_owned(),
            Self::Cart(CartError::InvalidItem { violations }) if required_only(violations) => violations
                .iter()
                .map(|v| format!("{}_REQUIRED", v.field.to_uppercase()))
                .collect::<Vec<_>>()
                .join("|"),
            Self::Cart(CartError::InvalidItem { .. } | CartError::InvalidQuantity { .. })
            | Self::InvalidTypes { .. } => "VALIDATION_ERROR".to_owned(),
            Self::BadRequest { .. } => "BAD_REQUEST".to_owned(),
            Self::QuantityRequired => "QUANTITY_REQUIRED".to_owned(),
            Self::RouteNotFound => "NOT_FOUND".to_owned(),
            Self::RateLimited(_) => "RATE_LIMIT_EXCEEDED".to_owned(),
            Self::Storage(_) | Self::Internal(_) => "INTERNAL_SERVER_ERROR".to_owned(),
        }
    }

    /// The JSON error document.
    pub fn body(&self) -> Value {
        let mut error = Map::new();
        error.insert("message".to_owned(), Value::String(self.message()));
        error.insert("code".to_owned(), Value::String(self.code()));
        if let Some(details) = self.details() {
            error.insert("details".to_owned(), details);
        }
        json!({ "error": error })
    }

    /// Builds the response, including rate-limit headers for a `429`.
    pub fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::InternalServerError {
            error!(error = %self, "request failed");
        } else {
            debug!(status = status.as_u16(), code = %self.code(), "request rejected");
        }

        let mut response = Response::json(status, &self.body());
        if let Self::RateLimited(exceeded) = &self {
            exceeded.report.apply(&mut response);
        }
        response
    }

    fn message(&self) -> String {
        match self {
            Self::Cart(CartError::InvalidItem { violations }) if required_only(violations) => {
                violations
                    .iter()
                    .map(|v| v.message.as_str())
                    .collect::<Vec<_>>()
                    .join(" | ")
            }
            Self::Cart(CartError::InvalidQuantity { .. }) => "Validation failed".to_owned(),
            // Details stay in the log.
            Self::Storage(_) | Self::Internal(_) => "An internal error occurred".to_owned(),
            other => other.to_string(),
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Cart(CartError::InvalidItem { violations }) if !required_only(violations) => {
                let details: Map<String, Value> = violations
                    .iter()
                    .map(|v| {
                        let detail = json!({ "message": v.message, "code": "INVALID_VALUE" });
                        (v.field.to_owned(), detail)
                    })
                    .collect();
                Some(Value::Object(details))
            }
            Self::Cart(CartError::InvalidQuantity { message }) => Some(json!([message])),
            Self::InvalidTypes { mismatches } => {
                let details: Map<String, Value> = mismatches
                    .iter()
                    .map(|m| {
                        let message =
                            format!("The type must be \"{}\", \"{}\" given.", m.expected, m.given);
                        let detail = json!({ "message": message, "code": "INVALID_TYPE" });
                        (m.field.to_owned(), detail)
                    })
                    .collect();
                Some(Value::Object(details))
            }
            _ => None,
        }
    }
}

// A violation list whose first entry is a missing-field report is answered in
// the short `<FIELD>_REQUIRED` form instead of the detailed one.
fn required_only(violations: &[Violation]) -> bool {
    violations
        .first()
        .is_some_and(|v| v.message.contains("required"))
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("failed to serialize response: {err}"))
    }
}
