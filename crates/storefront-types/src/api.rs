//! API types for the storefront HTTP endpoints.
//!
//! JSON endpoints report failures with [`ErrorResponse`]. The gateway-facing
//! endpoints do not use these types; they answer with the plain-text bodies
//! the gateway expects.

use crate::{CustomerInfo, Order, OrderItem, PaymentStatus, RegistrationForm, ReviewStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request body for `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
	/// Optional pre-generated order id.
	pub order_id: Option<String>,
	/// Owner of the order. The HTTP layer fills it from the signed-in user.
	#[serde(default)]
	pub user_id: String,
	#[serde(default)]
	pub customer: CustomerInfo,
	pub items: Vec<OrderItem>,
	#[serde(default)]
	pub shipping_fee: u64,
	/// Total after discounts. Defaults to subtotal plus shipping.
	pub total_amount: Option<u64>,
	pub registration_form: Option<RegistrationForm>,
}

/// Review decision submitted by an administrator.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
	Approve,
	Reject,
}

/// Request body for `POST /api/orders/{id}/review`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewOrderRequest {
	pub decision: ReviewDecision,
	#[serde(default)]
	pub note: String,
}

/// Request body for `POST /api/orders/{id}/registration-form`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationFormRequest {
	pub file_name: String,
	pub url: String,
}

/// Query parameters for `GET /api/orders`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderFilter {
	pub review_status: Option<ReviewStatus>,
	pub payment_status: Option<PaymentStatus>,
	pub user_id: Option<String>,
	/// Case-insensitive prefix match on order id, customer name or email.
	pub search: Option<String>,
	pub limit: Option<usize>,
}

/// Response body for `GET /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
	pub orders: Vec<Order>,
	pub total: usize,
}

/// Request body for `POST /api/payments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
	pub order_id: String,
	pub item_name: Option<String>,
	/// Origin of the storefront page that started checkout.
	#[serde(rename = "clientBackURL")]
	pub client_back_url: Option<String>,
}

/// Response body for `POST /api/payments`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
	/// Auto-submitting HTML form to inject into the page.
	pub form_html: String,
	/// Signed gateway parameters, `CheckMacValue` included.
	pub params: serde_json::Map<String, serde_json::Value>,
}

/// Aggregated figures for the back-office dashboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
	pub total_orders: usize,
	pub pending_orders: usize,
	pub approved_orders: usize,
	pub rejected_orders: usize,
	pub paid_orders: usize,
	/// Sum of totals over orders that are both approved and paid.
	pub total_revenue: u64,
	pub recent_orders: Vec<Order>,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Bad request with validation errors (400)
	BadRequest { error_type: String, message: String },
	/// Missing caller identity (401)
	Unauthorized { message: String },
	/// Caller may not act on the resource (403)
	Forbidden { error_type: String, message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Request conflicts with the resource state (409)
	Conflict { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::InternalServerError { .. } => 500,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error, message) = match self {
			APIError::Unauthorized { message } => ("UNAUTHENTICATED", message.as_str()),
			APIError::BadRequest { error_type, message }
			| APIError::Forbidden { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::InternalServerError { error_type, message } => {
				(error_type.as_str(), message.as_str())
			},
		};
		ErrorResponse {
			error: error.to_string(),
			message: message.to_string(),
			details: None,
			retry_after: None,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			APIError::BadRequest { message, .. } => write!(f, "Bad Request: {}", message),
			APIError::Unauthorized { message } => write!(f, "Unauthorized: {}", message),
			APIError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
			APIError::NotFound { message, .. } => write!(f, "Not Found: {}", message),
			APIError::Conflict { message, .. } => write!(f, "Conflict: {}", message),
			APIError::InternalServerError { message, .. } => {
				write!(f, "Internal Server Error: {}", message)
			},
		}
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status = StatusCode::from_u16(self.status_code())
			.unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_status_codes() {
		let err = APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: "missing".into(),
		};
		assert_eq!(err.status_code(), 404);
		assert_eq!(err.to_error_response().error, "ORDER_NOT_FOUND");

		let err = APIError::Unauthorized {
			message: "no user".into(),
		};
		assert_eq!(err.status_code(), 401);
		assert_eq!(err.to_error_response().error, "UNAUTHENTICATED");
	}

	#[test]
	fn test_order_filter_parses_statuses() {
		let filter: OrderFilter =
			serde_json::from_str(r#"{"reviewStatus":"approved","paymentStatus":"paid"}"#).unwrap();
		assert_eq!(filter.review_status, Some(ReviewStatus::Approved));
		assert_eq!(filter.payment_status, Some(PaymentStatus::Paid));
		assert!(filter.limit.is_none());
	}

	#[test]
	fn test_create_payment_request_field_names() {
		let req: CreatePaymentRequest = serde_json::from_str(
			r#"{"orderId":"ORDER_1","clientBackURL":"https://shop.example.com"}"#,
		)
		.unwrap();
		assert_eq!(req.client_back_url.as_deref(), Some("https://shop.example.com"));
		assert!(req.item_name.is_none());
	}
}
