//! Payment endpoints.
//!
//! `create_payment` serves the storefront. The `/ecpay` handlers serve the
//! gateway: the callback replies in plain text and the browser return
//! replies with a redirect.

use axum::{
	extract::{rejection::FormRejection, Form, Query, State},
	http::{HeaderMap, StatusCode},
	response::{IntoResponse, Json, Redirect},
};
use std::collections::BTreeMap;
use storefront_core::{CallbackOutcome, PaymentError, PaymentRequest};
use storefront_signature::params_from_pairs;
use storefront_types::{APIError, CreatePaymentRequest, CreatePaymentResponse};

use crate::apis::auth;
use crate::server::AppState;

/// Maps a payment preparation failure onto an API error.
pub fn payment_error(err: PaymentError) -> APIError {
	match err {
		PaymentError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: format!("Order not found: {}", id),
		},
		PaymentError::PermissionDenied(message) => APIError::Forbidden {
			error_type: "PERMISSION_DENIED".into(),
			message,
		},
		PaymentError::FailedPrecondition(message) => APIError::Conflict {
			error_type: "INVALID_STATE".into(),
			message,
		},
		PaymentError::InvalidArgument(message) => APIError::BadRequest {
			error_type: "INVALID_ARGUMENT".into(),
			message,
		},
		other => {
			tracing::error!(error = %other, "Payment preparation failed");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".into(),
				message: "Payment could not be prepared".into(),
			}
		},
	}
}

/// Handles POST /api/payments.
pub async fn create_payment(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, APIError> {
	let user_id = auth::caller(&headers)?.user_id;
	let form = state
		.engine
		.payments()
		.create_payment(PaymentRequest {
			order_id: request.order_id,
			user_id,
			item_name: request.item_name,
			client_back_url: request.client_back_url,
		})
		.await
		.map_err(payment_error)?;

	Ok(Json(CreatePaymentResponse {
		params: form.params_json(),
		form_html: form.html,
	}))
}

/// Handles POST /ecpay/callback.
///
/// The gateway only understands its plain-text replies, so a body that is
/// not a form is answered with the generic error reply too.
pub async fn handle_callback(
	State(state): State<AppState>,
	form: Result<Form<BTreeMap<String, String>>, FormRejection>,
) -> impl IntoResponse {
	let outcome = match form {
		Ok(Form(fields)) => {
			state
				.engine
				.payments()
				.handle_callback(params_from_pairs(fields))
				.await
		},
		Err(rejection) => {
			tracing::warn!(error = %rejection, "Unreadable payment callback body");
			CallbackOutcome::Error
		},
	};
	callback_reply(outcome)
}

fn callback_reply(outcome: CallbackOutcome) -> (StatusCode, &'static str) {
	let status =
		StatusCode::from_u16(outcome.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
	(status, outcome.body())
}

/// Handles GET /ecpay/return.
pub async fn handle_return_query(
	State(state): State<AppState>,
	Query(fields): Query<BTreeMap<String, String>>,
) -> Redirect {
	redirect_after_payment(&state, fields).await
}

/// Handles POST /ecpay/return.
pub async fn handle_return_form(
	State(state): State<AppState>,
	Form(fields): Form<BTreeMap<String, String>>,
) -> Redirect {
	redirect_after_payment(&state, fields).await
}

async fn redirect_after_payment(state: &AppState, fields: BTreeMap<String, String>) -> Redirect {
	let target = state
		.engine
		.payments()
		.resolve_return(&params_from_pairs(fields))
		.await;
	Redirect::to(&target)
}
