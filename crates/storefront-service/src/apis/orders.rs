//! Order endpoints: creation, lookup, review and back-office listings.

use axum::{
	extract::{Path, Query, State},
	http::{HeaderMap, StatusCode},
	response::Json,
};
use storefront_core::OrderServiceError;
use storefront_types::{
	current_timestamp_millis, truncate_id, APIError, CreateOrderRequest, DashboardStats, Order,
	OrderFilter, OrderListResponse, RegistrationForm, RegistrationFormRequest,
	ReviewOrderRequest,
};

use crate::apis::auth::{self, Caller};
use crate::server::AppState;

/// Maps an order service failure onto an API error.
pub fn order_error(err: OrderServiceError) -> APIError {
	match err {
		OrderServiceError::NotFound(id) => APIError::NotFound {
			error_type: "ORDER_NOT_FOUND".into(),
			message: format!("Order not found: {}", id),
		},
		OrderServiceError::AlreadyExists(id) => APIError::Conflict {
			error_type: "ORDER_EXISTS".into(),
			message: format!("Order already exists: {}", id),
		},
		OrderServiceError::InvalidArgument(message) => APIError::BadRequest {
			error_type: "INVALID_ARGUMENT".into(),
			message,
		},
		OrderServiceError::FailedPrecondition(message) => APIError::Conflict {
			error_type: "INVALID_STATE".into(),
			message,
		},
		OrderServiceError::Storage(message) => {
			tracing::error!(error = %message, "Order storage failure");
			APIError::InternalServerError {
				error_type: "INTERNAL_ERROR".into(),
				message: "Order storage is unavailable".into(),
			}
		},
	}
}

/// Handles POST /api/orders.
///
/// The order is placed for the calling user. A body `userId` naming anyone
/// else is refused.
pub async fn create_order(
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(mut request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let caller = auth::caller(&headers)?;
	if request.user_id.is_empty() {
		request.user_id = caller.user_id;
	} else if request.user_id != caller.user_id {
		return Err(auth::forbidden("Orders can only be placed for the signed-in user"));
	}

	let order = state
		.engine
		.orders()
		.create_order(request)
		.await
		.map_err(order_error)?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders.
///
/// Administrators see every order. Other users only see their own.
pub async fn list_orders(
	State(state): State<AppState>,
	headers: HeaderMap,
	Query(mut filter): Query<OrderFilter>,
) -> Result<Json<OrderListResponse>, APIError> {
	let caller = auth::caller(&headers)?;
	if !caller.is_admin {
		if filter.user_id.as_ref().is_some_and(|u| *u != caller.user_id) {
			return Err(auth::forbidden("Only administrators can list other users' orders"));
		}
		filter.user_id = Some(caller.user_id);
	}

	state
		.engine
		.orders()
		.list_orders(filter)
		.await
		.map(Json)
		.map_err(order_error)
}

/// Loads an order the caller owns or administers.
async fn accessible_order(state: &AppState, caller: &Caller, id: &str) -> Result<Order, APIError> {
	let order = state
		.engine
		.orders()
		.get_order(id)
		.await
		.map_err(|e| {
			tracing::warn!("Order retrieval failed: {}", e);
			order_error(e)
		})?;
	if !caller.can_access(&order.user_id) {
		return Err(auth::forbidden("Order belongs to another user"));
	}
	Ok(order)
}

/// Handles GET /api/orders/{id}.
pub async fn get_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<Order>, APIError> {
	let caller = auth::caller(&headers)?;
	accessible_order(&state, &caller, &id).await.map(Json)
}

/// Handles POST /api/orders/{id}/review. Administrators only.
pub async fn review_order(
	Path(id): Path<String>,
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<ReviewOrderRequest>,
) -> Result<Json<Order>, APIError> {
	let reviewer = auth::admin(&headers)?;
	tracing::info!(reviewer = %reviewer.user_id, order_id = %truncate_id(&id), "Reviewing order");
	state
		.engine
		.orders()
		.review_order(&id, request.decision, request.note)
		.await
		.map(Json)
		.map_err(order_error)
}

/// Handles POST /api/orders/{id}/registration-form.
pub async fn resubmit_registration_form(
	Path(id): Path<String>,
	State(state): State<AppState>,
	headers: HeaderMap,
	Json(request): Json<RegistrationFormRequest>,
) -> Result<Json<Order>, APIError> {
	let caller = auth::caller(&headers)?;
	accessible_order(&state, &caller, &id).await?;

	let form = RegistrationForm {
		file_name: request.file_name,
		url: request.url,
		uploaded_at: current_timestamp_millis(),
	};
	state
		.engine
		.orders()
		.resubmit_registration_form(&id, form)
		.await
		.map(Json)
		.map_err(order_error)
}

/// Handles GET /api/dashboard. Administrators only.
pub async fn dashboard(
	State(state): State<AppState>,
	headers: HeaderMap,
) -> Result<Json<DashboardStats>, APIError> {
	auth::admin(&headers)?;
	state
		.engine
		.orders()
		.dashboard_stats()
		.await
		.map(Json)
		.map_err(order_error)
}
