//! Order lifecycle operations for the storefront and back office.
//!
//! Creation, review, resubmission of the registration form, listing and the
//! dashboard summary. Status changes go through [`OrderStateMachine`].

use crate::state::{OrderStateError, OrderStateMachine};
use crate::utils::generate_order_id;
use chrono::Utc;
use std::cmp::Reverse;
use std::sync::Arc;
use storefront_types::{
	current_timestamp_millis, truncate_id, CreateOrderRequest, DashboardStats, Order, OrderFilter,
	OrderListResponse, PaymentStatus, RegistrationForm, ReviewDecision, ReviewStatus,
};
use thiserror::Error;
use tracing::instrument;

const DEFAULT_LIST_LIMIT: usize = 100;
const RECENT_ORDERS: usize = 10;

/// Errors returned by [`OrderService`].
#[derive(Debug, Error)]
pub enum OrderServiceError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Failed precondition: {0}")]
	FailedPrecondition(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStateError> for OrderServiceError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => OrderServiceError::NotFound(id),
			OrderStateError::AlreadyExists(id) => OrderServiceError::AlreadyExists(id),
			OrderStateError::InvalidTransition { from, to } => OrderServiceError::FailedPrecondition(
				format!("review cannot move from {} to {}", from, to),
			),
			OrderStateError::Storage(msg) => OrderServiceError::Storage(msg),
		}
	}
}

/// Service for creating, reviewing and listing orders.
pub struct OrderService {
	state_machine: Arc<OrderStateMachine>,
}

impl OrderService {
	pub fn new(state_machine: Arc<OrderStateMachine>) -> Self {
		Self { state_machine }
	}

	/// Creates an order with both status tracks at `pending`.
	///
	/// The subtotal is computed from the line items. The total defaults to
	/// subtotal plus shipping when the request does not carry one.
	#[instrument(skip_all, fields(user_id = %truncate_id(&request.user_id)))]
	pub async fn create_order(
		&self,
		request: CreateOrderRequest,
	) -> Result<Order, OrderServiceError> {
		if request.user_id.trim().is_empty() {
			return Err(OrderServiceError::InvalidArgument(
				"userId is required".into(),
			));
		}
		if request.items.is_empty() {
			return Err(OrderServiceError::InvalidArgument(
				"order must contain at least one item".into(),
			));
		}
		if let Some(item) = request.items.iter().find(|item| item.quantity == 0) {
			return Err(OrderServiceError::InvalidArgument(format!(
				"item '{}' has zero quantity",
				item.product_id
			)));
		}

		let subtotal = request
			.items
			.iter()
			.fold(0u64, |acc, item| acc.saturating_add(item.line_total()));
		let total_amount = request
			.total_amount
			.unwrap_or_else(|| subtotal.saturating_add(request.shipping_fee));
		if total_amount == 0 {
			return Err(OrderServiceError::InvalidArgument(
				"totalAmount must be greater than zero".into(),
			));
		}

		let id = match request.order_id {
			Some(id) if id.trim().is_empty() => {
				return Err(OrderServiceError::InvalidArgument(
					"orderId cannot be blank".into(),
				))
			},
			Some(id) => id,
			None => generate_order_id(Utc::now()),
		};

		let now = current_timestamp_millis();
		let order = Order {
			id,
			user_id: request.user_id,
			customer: request.customer,
			items: request.items,
			subtotal,
			shipping_fee: request.shipping_fee,
			total_amount,
			review_status: ReviewStatus::Pending,
			review_note: String::new(),
			reviewed_at: None,
			payment_status: PaymentStatus::Pending,
			registration_form: request.registration_form,
			trade_no: None,
			trade_date: None,
			payment: None,
			created_at: now,
			updated_at: now,
		};

		self.state_machine.store_order(&order).await?;
		tracing::info!(
			order_id = %truncate_id(&order.id),
			total = order.total_amount,
			"Order created"
		);
		Ok(order)
	}

	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderServiceError> {
		Ok(self.state_machine.get_order(order_id).await?)
	}

	/// Approves or rejects a pending registration.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), decision = ?decision))]
	pub async fn review_order(
		&self,
		order_id: &str,
		decision: ReviewDecision,
		note: String,
	) -> Result<Order, OrderServiceError> {
		let target = match decision {
			ReviewDecision::Approve => ReviewStatus::Approved,
			ReviewDecision::Reject => ReviewStatus::Rejected,
		};

		let order = self
			.state_machine
			.transition_review(order_id, target, note)
			.await?;
		tracing::info!(status = %order.review_status, "Order reviewed");
		Ok(order)
	}

	/// Replaces the registration form.
	///
	/// A rejected order goes back to `pending` review with its note cleared.
	/// Approved orders cannot change their document.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn resubmit_registration_form(
		&self,
		order_id: &str,
		form: RegistrationForm,
	) -> Result<Order, OrderServiceError> {
		if form.url.trim().is_empty() {
			return Err(OrderServiceError::InvalidArgument(
				"registration form url is required".into(),
			));
		}

		let order = self
			.state_machine
			.try_update_order_with(order_id, |order| match order.review_status {
				ReviewStatus::Approved => Err(OrderServiceError::FailedPrecondition(
					"registration form of an approved order cannot be replaced".into(),
				)),
				ReviewStatus::Pending => {
					order.registration_form = Some(form);
					Ok(())
				},
				ReviewStatus::Rejected => {
					debug_assert!(OrderStateMachine::is_valid_review_transition(
						ReviewStatus::Rejected,
						ReviewStatus::Pending
					));
					order.registration_form = Some(form);
					order.review_status = ReviewStatus::Pending;
					order.review_note.clear();
					order.reviewed_at = None;
					Ok(())
				},
			})
			.await?;

		tracing::info!(status = %order.review_status, "Registration form replaced");
		Ok(order)
	}

	/// Lists orders newest first.
	pub async fn list_orders(
		&self,
		filter: OrderFilter,
	) -> Result<OrderListResponse, OrderServiceError> {
		let search = filter
			.search
			.as_deref()
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.map(str::to_lowercase);

		let mut orders: Vec<Order> = self
			.state_machine
			.all_orders()
			.await?
			.into_iter()
			.filter(|o| filter.review_status.is_none_or(|s| o.review_status == s))
			.filter(|o| filter.payment_status.is_none_or(|s| o.payment_status == s))
			.filter(|o| filter.user_id.as_ref().is_none_or(|u| &o.user_id == u))
			.filter(|o| search.as_deref().is_none_or(|q| matches_search(o, q)))
			.collect();

		sort_newest_first(&mut orders);
		let total = orders.len();
		orders.truncate(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT));

		Ok(OrderListResponse { orders, total })
	}

	/// Summarises review and payment figures over all orders.
	pub async fn dashboard_stats(&self) -> Result<DashboardStats, OrderServiceError> {
		let mut orders = self.state_machine.all_orders().await?;

		let mut stats = DashboardStats {
			total_orders: orders.len(),
			..Default::default()
		};
		for order in &orders {
			match order.review_status {
				ReviewStatus::Pending => stats.pending_orders += 1,
				ReviewStatus::Approved => stats.approved_orders += 1,
				ReviewStatus::Rejected => stats.rejected_orders += 1,
			}
			if order.payment_status == PaymentStatus::Paid {
				stats.paid_orders += 1;
				if order.review_status == ReviewStatus::Approved {
					stats.total_revenue = stats.total_revenue.saturating_add(order.total_amount);
				}
			}
		}

		sort_newest_first(&mut orders);
		orders.truncate(RECENT_ORDERS);
		stats.recent_orders = orders;

		Ok(stats)
	}
}

fn sort_newest_first(orders: &mut [Order]) {
	orders.sort_by(|a, b| {
		Reverse(a.created_at)
			.cmp(&Reverse(b.created_at))
			.then_with(|| a.id.cmp(&b.id))
	});
}

fn matches_search(order: &Order, query: &str) -> bool {
	[
		order.id.as_str(),
		order.customer.fullname.as_str(),
		order.customer.email.as_str(),
	]
	.iter()
	.any(|field| field.to_lowercase().starts_with(query))
}
