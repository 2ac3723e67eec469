//! Order state machine.
//!
//! An order moves along two independent tracks:
//!
//! - review: `pending -> approved | rejected`, and `rejected -> pending` when a
//!   new registration form is submitted. `approved` is final.
//! - payment: `pending -> paid | failed`, `failed -> paid | failed` for a new
//!   attempt. `paid` is final.
//!
//! Every change is one read-modify-write of the order document performed
//! under a lock, so two concurrent updates never interleave.

use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use storefront_storage::{StorageError, StorageService};
use storefront_types::{
	current_timestamp_millis, Order, PaymentDetail, PaymentStatus, ReviewStatus, StorageKey,
};
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: String, to: String },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
}

static REVIEW_TRANSITIONS: Lazy<HashMap<ReviewStatus, HashSet<ReviewStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		ReviewStatus::Pending,
		HashSet::from([ReviewStatus::Approved, ReviewStatus::Rejected]),
	);
	m.insert(ReviewStatus::Rejected, HashSet::from([ReviewStatus::Pending]));
	m.insert(ReviewStatus::Approved, HashSet::new()); // terminal
	m
});

static PAYMENT_TRANSITIONS: Lazy<HashMap<PaymentStatus, HashSet<PaymentStatus>>> =
	Lazy::new(|| {
		let mut m = HashMap::new();
		m.insert(
			PaymentStatus::Pending,
			HashSet::from([PaymentStatus::Paid, PaymentStatus::Failed]),
		);
		m.insert(
			PaymentStatus::Failed,
			HashSet::from([PaymentStatus::Paid, PaymentStatus::Failed]),
		);
		m.insert(PaymentStatus::Paid, HashSet::new()); // terminal
		m
	});

fn map_storage(order_id: &str, err: StorageError) -> OrderStateError {
	match err {
		StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
		other => OrderStateError::Storage(other.to_string()),
	}
}

/// Manages order state transitions and persistence.
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	write_lock: Mutex<()>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>) -> Self {
		Self {
			storage,
			write_lock: Mutex::new(()),
		}
	}

	/// Checks a review transition against the transition table.
	pub fn is_valid_review_transition(from: ReviewStatus, to: ReviewStatus) -> bool {
		REVIEW_TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Checks a payment transition against the transition table.
	pub fn is_valid_payment_transition(from: PaymentStatus, to: PaymentStatus) -> bool {
		PAYMENT_TRANSITIONS
			.get(&from)
			.is_some_and(|set| set.contains(&to))
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| map_storage(order_id, e))
	}

	/// Stores a new order, refusing to overwrite an existing one.
	pub async fn store_order(&self, order: &Order) -> Result<(), OrderStateError> {
		let _guard = self.write_lock.lock().await;
		let exists = self
			.storage
			.exists(StorageKey::Orders.as_str(), &order.id)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		if exists {
			return Err(OrderStateError::AlreadyExists(order.id.clone()));
		}

		self.storage
			.store(StorageKey::Orders.as_str(), &order.id, order)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Returns every stored order, in no particular order.
	pub async fn all_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		let orders = self
			.storage
			.retrieve_all::<Order>(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))?;
		Ok(orders.into_iter().map(|(_, order)| order).collect())
	}

	/// Applies a fallible update and persists the result as one write.
	///
	/// Nothing is written when `updater` fails. `updated_at` is stamped on
	/// success.
	pub async fn try_update_order_with<F, E>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, E>
	where
		F: FnOnce(&mut Order) -> Result<(), E>,
		E: From<OrderStateError>,
	{
		let _guard = self.write_lock.lock().await;

		let mut order = self.get_order(order_id).await?;
		updater(&mut order)?;
		order.updated_at = current_timestamp_millis();

		self.storage
			.update(StorageKey::Orders.as_str(), order_id, &order)
			.await
			.map_err(|e| map_storage(order_id, e))?;

		Ok(order)
	}

	/// Updates an order with a closure and persists it.
	pub async fn update_order_with<F>(
		&self,
		order_id: &str,
		updater: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order),
	{
		self.try_update_order_with(order_id, |order| {
			updater(order);
			Ok::<(), OrderStateError>(())
		})
		.await
	}

	/// Moves the review track to `to`, recording the note and review time.
	pub async fn transition_review(
		&self,
		order_id: &str,
		to: ReviewStatus,
		note: String,
	) -> Result<Order, OrderStateError> {
		self.try_update_order_with(order_id, |order| {
			if !Self::is_valid_review_transition(order.review_status, to) {
				return Err(OrderStateError::InvalidTransition {
					from: order.review_status.to_string(),
					to: to.to_string(),
				});
			}
			order.review_status = to;
			order.review_note = note;
			if to == ReviewStatus::Pending {
				order.reviewed_at = None;
			} else {
				order.reviewed_at = Some(current_timestamp_millis());
			}
			Ok(())
		})
		.await
	}

	/// Moves the payment track to `to` and stores the settlement details in
	/// the same write.
	pub async fn transition_payment(
		&self,
		order_id: &str,
		to: PaymentStatus,
		detail: PaymentDetail,
	) -> Result<Order, OrderStateError> {
		self.try_update_order_with(order_id, |order| {
			if !Self::is_valid_payment_transition(order.payment_status, to) {
				return Err(OrderStateError::InvalidTransition {
					from: order.payment_status.to_string(),
					to: to.to_string(),
				});
			}
			order.payment_status = to;
			order.payment = Some(detail);
			Ok(())
		})
		.await
	}

	/// Records `trade_no` as belonging to `order_id`.
	pub async fn index_trade_no(
		&self,
		trade_no: &str,
		order_id: &str,
	) -> Result<(), OrderStateError> {
		self.storage
			.store(
				StorageKey::OrderByTradeNo.as_str(),
				trade_no,
				&order_id.to_string(),
			)
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Finds the order a trade number was issued for.
	pub async fn find_by_trade_no(&self, trade_no: &str) -> Result<Option<Order>, OrderStateError> {
		let order_id: String = match self
			.storage
			.retrieve(StorageKey::OrderByTradeNo.as_str(), trade_no)
			.await
		{
			Ok(id) => id,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(OrderStateError::Storage(e.to_string())),
		};

		match self.get_order(&order_id).await {
			Ok(order) => Ok(Some(order)),
			Err(OrderStateError::OrderNotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}
}

#[cfg(test)]
pub(crate) mod tests {
	use super::*;
	use storefront_storage::implementations::memory::MemoryStorage;
	use storefront_types::{CustomerInfo, OrderItem};

	pub(crate) fn sample_order(id: &str, user_id: &str) -> Order {
		Order {
			id: id.to_string(),
			user_id: user_id.to_string(),
			customer: CustomerInfo {
				fullname: "王小明".into(),
				email: "ming@example.com".into(),
				..Default::default()
			},
			items: vec![OrderItem {
				product_id: "iso-9001".into(),
				name: "ISO 9001 內部稽核員".into(),
				price: 1200,
				quantity: 1,
			}],
			subtotal: 1200,
			shipping_fee: 0,
			total_amount: 1200,
			review_status: ReviewStatus::Pending,
			review_note: String::new(),
			reviewed_at: None,
			payment_status: PaymentStatus::Pending,
			registration_form: None,
			trade_no: None,
			trade_date: None,
			payment: None,
			created_at: 1_700_000_000_000,
			updated_at: 1_700_000_000_000,
		}
	}

	fn machine() -> OrderStateMachine {
		OrderStateMachine::new(Arc::new(StorageService::new(Box::new(MemoryStorage::new()))))
	}

	#[test]
	fn test_review_transition_table() {
		use ReviewStatus::*;
		assert!(OrderStateMachine::is_valid_review_transition(Pending, Approved));
		assert!(OrderStateMachine::is_valid_review_transition(Pending, Rejected));
		assert!(OrderStateMachine::is_valid_review_transition(Rejected, Pending));
		assert!(!OrderStateMachine::is_valid_review_transition(Rejected, Approved));
		assert!(!OrderStateMachine::is_valid_review_transition(Approved, Rejected));
		assert!(!OrderStateMachine::is_valid_review_transition(Approved, Pending));
		assert!(!OrderStateMachine::is_valid_review_transition(Pending, Pending));
	}

	#[test]
	fn test_payment_transition_table() {
		use PaymentStatus::*;
		assert!(OrderStateMachine::is_valid_payment_transition(Pending, Paid));
		assert!(OrderStateMachine::is_valid_payment_transition(Pending, Failed));
		assert!(OrderStateMachine::is_valid_payment_transition(Failed, Paid));
		assert!(OrderStateMachine::is_valid_payment_transition(Failed, Failed));
		assert!(!OrderStateMachine::is_valid_payment_transition(Paid, Failed));
		assert!(!OrderStateMachine::is_valid_payment_transition(Paid, Paid));
		assert!(!OrderStateMachine::is_valid_payment_transition(Failed, Pending));
	}

	#[tokio::test]
	async fn test_store_refuses_duplicate_id() {
		let machine = machine();
		let order = sample_order("ORDER_20240101_AAAAAA", "u1");
		machine.store_order(&order).await.unwrap();
		assert!(matches!(
			machine.store_order(&order).await,
			Err(OrderStateError::AlreadyExists(_))
		));
	}

	#[tokio::test]
	async fn test_review_approve_stamps_time() {
		let machine = machine();
		machine
			.store_order(&sample_order("O1", "u1"))
			.await
			.unwrap();

		let order = machine
			.transition_review("O1", ReviewStatus::Approved, "ok".into())
			.await
			.unwrap();
		assert_eq!(order.review_status, ReviewStatus::Approved);
		assert_eq!(order.review_note, "ok");
		assert!(order.reviewed_at.is_some());
		assert!(order.updated_at > 1_700_000_000_000);

		let err = machine
			.transition_review("O1", ReviewStatus::Rejected, String::new())
			.await
			.unwrap_err();
		assert!(matches!(err, OrderStateError::InvalidTransition { .. }));
		// rejected attempt left the stored order untouched
		let stored = machine.get_order("O1").await.unwrap();
		assert_eq!(stored.review_status, ReviewStatus::Approved);
	}

	#[tokio::test]
	async fn test_payment_transition_writes_detail_together() {
		let machine = machine();
		machine
			.store_order(&sample_order("O1", "u1"))
			.await
			.unwrap();

		let detail = PaymentDetail {
			trade_no: "2311151200000001".into(),
			rtn_code: "1".into(),
			..Default::default()
		};
		let order = machine
			.transition_payment("O1", PaymentStatus::Paid, detail.clone())
			.await
			.unwrap();
		assert_eq!(order.payment_status, PaymentStatus::Paid);
		assert_eq!(order.payment, Some(detail));

		let err = machine
			.transition_payment("O1", PaymentStatus::Failed, PaymentDetail::default())
			.await
			.unwrap_err();
		assert!(matches!(err, OrderStateError::InvalidTransition { .. }));
	}

	#[tokio::test]
	async fn test_missing_order_is_not_found() {
		let machine = machine();
		assert!(matches!(
			machine.get_order("nope").await,
			Err(OrderStateError::OrderNotFound(_))
		));
		assert!(matches!(
			machine.update_order_with("nope", |_| {}).await,
			Err(OrderStateError::OrderNotFound(_))
		));
	}

	#[tokio::test]
	async fn test_trade_no_index() {
		let machine = machine();
		machine
			.store_order(&sample_order("O1", "u1"))
			.await
			.unwrap();
		machine.index_trade_no("T1", "O1").await.unwrap();

		assert_eq!(machine.find_by_trade_no("T1").await.unwrap().unwrap().id, "O1");
		assert!(machine.find_by_trade_no("T2").await.unwrap().is_none());

		// dangling index entries resolve to nothing
		machine.index_trade_no("T3", "gone").await.unwrap();
		assert!(machine.find_by_trade_no("T3").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_concurrent_updates_are_not_lost() {
		let machine = Arc::new(machine());
		machine
			.store_order(&sample_order("O1", "u1"))
			.await
			.unwrap();

		let mut handles = Vec::new();
		for _ in 0..20 {
			let machine = machine.clone();
			handles.push(tokio::spawn(async move {
				machine
					.update_order_with("O1", |o| o.shipping_fee += 1)
					.await
					.unwrap();
			}));
		}
		for handle in handles {
			handle.await.unwrap();
		}

		assert_eq!(machine.get_order("O1").await.unwrap().shipping_fee, 20);
	}
}
