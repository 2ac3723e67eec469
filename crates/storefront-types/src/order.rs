//! Order types for the storefront.
//!
//! An order carries two independent status tracks: the administrative review
//! of the uploaded registration form, and the payment outcome reported by the
//! gateway callback. Both are advanced by the order state machine in
//! `storefront-core`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A course registration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier, e.g. `ORDER_20240101_AB12CD`.
	pub id: String,
	/// Identifier of the user who placed the order.
	pub user_id: String,
	/// Contact and invoicing details entered at checkout.
	pub customer: CustomerInfo,
	/// Purchased items.
	pub items: Vec<OrderItem>,
	/// Sum of item prices before shipping.
	pub subtotal: u64,
	/// Shipping fee, usually zero for course registrations.
	#[serde(default)]
	pub shipping_fee: u64,
	/// Amount charged through the payment gateway.
	pub total_amount: u64,
	/// Administrative review status.
	pub review_status: ReviewStatus,
	/// Note left by the reviewer, shown to the customer on rejection.
	#[serde(default)]
	pub review_note: String,
	/// Timestamp (ms) of the last review decision.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub reviewed_at: Option<u64>,
	/// Payment status as reported by the gateway.
	pub payment_status: PaymentStatus,
	/// Uploaded registration form, if any.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub registration_form: Option<RegistrationForm>,
	/// Merchant trade number of the latest payment attempt.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub trade_no: Option<String>,
	/// Timestamp (ms) at which the latest trade number was issued.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub trade_date: Option<u64>,
	/// Settlement details from the last verified gateway callback.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment: Option<PaymentDetail>,
	/// Creation timestamp (ms).
	pub created_at: u64,
	/// Last update timestamp (ms).
	pub updated_at: u64,
}

/// Customer details captured on the shipping/contact step of checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerInfo {
	pub fullname: String,
	pub email: String,
	pub mobile: String,
	pub company_name: String,
	pub invoice_info: String,
	pub address: String,
	pub english_name: String,
	pub coupon_code: String,
}

/// A single purchased item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
	pub product_id: String,
	pub name: String,
	pub price: u64,
	#[serde(default = "default_quantity")]
	pub quantity: u32,
}

fn default_quantity() -> u32 {
	1
}

impl OrderItem {
	/// Price times quantity.
	pub fn line_total(&self) -> u64 {
		self.price.saturating_mul(u64::from(self.quantity))
	}
}

/// Metadata of an uploaded registration form document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationForm {
	pub file_name: String,
	pub url: String,
	pub uploaded_at: u64,
}

/// Settlement fields stored from a verified gateway callback.
///
/// Values are kept exactly as the gateway sent them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetail {
	pub trade_no: String,
	pub rtn_code: String,
	pub rtn_msg: String,
	pub payment_date: String,
	pub payment_type: String,
	pub payment_type_charge_fee: String,
	pub trade_amt: String,
	pub updated_at: u64,
}

/// Review status of the registration form attached to an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
	/// Waiting for an administrator.
	Pending,
	/// Accepted; the customer may pay.
	Approved,
	/// Refused; the customer may upload a new form.
	Rejected,
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
	/// No successful payment yet.
	Pending,
	/// Gateway reported success.
	Paid,
	/// Gateway reported a failure; a new attempt may follow.
	Failed,
}

impl fmt::Display for ReviewStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ReviewStatus::Pending => write!(f, "pending"),
			ReviewStatus::Approved => write!(f, "approved"),
			ReviewStatus::Rejected => write!(f, "rejected"),
		}
	}
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PaymentStatus::Pending => write!(f, "pending"),
			PaymentStatus::Paid => write!(f, "paid"),
			PaymentStatus::Failed => write!(f, "failed"),
		}
	}
}

impl FromStr for ReviewStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"approved" => Ok(Self::Approved),
			"rejected" => Ok(Self::Rejected),
			other => Err(format!("unknown review status '{}'", other)),
		}
	}
}

impl FromStr for PaymentStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"pending" => Ok(Self::Pending),
			"paid" => Ok(Self::Paid),
			"failed" => Ok(Self::Failed),
			other => Err(format!("unknown payment status '{}'", other)),
		}
	}
}
