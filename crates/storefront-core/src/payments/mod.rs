//! Payment initiation and gateway callbacks.
//!
//! [`PaymentGateway::create_payment`] signs a checkout request for an
//! approved order and renders the form the browser posts to the gateway.
//! [`PaymentGateway::handle_callback`] authenticates the gateway's
//! server-to-server notification before it touches any order, and
//! [`PaymentGateway::resolve_return`] decides where the shopper's browser
//! lands afterwards.

mod form;
mod trade;

pub use form::render_payment_form;
pub use trade::{format_trade_date, generate_trade_no, MAX_TRADE_NO_LEN};

use crate::state::{OrderStateError, OrderStateMachine};
use chrono::Utc;
use std::sync::Arc;
use storefront_config::{ConfigError, GatewayConfig};
use storefront_signature::{
	GatewayCredentials, ParamValue, ParameterMap, SignatureEngine, SignatureError,
	CHECK_MAC_VALUE_FIELD,
};
use storefront_types::{truncate_id, Order, PaymentDetail, PaymentStatus, ReviewStatus};
use thiserror::Error;
use tracing::instrument;

/// Gateway limit on `ItemName`, in characters.
pub const MAX_ITEM_NAME_CHARS: usize = 200;

const RTN_CODE_SUCCESS: &str = "1";

/// Errors returned while preparing a payment.
#[derive(Debug, Error)]
pub enum PaymentError {
	#[error("Order not found: {0}")]
	NotFound(String),
	#[error("Permission denied: {0}")]
	PermissionDenied(String),
	#[error("Failed precondition: {0}")]
	FailedPrecondition(String),
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),
	#[error("Signature error: {0}")]
	Signature(#[from] SignatureError),
	#[error("State error: {0}")]
	State(String),
	#[error("Storage error: {0}")]
	Storage(String),
}

impl From<OrderStateError> for PaymentError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => PaymentError::NotFound(id),
			OrderStateError::Storage(msg) => PaymentError::Storage(msg),
			other => PaymentError::State(other.to_string()),
		}
	}
}

/// A request to start checkout for an order.
#[derive(Debug, Clone)]
pub struct PaymentRequest {
	pub order_id: String,
	/// Authenticated caller; must own the order.
	pub user_id: String,
	/// Overrides the item description shown on the gateway page.
	pub item_name: Option<String>,
	/// Storefront origin to send the shopper back to on cancel.
	pub client_back_url: Option<String>,
}

/// Signed checkout form.
#[derive(Debug, Clone)]
pub struct PaymentForm {
	/// Gateway checkout URL.
	pub action: String,
	/// Fields in submission order, `CheckMacValue` last.
	pub fields: Vec<(String, ParamValue)>,
	/// Auto-submitting HTML form.
	pub html: String,
}

impl PaymentForm {
	pub fn trade_no(&self) -> Option<&ParamValue> {
		self.field("MerchantTradeNo")
	}

	pub fn field(&self, name: &str) -> Option<&ParamValue> {
		self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
	}

	/// Fields as a JSON object.
	pub fn params_json(&self) -> serde_json::Map<String, serde_json::Value> {
		self.fields
			.iter()
			.map(|(k, v)| {
				let value = match v {
					ParamValue::Integer(n) => serde_json::Value::from(*n),
					ParamValue::Text(s) => serde_json::Value::from(s.as_str()),
				};
				(k.clone(), value)
			})
			.collect()
	}
}

/// Result of processing a gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
	/// Signature verified and the order recorded (or already paid).
	Accepted,
	/// `CheckMacValue` did not match.
	InvalidSignature,
	/// No order was issued the callback's trade number.
	OrderNotFound,
	/// Anything else went wrong.
	Error,
}

impl CallbackOutcome {
	/// HTTP status code the gateway expects for this outcome.
	pub fn status_code(&self) -> u16 {
		match self {
			CallbackOutcome::Accepted => 200,
			CallbackOutcome::InvalidSignature => 400,
			CallbackOutcome::OrderNotFound => 404,
			CallbackOutcome::Error => 500,
		}
	}

	/// Plain-text body the gateway expects for this outcome.
	pub fn body(&self) -> &'static str {
		match self {
			CallbackOutcome::Accepted => "1|OK",
			CallbackOutcome::InvalidSignature => "0|CheckMacValue verification failed",
			CallbackOutcome::OrderNotFound => "0|Order not found",
			CallbackOutcome::Error => "0|Error",
		}
	}
}

fn text_field(params: &ParameterMap, name: &str) -> String {
	params.get(name).map(ToString::to_string).unwrap_or_default()
}

fn trim_base(url: &str) -> &str {
	url.trim_end_matches('/')
}

/// Checkout and callback handling against one merchant account.
pub struct PaymentGateway {
	merchant_id: String,
	api_url: String,
	callback_base_url: String,
	storefront_base_url: String,
	trade_desc: String,
	choose_payment: String,
	signer: SignatureEngine,
	state_machine: Arc<OrderStateMachine>,
}

impl PaymentGateway {
	/// Builds a gateway for the environment selected in `config`.
	pub fn from_config(
		config: &GatewayConfig,
		state_machine: Arc<OrderStateMachine>,
	) -> Result<Self, ConfigError> {
		let env = config.active()?;
		tracing::info!(
			environment = %config.environment,
			merchant_id = %env.merchant_id,
			"Payment gateway configured"
		);

		Ok(Self {
			merchant_id: env.merchant_id,
			api_url: env.api_url,
			callback_base_url: trim_base(&config.callback_base_url).to_string(),
			storefront_base_url: trim_base(&config.storefront_base_url).to_string(),
			trade_desc: config.trade_desc.clone(),
			choose_payment: config.choose_payment.clone(),
			signer: SignatureEngine::new(GatewayCredentials::new(env.hash_key, env.hash_iv)),
			state_machine,
		})
	}

	/// Signature engine for this merchant.
	pub fn signer(&self) -> &SignatureEngine {
		&self.signer
	}

	/// Prepares a signed checkout form for an approved, unpaid order.
	///
	/// A fresh trade number is issued on every call and recorded on the
	/// order before the form is returned.
	#[instrument(skip_all, fields(order_id = %truncate_id(&request.order_id)))]
	pub async fn create_payment(&self, request: PaymentRequest) -> Result<PaymentForm, PaymentError> {
		let order = self.state_machine.get_order(&request.order_id).await?;
		Self::check_payable(&order, &request.user_id)?;

		let total = i64::try_from(order.total_amount)
			.ok()
			.filter(|t| *t > 0)
			.ok_or_else(|| {
				PaymentError::InvalidArgument(format!(
					"order total {} cannot be charged",
					order.total_amount
				))
			})?;

		let now = Utc::now();
		let now_millis = u64::try_from(now.timestamp_millis()).unwrap_or_default();
		let trade_no = generate_trade_no(now_millis);
		let trade_date = format_trade_date(now);

		self.state_machine
			.index_trade_no(&trade_no, &order.id)
			.await?;
		let user_id = request.user_id.clone();
		self.state_machine
			.try_update_order_with(&order.id, |o| {
				// the order may have changed since it was read
				Self::check_payable(o, &user_id)?;
				o.trade_no = Some(trade_no.clone());
				o.trade_date = Some(now_millis);
				Ok::<(), PaymentError>(())
			})
			.await?;

		let item_name = self.item_name(&order, request.item_name.as_deref());
		let back_base = request
			.client_back_url
			.as_deref()
			.map(trim_base)
			.filter(|s| !s.is_empty())
			.unwrap_or(self.storefront_base_url.as_str());

		let mut fields: Vec<(String, ParamValue)> = vec![
			("MerchantID".into(), self.merchant_id.as_str().into()),
			("MerchantTradeNo".into(), trade_no.as_str().into()),
			("MerchantTradeDate".into(), trade_date.into()),
			("PaymentType".into(), "aio".into()),
			("TotalAmount".into(), ParamValue::Integer(total)),
			("TradeDesc".into(), self.trade_desc.as_str().into()),
			("ItemName".into(), item_name.into()),
			(
				"ReturnURL".into(),
				format!("{}/ecpay/callback", self.callback_base_url).into(),
			),
			(
				"OrderResultURL".into(),
				format!("{}/ecpay/return", self.callback_base_url).into(),
			),
			(
				"ClientBackURL".into(),
				format!(
					"{}/checkout/step4?orderId={}",
					back_base,
					urlencoding::encode(&order.id)
				)
				.into(),
			),
			("ChoosePayment".into(), self.choose_payment.as_str().into()),
			("EncryptType".into(), ParamValue::Integer(1)),
		];

		let params: ParameterMap = fields.iter().cloned().collect();
		let mac = self.signer.sign(&params)?;
		fields.push((CHECK_MAC_VALUE_FIELD.to_string(), mac.into()));

		let html = render_payment_form(&self.api_url, &fields);
		tracing::info!(
			trade_no = %trade_no,
			total = total,
			"Payment form created"
		);

		Ok(PaymentForm {
			action: self.api_url.clone(),
			fields,
			html,
		})
	}

	fn check_payable(order: &Order, user_id: &str) -> Result<(), PaymentError> {
		if order.user_id != user_id {
			return Err(PaymentError::PermissionDenied(
				"order belongs to another user".into(),
			));
		}
		if order.payment_status == PaymentStatus::Paid {
			return Err(PaymentError::FailedPrecondition(
				"order has already been paid".into(),
			));
		}
		if order.review_status != ReviewStatus::Approved {
			return Err(PaymentError::FailedPrecondition(format!(
				"order review is {}, payment requires approval",
				order.review_status
			)));
		}
		Ok(())
	}

	fn item_name(&self, order: &Order, requested: Option<&str>) -> String {
		let name = requested
			.map(str::trim)
			.filter(|s| !s.is_empty())
			.or_else(|| order.items.first().map(|item| item.name.as_str()))
			.filter(|s| !s.is_empty())
			.unwrap_or(self.trade_desc.as_str());
		name.chars().take(MAX_ITEM_NAME_CHARS).collect()
	}

	/// Processes a server-to-server payment notification.
	///
	/// The signature is checked before anything else is read from `params`.
	pub async fn handle_callback(&self, params: ParameterMap) -> CallbackOutcome {
		if !self.signer.verify(&params, CHECK_MAC_VALUE_FIELD) {
			tracing::warn!(
				trade_no = %text_field(&params, "MerchantTradeNo"),
				"CheckMacValue verification failed"
			);
			return CallbackOutcome::InvalidSignature;
		}

		match self.apply_callback(&params).await {
			Ok(outcome) => outcome,
			Err(e) => {
				tracing::error!(error = %e, "Failed to process payment callback");
				CallbackOutcome::Error
			},
		}
	}

	#[instrument(skip_all, fields(trade_no = %text_field(params, "MerchantTradeNo")))]
	async fn apply_callback(&self, params: &ParameterMap) -> Result<CallbackOutcome, PaymentError> {
		let trade_no = text_field(params, "MerchantTradeNo");
		let Some(order) = self.state_machine.find_by_trade_no(&trade_no).await? else {
			tracing::warn!("No order for trade number");
			return Ok(CallbackOutcome::OrderNotFound);
		};

		if order.payment_status == PaymentStatus::Paid {
			tracing::info!(order_id = %truncate_id(&order.id), "Duplicate callback for paid order");
			return Ok(CallbackOutcome::Accepted);
		}

		let rtn_code = text_field(params, "RtnCode");
		let status = if rtn_code == RTN_CODE_SUCCESS {
			PaymentStatus::Paid
		} else {
			PaymentStatus::Failed
		};

		let trade_amt = text_field(params, "TradeAmt");
		if status == PaymentStatus::Paid && trade_amt != order.total_amount.to_string() {
			tracing::warn!(
				order_id = %truncate_id(&order.id),
				trade_amt = %trade_amt,
				expected = order.total_amount,
				"Paid amount differs from order total"
			);
		}

		let detail = PaymentDetail {
			trade_no: text_field(params, "TradeNo"),
			rtn_code,
			rtn_msg: text_field(params, "RtnMsg"),
			payment_date: text_field(params, "PaymentDate"),
			payment_type: text_field(params, "PaymentType"),
			payment_type_charge_fee: text_field(params, "PaymentTypeChargeFee"),
			trade_amt,
			updated_at: storefront_types::current_timestamp_millis(),
		};

		match self
			.state_machine
			.transition_payment(&order.id, status, detail)
			.await
		{
			Ok(updated) => {
				tracing::info!(
					order_id = %truncate_id(&updated.id),
					status = %updated.payment_status,
					"Order payment status updated"
				);
				Ok(CallbackOutcome::Accepted)
			},
			// a concurrent callback already marked it paid
			Err(OrderStateError::InvalidTransition { from, .. })
				if from == PaymentStatus::Paid.to_string() =>
			{
				Ok(CallbackOutcome::Accepted)
			},
			Err(OrderStateError::OrderNotFound(_)) => Ok(CallbackOutcome::OrderNotFound),
			Err(e) => Err(e.into()),
		}
	}

	/// Returns the storefront URL to redirect the shopper's browser to.
	///
	/// Never changes any order.
	pub async fn resolve_return(&self, params: &ParameterMap) -> String {
		let trade_no = text_field(params, "MerchantTradeNo");
		let order_id = match self.state_machine.find_by_trade_no(&trade_no).await {
			Ok(Some(order)) => order.id,
			Ok(None) => trade_no,
			Err(e) => {
				tracing::warn!(error = %e, "Order lookup failed during return");
				trade_no
			},
		};

		let order_id = urlencoding::encode(&order_id);
		if text_field(params, "RtnCode") == RTN_CODE_SUCCESS {
			format!(
				"{}/checkout/confirmation/{}?payment=success",
				self.storefront_base_url, order_id
			)
		} else {
			format!(
				"{}/checkout/step4?orderId={}&payment=failed",
				self.storefront_base_url, order_id
			)
		}
	}
}
