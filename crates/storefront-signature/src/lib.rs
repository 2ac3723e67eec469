//! CheckMacValue signing for the ECPay AIO checkout gateway.
//!
//! The gateway authenticates both directions of a payment with a shared
//! secret pair (hash key and hash IV). A flat parameter map is canonicalized
//! by sorting its keys, bracketed with the secrets, percent-encoded with the
//! gateway's legacy encoder, lowercased and hashed with SHA-256. The
//! uppercase hex digest travels as `CheckMacValue`.
//!
//! ```
//! use storefront_signature::{GatewayCredentials, ParameterMap, SignatureEngine};
//!
//! let engine = SignatureEngine::new(GatewayCredentials::new(
//! 	"5294y06JbISpM5x9",
//! 	"v77hoKGq4kWxNNIS",
//! ));
//! let mut params = ParameterMap::new();
//! params.insert("MerchantID".into(), "2000132".into());
//! params.insert("TotalAmount".into(), 100i64.into());
//!
//! let mac = engine.sign(&params).unwrap();
//! assert_eq!(mac.len(), 64);
//! ```

use thiserror::Error;

pub mod encoding;
pub mod engine;
pub mod params;

pub use encoding::{escape_html_attribute, legacy_url_encode};
pub use engine::{
	canonical_string, generate_check_mac_value, GatewayCredentials, SignatureEngine,
	CHECK_MAC_VALUE_FIELD,
};
pub use params::{params_from_json, params_from_pairs, ParamValue, ParameterMap};

/// Errors raised while preparing parameters for signing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
	/// A parameter was not a string or an integer, or the input already
	/// carried a signature.
	#[error("Invalid argument for field '{field}': {kind}")]
	InvalidArgument { field: String, kind: String },
}
