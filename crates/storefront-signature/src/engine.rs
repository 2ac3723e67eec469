//! CheckMacValue computation and verification.

use crate::encoding::legacy_url_encode;
use crate::params::ParameterMap;
use crate::SignatureError;
use sha2::{Digest, Sha256};
use storefront_types::SecretString;
use subtle::ConstantTimeEq;

/// Name of the signature field in gateway requests and callbacks.
pub const CHECK_MAC_VALUE_FIELD: &str = "CheckMacValue";

/// Builds `HashKey=<key>&k1=v1&k2=v2...&HashIV=<iv>` with keys in sorted order.
pub fn canonical_string(params: &ParameterMap, hash_key: &str, hash_iv: &str) -> String {
	let joined = params
		.iter()
		.map(|(key, value)| format!("{}={}", key, value))
		.collect::<Vec<_>>()
		.join("&");

	format!("HashKey={}&{}&HashIV={}", hash_key, joined, hash_iv)
}

/// Computes the uppercase hex SHA-256 `CheckMacValue` for `params`.
///
/// `params` must not contain the signature field itself; callers that hold a
/// full callback body should go through [`SignatureEngine::verify`].
pub fn generate_check_mac_value(params: &ParameterMap, hash_key: &str, hash_iv: &str) -> String {
	let raw = canonical_string(params, hash_key, hash_iv);
	let encoded = legacy_url_encode(&raw).to_lowercase();
	let digest = Sha256::digest(encoded.as_bytes());
	hex::encode_upper(digest)
}

/// The shared secrets issued by the gateway for one merchant account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCredentials {
	pub hash_key: SecretString,
	pub hash_iv: SecretString,
}

impl GatewayCredentials {
	pub fn new(hash_key: impl Into<SecretString>, hash_iv: impl Into<SecretString>) -> Self {
		Self {
			hash_key: hash_key.into(),
			hash_iv: hash_iv.into(),
		}
	}
}

/// Signs outbound payment requests and authenticates inbound callbacks.
///
/// Holds read-only credentials selected at start-up; every method is a pure
/// function of its arguments and the credentials, so one engine can be shared
/// across any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct SignatureEngine {
	credentials: GatewayCredentials,
}

impl SignatureEngine {
	pub fn new(credentials: GatewayCredentials) -> Self {
		Self { credentials }
	}

	/// Returns the `CheckMacValue` for `params`.
	///
	/// Fails if `params` already carries a `CheckMacValue`, since signing a
	/// map that contains its own signature can never verify.
	pub fn sign(&self, params: &ParameterMap) -> Result<String, SignatureError> {
		if params.contains_key(CHECK_MAC_VALUE_FIELD) {
			return Err(SignatureError::InvalidArgument {
				field: CHECK_MAC_VALUE_FIELD.to_string(),
				kind: "signature field present in input".to_string(),
			});
		}
		Ok(self.compute(params))
	}

	/// Signs `params` and inserts the result under `CheckMacValue`.
	pub fn sign_into(&self, params: &mut ParameterMap) -> Result<String, SignatureError> {
		let mac = self.sign(params)?;
		params.insert(CHECK_MAC_VALUE_FIELD.to_string(), mac.clone().into());
		Ok(mac)
	}

	/// Checks the signature carried under `field_name`.
	///
	/// The field is removed from a copy of the map, the remainder is signed
	/// with the same credentials and the two values are compared exactly:
	/// a lowercase rendering of a valid signature does not verify. A map
	/// without the field never verifies.
	pub fn verify(&self, params_with_signature: &ParameterMap, field_name: &str) -> bool {
		let mut remainder = params_with_signature.clone();
		let received = match remainder.remove(field_name) {
			Some(value) => value.to_string(),
			None => return false,
		};

		let expected = self.compute(&remainder);
		expected.as_bytes().ct_eq(received.as_bytes()).into()
	}

	fn compute(&self, params: &ParameterMap) -> String {
		self.credentials.hash_key.with_exposed(|key| {
			self.credentials
				.hash_iv
				.with_exposed(|iv| generate_check_mac_value(params, key, iv))
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::params::{params_from_pairs, ParamValue};

	const HASH_KEY: &str = "5294y06JbISpM5x9";
	const HASH_IV: &str = "v77hoKGq4kWxNNIS";

	fn engine() -> SignatureEngine {
		SignatureEngine::new(GatewayCredentials::new(HASH_KEY, HASH_IV))
	}

	fn scenario_params(total: i64) -> ParameterMap {
		let mut params = ParameterMap::new();
		params.insert("MerchantID".into(), "2000132".into());
		params.insert("MerchantTradeNo".into(), "ABC123".into());
		params.insert("TotalAmount".into(), ParamValue::Integer(total));
		params
	}

	fn is_upper_hex(s: &str) -> bool {
		s.len() == 64 && s.chars().all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
	}

	#[test]
	fn test_canonical_string_layout() {
		let params = params_from_pairs([("b", "2"), ("a", "1")]);
		assert_eq!(
			canonical_string(&params, "K", "IV"),
			"HashKey=K&a=1&b=2&HashIV=IV"
		);
	}

	#[test]
	fn test_end_to_end_scenario() {
		let sig_100 = engine().sign(&scenario_params(100)).unwrap();
		let sig_101 = engine().sign(&scenario_params(101)).unwrap();

		assert!(is_upper_hex(&sig_100));
		assert!(is_upper_hex(&sig_101));
		assert_eq!(
			sig_100,
			"A98F545C56F1AC3E6A6E34B96591C9BACEDB59BDF1FE11DD31E2CB1971148CE8"
		);
		assert_eq!(
			sig_101,
			"EC8E32284B7EC9624ADAAAB7A6D6F46B404EC00E9E4F716F6D96EAE29E13585B"
		);
	}

	#[test]
	fn test_published_gateway_vector() {
		// Worked example from the gateway's AIO integration guide.
		let mut params = ParameterMap::new();
		params.insert("ChoosePayment".into(), "ALL".into());
		params.insert("EncryptType".into(), ParamValue::Integer(1));
		params.insert("ItemName".into(), "Apple iphone 15".into());
		params.insert("MerchantID".into(), "3002607".into());
		params.insert("MerchantTradeDate".into(), "2023/03/12 15:30:23".into());
		params.insert("MerchantTradeNo".into(), "ecpay20230312153023".into());
		params.insert("PaymentType".into(), "aio".into());
		params.insert(
			"ReturnURL".into(),
			"https://www.ecpay.com.tw/receive.php".into(),
		);
		params.insert("TotalAmount".into(), ParamValue::Integer(30000));
		params.insert("TradeDesc".into(), "促銷方案".into());

		assert_eq!(
			generate_check_mac_value(&params, "pwFHCqoQZGmho4w6", "EkRm7iFT261dpevs"),
			"6C51C9E6888DE861FD62FB1DD17029FC742634498FD813DC43D4243B5685B840"
		);
	}

	#[test]
	fn test_determinism() {
		let params = scenario_params(100);
		assert_eq!(engine().sign(&params).unwrap(), engine().sign(&params).unwrap());
	}

	#[test]
	fn test_key_order_independence() {
		let forward = params_from_pairs([("MerchantID", "2000132"), ("TotalAmount", "100")]);
		let backward = params_from_pairs([("TotalAmount", "100"), ("MerchantID", "2000132")]);
		assert_eq!(engine().sign(&forward).unwrap(), engine().sign(&backward).unwrap());
	}

	#[test]
	fn test_integer_and_text_sign_identically() {
		// callbacks arrive as form strings, requests are built with integers
		let text = params_from_pairs([
			("MerchantID", "2000132"),
			("MerchantTradeNo", "ABC123"),
			("TotalAmount", "100"),
		]);
		assert_eq!(
			engine().sign(&text).unwrap(),
			engine().sign(&scenario_params(100)).unwrap()
		);
	}

	#[test]
	fn test_round_trip() {
		let mut params = scenario_params(100);
		params.insert("ItemName".into(), "ISO 27001 主導稽核員 課程".into());
		params.insert("ReturnURL".into(), "https://x.example/ecpay/callback".into());
		engine().sign_into(&mut params).unwrap();
		assert!(engine().verify(&params, CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_verify_is_case_sensitive() {
		let mut params = scenario_params(100);
		let mac = engine().sign(&params).unwrap();
		params.insert(CHECK_MAC_VALUE_FIELD.into(), mac.to_lowercase().into());
		assert!(!engine().verify(&params, CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_tampered_value_fails() {
		let mut params = scenario_params(100);
		engine().sign_into(&mut params).unwrap();

		let mut tampered = params.clone();
		tampered.insert("MerchantTradeNo".into(), "ABC124".into());
		assert!(!engine().verify(&tampered, CHECK_MAC_VALUE_FIELD));

		let mut added = params.clone();
		added.insert("RtnCode".into(), "1".into());
		assert!(!engine().verify(&added, CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_single_character_edits_change_signature() {
		let base = engine().sign(&scenario_params(100)).unwrap();
		let original = "2000132";
		for i in 0..original.len() {
			let mut edited: Vec<char> = original.chars().collect();
			edited[i] = if edited[i] == '9' { '8' } else { '9' };
			let mut params = scenario_params(100);
			params.insert("MerchantID".into(), edited.into_iter().collect::<String>().into());
			assert_ne!(engine().sign(&params).unwrap(), base);
		}
	}

	#[test]
	fn test_wrong_secrets_fail() {
		let mut params = scenario_params(100);
		engine().sign_into(&mut params).unwrap();

		let other_key = SignatureEngine::new(GatewayCredentials::new("5294y06JbISpM5x8", HASH_IV));
		let other_iv = SignatureEngine::new(GatewayCredentials::new(HASH_KEY, "v77hoKGq4kWxNNIs"));
		assert!(!other_key.verify(&params, CHECK_MAC_VALUE_FIELD));
		assert!(!other_iv.verify(&params, CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_missing_signature_field_fails() {
		assert!(!engine().verify(&scenario_params(100), CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_custom_field_name() {
		let mut params = scenario_params(100);
		let mac = engine().sign(&params).unwrap();
		params.insert("Signature".into(), mac.into());
		assert!(engine().verify(&params, "Signature"));
		assert!(!engine().verify(&params, CHECK_MAC_VALUE_FIELD));
	}

	#[test]
	fn test_sign_rejects_embedded_signature() {
		let mut params = scenario_params(100);
		params.insert(CHECK_MAC_VALUE_FIELD.into(), "X".into());
		assert!(matches!(
			engine().sign(&params),
			Err(SignatureError::InvalidArgument { .. })
		));
	}

	#[test]
	fn test_callback_vector() {
		let params = params_from_pairs([
			("MerchantID", "2000132"),
			("MerchantTradeNo", "1700000000ABCDEFGHIJ"),
			("PaymentDate", "2023/11/15 12:00:00"),
			("PaymentType", "Credit_CreditCard"),
			("PaymentTypeChargeFee", "24"),
			("RtnCode", "1"),
			("RtnMsg", "交易成功"),
			("SimulatePaid", "0"),
			("TradeAmt", "1200"),
			("TradeDate", "2023/11/15 11:58:00"),
			("TradeNo", "2311151200000001"),
		]);
		assert_eq!(
			engine().sign(&params).unwrap(),
			"3828ABE0FB5748C73DBCEAC2E581DDD4BBAEE9EA2D55CAAD14CF5638D9B5506D"
		);
	}
}
