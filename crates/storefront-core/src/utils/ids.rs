use chrono::{DateTime, Utc};
use rand::Rng;

const CODE_CHARSET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Returns `len` random characters drawn from `0-9A-Z`.
pub fn random_code(len: usize) -> String {
	let mut rng = rand::thread_rng();
	(0..len)
		.map(|_| CODE_CHARSET[rng.gen_range(0..CODE_CHARSET.len())] as char)
		.collect()
}

/// Builds an order id of the form `ORDER_<YYYYMMDD>_<XXXXXX>` using the UTC
/// date of `now`.
pub fn generate_order_id(now: DateTime<Utc>) -> String {
	format!("ORDER_{}_{}", now.format("%Y%m%d"), random_code(6))
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_random_code_charset() {
		let code = random_code(64);
		assert_eq!(code.len(), 64);
		assert!(code
			.chars()
			.all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
	}

	#[test]
	fn test_order_id_shape() {
		let now = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 0).unwrap();
		let id = generate_order_id(now);
		assert!(id.starts_with("ORDER_20240309_"));
		assert_eq!(id.len(), "ORDER_20240309_".len() + 6);
	}
}
