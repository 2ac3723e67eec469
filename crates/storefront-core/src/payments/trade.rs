//! Merchant trade numbers and trade dates.

use crate::utils::random_code;
use chrono::{DateTime, Duration, Utc};

/// Gateway limit on `MerchantTradeNo`.
pub const MAX_TRADE_NO_LEN: usize = 20;

/// Builds a trade number from the last ten digits of `timestamp_millis`
/// followed by ten random characters from `0-9A-Z`.
pub fn generate_trade_no(timestamp_millis: u64) -> String {
	let digits = timestamp_millis.to_string();
	let tail = &digits[digits.len().saturating_sub(10)..];
	format!("{}{}", tail, random_code(MAX_TRADE_NO_LEN - tail.len()))
}

/// Formats `now` as `YYYY/MM/DD HH:MM:SS` in Taiwan time (UTC+8).
pub fn format_trade_date(now: DateTime<Utc>) -> String {
	(now.naive_utc() + Duration::hours(8))
		.format("%Y/%m/%d %H:%M:%S")
		.to_string()
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::TimeZone;

	#[test]
	fn test_trade_no_layout() {
		let trade_no = generate_trade_no(1_700_000_123_456);
		assert_eq!(trade_no.len(), 20);
		assert!(trade_no.starts_with("0000123456"));
		assert!(trade_no[10..]
			.chars()
			.all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
	}

	#[test]
	fn test_short_timestamp_still_twenty_chars() {
		assert_eq!(generate_trade_no(42).len(), 20);
	}

	#[test]
	fn test_trade_date_is_utc_plus_eight() {
		let now = Utc.with_ymd_and_hms(2023, 12, 31, 17, 30, 5).unwrap();
		assert_eq!(format_trade_date(now), "2024/01/01 01:30:05");
	}
}
