//! Helper utilities for common operations.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current UNIX timestamp in seconds, or 0 if the system clock is
/// before the epoch.
pub fn current_timestamp() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0)
}

/// Returns the current UNIX timestamp in milliseconds.
///
/// Order documents carry millisecond timestamps, matching what the storefront
/// front end writes and displays.
pub fn current_timestamp_millis() -> u64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}
