//! Storage namespaces used by the storefront.

use std::str::FromStr;

/// Storage keys for the different data collections.
///
/// Replaces string literals with typed namespaces when talking to the
/// storage service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageKey {
	/// Order documents, keyed by order id.
	Orders,
	/// Index from merchant trade number to order id.
	OrderByTradeNo,
}

impl StorageKey {
	/// Returns the string representation of the storage key.
	pub fn as_str(&self) -> &'static str {
		match self {
			StorageKey::Orders => "orders",
			StorageKey::OrderByTradeNo => "order_by_trade_no",
		}
	}

	/// Returns an iterator over all StorageKey variants.
	pub fn all() -> impl Iterator<Item = Self> {
		[Self::Orders, Self::OrderByTradeNo].into_iter()
	}
}

impl FromStr for StorageKey {
	type Err = ();

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"orders" => Ok(Self::Orders),
			"order_by_trade_no" => Ok(Self::OrderByTradeNo),
			_ => Err(()),
		}
	}
}

impl From<StorageKey> for &'static str {
	fn from(key: StorageKey) -> Self {
		key.as_str()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_round_trip_through_str() {
		for key in StorageKey::all() {
			assert_eq!(key.as_str().parse::<StorageKey>(), Ok(key));
		}
		assert!("intents".parse::<StorageKey>().is_err());
	}
}
