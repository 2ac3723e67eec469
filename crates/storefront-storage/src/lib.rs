//! Storage for storefront orders.
//!
//! A small key-value abstraction with pluggable backends. Keys are
//! `<namespace>:<id>` strings; values are JSON documents. The in-memory
//! backend serves tests and local development, the file backend keeps data
//! across restarts with optional per-namespace expiry.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use storefront_types::{ConfigSchema, ImplementationRegistry};
use thiserror::Error;

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// Error that occurs when a requested item is not found.
	#[error("Not found")]
	NotFound,
	/// Error that occurs during serialization/deserialization.
	#[error("Serialization error: {0}")]
	Serialization(String),
	/// Error that occurs in the storage backend.
	#[error("Backend error: {0}")]
	Backend(String),
	/// Error that occurs during configuration validation.
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface every storage backend implements.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes with optional time-to-live.
	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists live keys starting with `prefix`, in no particular order.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Removes expired entries and returns how many were removed.
	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		Ok(0)
	}
}

/// Builds a backend from its `[storage.implementations.<name>]` table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Registry trait for storage implementations.
pub trait StorageRegistry: ImplementationRegistry<Factory = StorageFactory> {}

/// Returns `(name, factory)` for every built-in backend.
pub fn get_all_implementations() -> Vec<(&'static str, StorageFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

fn make_key(namespace: &str, id: &str) -> String {
	format!("{}:{}", namespace, id)
}

/// Typed JSON operations over a [`StorageInterface`] backend.
pub struct StorageService {
	backend: Box<dyn StorageInterface>,
}

impl StorageService {
	/// Creates a new StorageService with the specified backend.
	pub fn new(backend: Box<dyn StorageInterface>) -> Self {
		Self { backend }
	}

	/// Stores a serializable value with optional time-to-live.
	pub async fn store_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes(&make_key(namespace, id), bytes, ttl)
			.await
	}

	/// Stores a value, creating or overwriting it.
	pub async fn store<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.store_with_ttl(namespace, id, data, None).await
	}

	/// Retrieves and deserializes a value from storage.
	pub async fn retrieve<T: DeserializeOwned>(
		&self,
		namespace: &str,
		id: &str,
	) -> Result<T, StorageError> {
		let bytes = self.backend.get_bytes(&make_key(namespace, id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Retrieves every value in `namespace` as `(id, value)` pairs.
	///
	/// Entries that disappear between listing and reading are skipped.
	pub async fn retrieve_all<T: DeserializeOwned>(
		&self,
		namespace: &str,
	) -> Result<Vec<(String, T)>, StorageError> {
		let prefix = make_key(namespace, "");
		let keys = self.backend.list_keys(&prefix).await?;

		let mut items = Vec::with_capacity(keys.len());
		for key in keys {
			let bytes = match self.backend.get_bytes(&key).await {
				Ok(bytes) => bytes,
				Err(StorageError::NotFound) => continue,
				Err(e) => return Err(e),
			};
			let value = serde_json::from_slice(&bytes)
				.map_err(|e| StorageError::Serialization(format!("{}: {}", key, e)))?;
			let id = key[prefix.len()..].to_string();
			items.push((id, value));
		}
		Ok(items)
	}

	/// Removes a value from storage.
	pub async fn remove(&self, namespace: &str, id: &str) -> Result<(), StorageError> {
		self.backend.delete(&make_key(namespace, id)).await
	}

	/// Overwrites an existing value; fails with `NotFound` if absent.
	pub async fn update<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
	) -> Result<(), StorageError> {
		self.update_with_ttl(namespace, id, data, None).await
	}

	/// Overwrites an existing value with a time-to-live.
	pub async fn update_with_ttl<T: Serialize>(
		&self,
		namespace: &str,
		id: &str,
		data: &T,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let key = make_key(namespace, id);

		if !self.backend.exists(&key).await? {
			return Err(StorageError::NotFound);
		}

		let bytes =
			serde_json::to_vec(data).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes, ttl).await
	}

	/// Checks if a value exists in storage.
	pub async fn exists(&self, namespace: &str, id: &str) -> Result<bool, StorageError> {
		self.backend.exists(&make_key(namespace, id)).await
	}

	/// Removes expired entries from storage.
	///
	/// This is a no-op for backends that don't support TTL.
	pub async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		self.backend.cleanup_expired().await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStorage;
	use serde::Deserialize;

	#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
	struct Doc {
		name: String,
		amount: u64,
	}

	fn service() -> StorageService {
		StorageService::new(Box::new(MemoryStorage::new()))
	}

	#[tokio::test]
	async fn test_store_and_retrieve() {
		let storage = service();
		let doc = Doc {
			name: "ISO 9001".into(),
			amount: 1200,
		};

		storage.store("orders", "A1", &doc).await.unwrap();
		let back: Doc = storage.retrieve("orders", "A1").await.unwrap();
		assert_eq!(back, doc);
		assert!(storage.exists("orders", "A1").await.unwrap());
		assert!(!storage.exists("orders", "A2").await.unwrap());
	}

	#[tokio::test]
	async fn test_update_requires_existing() {
		let storage = service();
		let doc = Doc {
			name: "x".into(),
			amount: 1,
		};

		let result = storage.update("orders", "missing", &doc).await;
		assert!(matches!(result, Err(StorageError::NotFound)));

		storage.store("orders", "present", &doc).await.unwrap();
		let updated = Doc { amount: 2, ..doc };
		storage.update("orders", "present", &updated).await.unwrap();
		let back: Doc = storage.retrieve("orders", "present").await.unwrap();
		assert_eq!(back.amount, 2);
	}

	#[tokio::test]
	async fn test_retrieve_all_is_namespaced() {
		let storage = service();
		for (ns, id) in [("orders", "A"), ("orders", "B"), ("order_by_trade_no", "T1")] {
			storage
				.store(
					ns,
					id,
					&Doc {
						name: id.into(),
						amount: 0,
					},
				)
				.await
				.unwrap();
		}

		let mut all: Vec<(String, Doc)> = storage.retrieve_all("orders").await.unwrap();
		all.sort_by(|a, b| a.0.cmp(&b.0));
		let ids: Vec<_> = all.iter().map(|(id, _)| id.as_str()).collect();
		assert_eq!(ids, vec!["A", "B"]);
	}

	#[tokio::test]
	async fn test_retrieve_wrong_shape_is_serialization_error() {
		let storage = service();
		storage.store("orders", "A", &"just a string").await.unwrap();
		let result: Result<Doc, _> = storage.retrieve("orders", "A").await;
		assert!(matches!(result, Err(StorageError::Serialization(_))));
	}

	#[test]
	fn test_registered_implementations() {
		let names: Vec<_> = get_all_implementations()
			.into_iter()
			.map(|(name, _)| name)
			.collect();
		assert!(names.contains(&"file"));
		assert!(names.contains(&"memory"));
	}
}
