//! Assembly of a [`StorefrontEngine`] from configuration.
//!
//! Storage backends are supplied as named factories so the binary decides
//! which implementations are available; the builder picks the configured
//! primary and wires the order and payment services on top of it.

use crate::engine::StorefrontEngine;
use crate::orders::OrderService;
use crate::payments::PaymentGateway;
use crate::state::OrderStateMachine;
use std::collections::HashMap;
use std::sync::Arc;
use storefront_config::Config;
use storefront_storage::{StorageError, StorageInterface, StorageService};
use thiserror::Error;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions available to the builder, keyed by implementation name.
pub struct StorefrontFactories<SF> {
	pub storage_factories: HashMap<String, SF>,
}

/// Builder for constructing a StorefrontEngine.
pub struct StorefrontBuilder {
	config: Config,
}

impl StorefrontBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine using the configured primary storage backend.
	pub fn build<SF>(self, factories: StorefrontFactories<SF>) -> Result<StorefrontEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>,
	{
		let mut storage_impls = HashMap::new();
		for (name, config) in &self.config.storage.implementations {
			let Some(factory) = factories.storage_factories.get(name) else {
				tracing::warn!(
					component = "storage",
					implementation = %name,
					"Unknown storage implementation, skipping"
				);
				continue;
			};
			match factory(config) {
				Ok(implementation) => {
					storage_impls.insert(name.clone(), implementation);
					let is_primary = &self.config.storage.primary == name;
					tracing::info!(component = "storage", implementation = %name, enabled = %is_primary, "Loaded");
				},
				Err(e) => {
					tracing::error!(
						component = "storage",
						implementation = %name,
						error = %e,
						"Failed to create storage implementation"
					);
					return Err(BuilderError::Config(format!(
						"Failed to create storage implementation '{}': {}",
						name, e
					)));
				},
			}
		}

		let primary_storage = &self.config.storage.primary;
		let storage_backend = storage_impls.remove(primary_storage).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"primary storage '{}' is not available",
				primary_storage
			))
		})?;

		let storage = Arc::new(StorageService::new(storage_backend));
		let state_machine = Arc::new(OrderStateMachine::new(storage.clone()));
		let orders = Arc::new(OrderService::new(state_machine.clone()));
		let payments = Arc::new(
			PaymentGateway::from_config(&self.config.gateway, state_machine.clone())
				.map_err(|e| BuilderError::Config(e.to_string()))?,
		);

		Ok(StorefrontEngine::new(
			self.config,
			storage,
			state_machine,
			orders,
			payments,
		))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use storefront_config::builders::ConfigBuilder;
	use storefront_storage::get_all_implementations;

	fn factories() -> StorefrontFactories<storefront_storage::StorageFactory> {
		StorefrontFactories {
			storage_factories: get_all_implementations()
				.into_iter()
				.map(|(name, factory)| (name.to_string(), factory))
				.collect(),
		}
	}

	#[test]
	fn test_build_with_memory_storage() {
		let config = ConfigBuilder::new().build();
		let engine = StorefrontBuilder::new(config).build(factories()).unwrap();
		assert_eq!(engine.config().storage.primary, "memory");
	}

	#[test]
	fn test_unknown_primary_is_missing_component() {
		let config = ConfigBuilder::new().storage_primary("redis").build();
		let result = StorefrontBuilder::new(config).build(factories());
		assert!(matches!(result, Err(BuilderError::MissingComponent(_))));
	}

	#[tokio::test]
	async fn test_run_until_stops_on_shutdown() {
		let config = ConfigBuilder::new().build();
		let engine = StorefrontBuilder::new(config).build(factories()).unwrap();
		engine.run_until(async {}).await.unwrap();
	}
}
