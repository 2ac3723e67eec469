//! Fluent construction of [`Config`] values without going through TOML.

use crate::{
	ApiConfig, Config, GatewayConfig, GatewayEnvironment, GatewayEnvironments, GatewayMode,
	ServiceConfig, StorageConfig,
};
use std::collections::HashMap;

/// Builder for creating `Config` instances with a fluent API.
///
/// Defaults point at the public sandbox merchant and in-memory storage.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	callback_base_url: String,
	storefront_base_url: String,
	trade_desc: String,
	choose_payment: String,
	sandbox: GatewayEnvironment,
	storage_primary: String,
	storage_cleanup_interval_seconds: u64,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	pub fn new() -> Self {
		Self {
			service_id: "test-storefront".to_string(),
			callback_base_url: "https://payments.example.com".to_string(),
			storefront_base_url: "https://shop.example.com".to_string(),
			trade_desc: "課程報名".to_string(),
			choose_payment: "Credit".to_string(),
			sandbox: GatewayEnvironment::public_sandbox(),
			storage_primary: "memory".to_string(),
			storage_cleanup_interval_seconds: 60,
			api: None,
		}
	}

	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	pub fn callback_base_url(mut self, url: impl Into<String>) -> Self {
		self.callback_base_url = url.into();
		self
	}

	pub fn storefront_base_url(mut self, url: impl Into<String>) -> Self {
		self.storefront_base_url = url.into();
		self
	}

	pub fn trade_desc(mut self, desc: impl Into<String>) -> Self {
		self.trade_desc = desc.into();
		self
	}

	/// Replaces the sandbox merchant credentials.
	pub fn sandbox(mut self, env: GatewayEnvironment) -> Self {
		self.sandbox = env;
		self
	}

	pub fn storage_primary(mut self, primary: impl Into<String>) -> Self {
		self.storage_primary = primary.into();
		self
	}

	pub fn storage_cleanup_interval_seconds(mut self, interval: u64) -> Self {
		self.storage_cleanup_interval_seconds = interval;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	/// Builds the `Config` with the configured values.
	pub fn build(self) -> Config {
		let mut implementations = HashMap::new();
		implementations.insert(
			self.storage_primary.clone(),
			toml::Value::Table(toml::map::Map::new()),
		);

		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			gateway: GatewayConfig {
				environment: GatewayMode::Sandbox,
				callback_base_url: self.callback_base_url,
				storefront_base_url: self.storefront_base_url,
				trade_desc: self.trade_desc,
				choose_payment: self.choose_payment,
				environments: GatewayEnvironments {
					sandbox: Some(self.sandbox),
					production: None,
				},
			},
			storage: StorageConfig {
				primary: self.storage_primary,
				implementations,
				cleanup_interval_seconds: self.storage_cleanup_interval_seconds,
			},
			api: self.api,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_builder_defaults() {
		let config = ConfigBuilder::new().build();
		assert_eq!(config.service.id, "test-storefront");
		assert_eq!(config.gateway.active().unwrap().merchant_id, "2000132");
		assert!(config.storage.implementations.contains_key("memory"));
	}

	#[test]
	fn test_builder_overrides() {
		let config = ConfigBuilder::new()
			.storefront_base_url("http://localhost:5173")
			.storage_primary("file")
			.build();
		assert_eq!(config.gateway.storefront_base_url, "http://localhost:5173");
		assert_eq!(config.storage.primary, "file");
		assert!(config.storage.implementations.contains_key("file"));
	}
}
