//! Configuration for the storefront payment service.
//!
//! Configuration is read from TOML. String values may reference environment
//! variables as `${VAR}` or `${VAR:-default}`, which keeps production gateway
//! secrets out of the file itself.
//!
//! ## Modular Configuration Support
//!
//! A file may pull in others with `include = ["gateway.toml"]`. Each
//! top-level section must appear in exactly one file.
//!
//! ## Gateway environments
//!
//! Two merchant environments are known, `sandbox` and `production`. One is
//! selected by `gateway.environment` when the process starts and is never
//! switched at runtime; rotating credentials means redeploying.

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use storefront_types::SecretString;
use thiserror::Error;

pub use loader::ConfigLoader;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Keep the message, drop the echoed input
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Service identity.
	pub service: ServiceConfig,
	/// Payment gateway settings.
	pub gateway: GatewayConfig,
	/// Storage backend settings.
	pub storage: StorageConfig,
	/// HTTP API settings.
	pub api: Option<ApiConfig>,
}

/// Service identity.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Which merchant environment is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
	Sandbox,
	Production,
}

impl fmt::Display for GatewayMode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			GatewayMode::Sandbox => write!(f, "sandbox"),
			GatewayMode::Production => write!(f, "production"),
		}
	}
}

/// Payment gateway settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
	/// Selected merchant environment.
	#[serde(default = "default_gateway_mode")]
	pub environment: GatewayMode,
	/// Public base URL of this service, used for `ReturnURL` and
	/// `OrderResultURL`.
	pub callback_base_url: String,
	/// Base URL of the storefront the browser is sent back to.
	pub storefront_base_url: String,
	/// `TradeDesc` sent with every payment.
	#[serde(default = "default_trade_desc")]
	pub trade_desc: String,
	/// `ChoosePayment` sent with every payment.
	#[serde(default = "default_choose_payment")]
	pub choose_payment: String,
	/// Credentials per environment.
	#[serde(default)]
	pub environments: GatewayEnvironments,
}

/// Credentials for each merchant environment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayEnvironments {
	pub sandbox: Option<GatewayEnvironment>,
	pub production: Option<GatewayEnvironment>,
}

/// One merchant account at the gateway.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GatewayEnvironment {
	/// Merchant identifier issued by the gateway.
	pub merchant_id: String,
	/// Shared hash key.
	pub hash_key: SecretString,
	/// Shared hash IV.
	pub hash_iv: SecretString,
	/// Checkout endpoint the payment form posts to.
	pub api_url: String,
}

impl GatewayEnvironment {
	/// The gateway's public test merchant.
	pub fn public_sandbox() -> Self {
		Self {
			merchant_id: "2000132".to_string(),
			hash_key: SecretString::from("5294y06JbISpM5x9"),
			hash_iv: SecretString::from("v77hoKGq4kWxNNIS"),
			api_url: "https://payment-stage.ecpay.com.tw/Cashier/AioCheckOut/V5".to_string(),
		}
	}
}

impl GatewayConfig {
	/// Returns the credentials of the selected environment.
	///
	/// A missing `sandbox` table resolves to the public test merchant; a
	/// missing `production` table is an error.
	pub fn active(&self) -> Result<GatewayEnvironment, ConfigError> {
		match self.environment {
			GatewayMode::Sandbox => Ok(self
				.environments
				.sandbox
				.clone()
				.unwrap_or_else(GatewayEnvironment::public_sandbox)),
			GatewayMode::Production => self.environments.production.clone().ok_or_else(|| {
				ConfigError::Validation(
					"gateway.environment is 'production' but [gateway.environments.production] is missing"
						.into(),
				)
			}),
		}
	}
}

fn default_gateway_mode() -> GatewayMode {
	GatewayMode::Sandbox
}

fn default_trade_desc() -> String {
	"課程報名".to_string()
}

fn default_choose_payment() -> String {
	"Credit".to_string()
}

/// Configuration for the storage backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of storage implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
	/// Interval in seconds for cleaning up expired storage entries.
	pub cleanup_interval_seconds: u64,
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	/// Whether the API server is enabled.
	#[serde(default)]
	pub enabled: bool,
	/// Host address to bind the server to.
	#[serde(default = "default_api_host")]
	pub host: String,
	/// Port to bind the server to.
	#[serde(default = "default_api_port")]
	pub port: u16,
	/// Maximum request size in bytes.
	#[serde(default = "default_max_request_size")]
	pub max_request_size: usize,
	/// CORS configuration. Permissive when absent.
	pub cors: Option<CorsConfig>,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CorsConfig {
	/// Allowed origins for CORS.
	pub allowed_origins: Vec<String>,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	3000
}

fn default_max_request_size() -> usize {
	1024 * 1024 // 1MB
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default`
/// for `${VAR_NAME:-default}` when the variable is unset.
///
/// Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last_end = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let var_name = var_name.as_str();

		let value = match std::env::var(var_name) {
			Ok(v) => v,
			Err(_) => match cap.get(2) {
				Some(default) => default.as_str().to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name
					)))
				},
			},
		};

		result.push_str(&input[last_end..full_match.start()]);
		result.push_str(&value);
		last_end = full_match.end();
	}
	result.push_str(&input[last_end..]);

	Ok(result)
}

fn require_http_url(field: &str, value: &str) -> Result<(), ConfigError> {
	if value.starts_with("http://") || value.starts_with("https://") {
		Ok(())
	} else {
		Err(ConfigError::Validation(format!(
			"{} must be an http(s) URL, got '{}'",
			field, value
		)))
	}
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Checks cross-field rules that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.trim().is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		self.validate_gateway()?;

		if self.storage.implementations.is_empty() {
			return Err(ConfigError::Validation(
				"At least one storage implementation must be configured".into(),
			));
		}
		if !self
			.storage
			.implementations
			.contains_key(&self.storage.primary)
		{
			return Err(ConfigError::Validation(format!(
				"Primary storage '{}' not found in implementations",
				self.storage.primary
			)));
		}
		if self.storage.cleanup_interval_seconds == 0 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds must be greater than 0".into(),
			));
		}
		if self.storage.cleanup_interval_seconds > 86400 {
			return Err(ConfigError::Validation(
				"Storage cleanup_interval_seconds cannot exceed 86400 (24 hours)".into(),
			));
		}

		if let Some(api) = &self.api {
			if api.enabled && api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}

	fn validate_gateway(&self) -> Result<(), ConfigError> {
		let gateway = &self.gateway;
		require_http_url("gateway.callback_base_url", &gateway.callback_base_url)?;
		require_http_url("gateway.storefront_base_url", &gateway.storefront_base_url)?;

		if gateway.trade_desc.trim().is_empty() {
			return Err(ConfigError::Validation(
				"gateway.trade_desc cannot be empty".into(),
			));
		}

		let env = gateway.active()?;
		let section = format!("gateway.environments.{}", gateway.environment);
		if env.merchant_id.trim().is_empty() {
			return Err(ConfigError::Validation(format!(
				"{}.merchant_id cannot be empty",
				section
			)));
		}
		if env.hash_key.is_blank() || env.hash_iv.is_blank() {
			return Err(ConfigError::Validation(format!(
				"{} must define hash_key and hash_iv",
				section
			)));
		}
		require_http_url(&format!("{}.api_url", section), &env.api_url)?;

		Ok(())
	}
}

/// Parses and validates a configuration from a TOML string.
///
/// Environment variables are resolved before parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const BASE: &str = r#"
[service]
id = "storefront-payments"

[gateway]
callback_base_url = "https://payments.example.com"
storefront_base_url = "https://shop.example.com"

[storage]
primary = "memory"
cleanup_interval_seconds = 3600
[storage.implementations.memory]
"#;

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("SF_TEST_HOST", "localhost");
		std::env::set_var("SF_TEST_PORT", "5432");

		let input = "host = \"${SF_TEST_HOST}:${SF_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "host = \"localhost:5432\"");

		std::env::remove_var("SF_TEST_HOST");
		std::env::remove_var("SF_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let input = "value = \"${SF_MISSING_VAR:-default_value}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "value = \"default_value\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let input = "value = \"${SF_MISSING_VAR}\"";
		let result = resolve_env_vars(input);
		assert!(result.is_err());
		assert!(result.unwrap_err().to_string().contains("SF_MISSING_VAR"));
	}

	#[test]
	fn test_minimal_config_uses_public_sandbox() {
		let config: Config = BASE.parse().unwrap();
		assert_eq!(config.gateway.environment, GatewayMode::Sandbox);
		assert_eq!(config.gateway.trade_desc, "課程報名");
		assert_eq!(config.gateway.choose_payment, "Credit");

		let env = config.gateway.active().unwrap();
		assert_eq!(env.merchant_id, "2000132");
		assert_eq!(env.hash_key.expose_secret(), "5294y06JbISpM5x9");
		assert_eq!(env.hash_iv.expose_secret(), "v77hoKGq4kWxNNIS");
	}

	#[test]
	fn test_production_requires_credentials() {
		let config_str = BASE.replace(
			"[gateway]\n",
			"[gateway]\nenvironment = \"production\"\n",
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("production"));
	}

	#[test]
	fn test_production_credentials_from_env() {
		std::env::set_var("SF_TEST_HASH_KEY", "prodkey123456789");

		let config_str = format!(
			"{}\n{}",
			BASE.replace("[gateway]\n", "[gateway]\nenvironment = \"production\"\n"),
			r#"
[gateway.environments.production]
merchant_id = "3000000"
hash_key = "${SF_TEST_HASH_KEY}"
hash_iv = "${SF_TEST_HASH_IV:-prodiv1234567890}"
api_url = "https://payment.ecpay.com.tw/Cashier/AioCheckOut/V5"
"#
		);
		let config: Config = config_str.parse().unwrap();
		let env = config.gateway.active().unwrap();
		assert_eq!(env.merchant_id, "3000000");
		assert_eq!(env.hash_key.expose_secret(), "prodkey123456789");
		assert_eq!(env.hash_iv.expose_secret(), "prodiv1234567890");

		std::env::remove_var("SF_TEST_HASH_KEY");
	}

	#[test]
	fn test_blank_secret_rejected() {
		let config_str = format!(
			"{}\n{}",
			BASE,
			r#"
[gateway.environments.sandbox]
merchant_id = "2000132"
hash_key = ""
hash_iv = "v77hoKGq4kWxNNIS"
api_url = "https://payment-stage.ecpay.com.tw/Cashier/AioCheckOut/V5"
"#
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("hash_key"));
	}

	#[test]
	fn test_invalid_callback_url_rejected() {
		let config_str = BASE.replace(
			"https://payments.example.com",
			"payments.example.com",
		);
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("callback_base_url"));
	}

	#[test]
	fn test_unknown_primary_storage_rejected() {
		let config_str = BASE.replace("primary = \"memory\"", "primary = \"file\"");
		let err = config_str.parse::<Config>().unwrap_err();
		assert!(err.to_string().contains("Primary storage 'file'"));
	}

	#[test]
	fn test_cleanup_interval_bounds() {
		let config_str = BASE.replace("cleanup_interval_seconds = 3600", "cleanup_interval_seconds = 0");
		assert!(config_str.parse::<Config>().is_err());

		let config_str =
			BASE.replace("cleanup_interval_seconds = 3600", "cleanup_interval_seconds = 90000");
		assert!(config_str.parse::<Config>().is_err());
	}

	#[test]
	fn test_serialized_config_redacts_secrets() {
		let config: Config = BASE.parse().unwrap();
		let mut gateway = config.gateway.clone();
		gateway.environments.sandbox = Some(GatewayEnvironment::public_sandbox());
		let dumped = toml::to_string(&gateway).unwrap();
		assert!(!dumped.contains("5294y06JbISpM5x9"));
		assert!(dumped.contains("***REDACTED***"));
	}

	#[test]
	fn test_api_defaults() {
		let config_str = format!("{}\n[api]\nenabled = true\n", BASE);
		let config: Config = config_str.parse().unwrap();
		let api = config.api.unwrap();
		assert_eq!(api.host, "127.0.0.1");
		assert_eq!(api.port, 3000);
		assert_eq!(api.max_request_size, 1024 * 1024);
	}
}
