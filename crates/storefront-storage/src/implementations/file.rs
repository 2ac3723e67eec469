//! File-backed storage.
//!
//! Each key `<namespace>:<id>` maps to `<storage_path>/<namespace>/<id>.bin`,
//! with characters outside `[A-Za-z0-9_.-]` percent-escaped so keys survive
//! the round trip through the filesystem. Every file starts with a fixed
//! header carrying its expiry.

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storefront_types::{
	current_timestamp, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, StorageKey,
	ValidationError,
};
use tokio::fs;

const DEFAULT_NAMESPACE: &str = "default";
const EXTENSION: &str = "bin";

#[allow(clippy::doc_nested_refdefs)]
/// Fixed-size file header for TTL support.
///
/// Binary layout (64 bytes total):
/// - [0-3]: Magic bytes "SFPS"
/// - [4-5]: Version (u16, little-endian)
/// - [6-13]: Expiration timestamp (u64, little-endian, Unix seconds, 0 = never)
/// - [14-63]: Reserved
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	version: u16,
	expires_at: u64,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"SFPS";
	const VERSION: u16 = 1;
	const SIZE: usize = 64;

	fn new(ttl: Duration) -> Self {
		let expires_at = if ttl.is_zero() {
			0
		} else {
			current_timestamp().saturating_add(ttl.as_secs())
		};

		Self {
			version: Self::VERSION,
			expires_at,
		}
	}

	fn serialize(&self) -> [u8; Self::SIZE] {
		let mut bytes = [0u8; Self::SIZE];
		bytes[0..4].copy_from_slice(Self::MAGIC);
		bytes[4..6].copy_from_slice(&self.version.to_le_bytes());
		bytes[6..14].copy_from_slice(&self.expires_at.to_le_bytes());
		bytes
	}

	fn deserialize(bytes: &[u8]) -> Result<Self, StorageError> {
		if bytes.len() < Self::SIZE {
			return Err(StorageError::Backend("File too small for header".into()));
		}
		if &bytes[0..4] != Self::MAGIC {
			return Err(StorageError::Backend("Unrecognized file format".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StorageError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let mut expires_bytes = [0u8; 8];
		expires_bytes.copy_from_slice(&bytes[6..14]);

		Ok(Self {
			version,
			expires_at: u64::from_le_bytes(expires_bytes),
		})
	}

	fn is_expired(&self) -> bool {
		self.expires_at != 0 && current_timestamp() >= self.expires_at
	}
}

/// Default TTL per storage namespace.
#[derive(Debug, Clone, Default)]
pub struct TtlConfig {
	ttls: HashMap<StorageKey, Duration>,
}

impl TtlConfig {
	/// Reads `ttl_<namespace>` integers from the backend table.
	fn from_config(config: &toml::Value) -> Self {
		let mut ttls = HashMap::new();

		if let Some(table) = config.as_table() {
			for storage_key in StorageKey::all() {
				let config_key = format!("ttl_{}", storage_key.as_str());
				if let Some(secs) = table
					.get(&config_key)
					.and_then(|v| v.as_integer())
					.and_then(|v| u64::try_from(v).ok())
				{
					ttls.insert(storage_key, Duration::from_secs(secs));
				}
			}
		}

		Self { ttls }
	}

	fn get_ttl(&self, storage_key: StorageKey) -> Duration {
		self.ttls
			.get(&storage_key)
			.copied()
			.unwrap_or(Duration::ZERO)
	}
}

fn escape_component(raw: &str) -> String {
	let escaped = urlencoding::encode(raw).into_owned();
	// never produce "." or ".." as a path component
	if escaped.chars().all(|c| c == '.') {
		return escaped.replace('.', "%2E");
	}
	escaped
}

fn unescape_component(escaped: &str) -> Option<String> {
	urlencoding::decode(escaped).ok().map(|s| s.into_owned())
}

fn split_key(key: &str) -> (&str, &str) {
	key.split_once(':').unwrap_or((DEFAULT_NAMESPACE, key))
}

/// Storage that writes one file per key under a base directory.
pub struct FileStorage {
	base_path: PathBuf,
	ttl_config: TtlConfig,
}

impl FileStorage {
	pub fn new(base_path: PathBuf, ttl_config: TtlConfig) -> Self {
		Self {
			base_path,
			ttl_config,
		}
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		let (namespace, id) = split_key(key);
		self.base_path
			.join(escape_component(namespace))
			.join(format!("{}.{}", escape_component(id), EXTENSION))
	}

	/// Default TTL for a key, taken from its namespace.
	fn get_ttl_for_key(&self, key: &str) -> Duration {
		let (namespace, _) = split_key(key);
		namespace
			.parse::<StorageKey>()
			.map(|sk| self.ttl_config.get_ttl(sk))
			.unwrap_or(Duration::ZERO)
	}

	/// Reads a file and returns its payload, or `None` if expired.
	async fn read_live(&self, path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		let data = match fs::read(path).await {
			Ok(data) => data,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(StorageError::NotFound),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let header = FileHeader::deserialize(&data)?;
		if header.is_expired() {
			return Ok(None);
		}
		Ok(Some(data[FileHeader::SIZE..].to_vec()))
	}

	async fn data_files(&self) -> Result<Vec<(String, PathBuf)>, StorageError> {
		let mut files = Vec::new();
		let mut namespaces = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(files),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		while let Some(ns_entry) = namespaces
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let ns_path = ns_entry.path();
			if !ns_path.is_dir() {
				continue;
			}
			let Some(namespace) = ns_path
				.file_name()
				.and_then(|n| n.to_str())
				.and_then(unescape_component)
			else {
				continue;
			};

			let mut entries = fs::read_dir(&ns_path)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
			while let Some(entry) = entries
				.next_entry()
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?
			{
				let path = entry.path();
				if path.extension() != Some(std::ffi::OsStr::new(EXTENSION)) {
					continue;
				}
				let Some(id) = path
					.file_stem()
					.and_then(|s| s.to_str())
					.and_then(unescape_component)
				else {
					tracing::debug!("Skipping file with undecodable name {:?}", path);
					continue;
				};
				files.push((format!("{}:{}", namespace, id), path));
			}
		}

		Ok(files)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.get_file_path(key);
		self.read_live(&path).await?.ok_or(StorageError::NotFound)
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		if let Some(parent) = path.parent() {
			fs::create_dir_all(parent)
				.await
				.map_err(|e| StorageError::Backend(e.to_string()))?;
		}

		let ttl = ttl.unwrap_or_else(|| self.get_ttl_for_key(key));
		let header = FileHeader::new(ttl);

		let mut file_data = Vec::with_capacity(FileHeader::SIZE + value.len());
		file_data.extend_from_slice(&header.serialize());
		file_data.extend_from_slice(&value);

		// write then rename so readers never see a partial file
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, file_data)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		match fs::remove_file(&path).await {
			Ok(_) => Ok(()),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let path = self.get_file_path(key);
		match self.read_live(&path).await {
			Ok(live) => Ok(live.is_some()),
			Err(StorageError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut keys = Vec::new();
		for (key, path) in self.data_files().await? {
			if !key.starts_with(prefix) {
				continue;
			}
			match self.read_live(&path).await {
				Ok(Some(_)) => keys.push(key),
				Ok(None) | Err(StorageError::NotFound) => {},
				Err(e) => tracing::debug!("Skipping unreadable file {:?}: {}", path, e),
			}
		}
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let mut removed = 0;
		for (_, path) in self.data_files().await? {
			let expired = match fs::read(&path).await {
				Ok(data) => FileHeader::deserialize(&data)
					.map(|h| h.is_expired())
					.unwrap_or(false),
				Err(e) => {
					tracing::debug!("Skipping file {:?}: could not be read: {}", path, e);
					false
				},
			};
			if !expired {
				continue;
			}
			match fs::remove_file(&path).await {
				Ok(_) => removed += 1,
				Err(e) => tracing::warn!("Failed to remove expired file {:?}: {}", path, e),
			}
		}
		Ok(removed)
	}
}

/// Configuration schema for FileStorage.
///
/// Accepts `storage_path` and a non-negative `ttl_<namespace>` for every
/// storage namespace.
pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let mut optional_fields = vec![Field::new("storage_path", FieldType::String)];
		for storage_key in StorageKey::all() {
			optional_fields.push(Field::new(
				format!("ttl_{}", storage_key.as_str()),
				FieldType::Integer {
					min: Some(0),
					max: None,
				},
			));
		}

		Schema::new(vec![], optional_fields).validate(config)
	}
}

/// Creates a file storage backend.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
/// - `ttl_orders`: TTL in seconds for orders (default: 0, never)
/// - `ttl_order_by_trade_no`: TTL in seconds for the trade number index
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage")
		.to_string();

	Ok(Box::new(FileStorage::new(
		PathBuf::from(storage_path),
		TtlConfig::from_config(config),
	)))
}

/// Registry for the file backend.
pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}
