//! Loading of configuration split across several files.
//!
//! The main file may list other files under `include`. Every file contributes
//! whole top-level sections (`service`, `gateway`, `storage`, `api`) and a
//! section may be defined by one file only. Included files cannot include
//! further files.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Top-level sections a configuration file may define.
const SECTIONS: [&str; 4] = ["service", "gateway", "storage", "api"];

const INCLUDE_KEY: &str = "include";

/// Assembles a [`Config`] from a main file and its includes.
pub struct ConfigLoader {
	base_path: PathBuf,
	visited: HashSet<PathBuf>,
	/// File that defined each section so far.
	owners: BTreeMap<String, PathBuf>,
	merged: toml::Table,
}

impl ConfigLoader {
	/// Creates a loader resolving relative paths against `base_path`.
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			visited: HashSet::new(),
			owners: BTreeMap::new(),
			merged: toml::Table::new(),
		}
	}

	/// Loads `config_path` and every file it includes, then validates the
	/// merged result.
	pub async fn load_config(mut self, config_path: impl AsRef<Path>) -> Result<Config, ConfigError> {
		let main_path = self.resolve_path(config_path.as_ref());
		let mut main_table = self.read_table(&main_path).await?;
		let includes = take_includes(&mut main_table, &main_path)?;
		self.merge(main_table, &main_path)?;

		for include in includes {
			let include_path = self.resolve_path(&include);
			let mut table = self.read_table(&include_path).await?;
			if table.contains_key(INCLUDE_KEY) {
				return Err(ConfigError::Validation(format!(
					"{}: only the main configuration file may use '{}'",
					include_path.display(),
					INCLUDE_KEY
				)));
			}
			table.remove(INCLUDE_KEY);
			self.merge(table, &include_path)?;
		}

		let config: Config = toml::Value::Table(self.merged).try_into()?;
		config.validate()?;
		Ok(config)
	}

	fn resolve_path(&self, path: &Path) -> PathBuf {
		if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		}
	}

	/// Reads one file, resolving environment variables, and parses it.
	async fn read_table(&mut self, path: &Path) -> Result<toml::Table, ConfigError> {
		let canonical = tokio::fs::canonicalize(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Configuration file {}: {}", path.display(), e),
			))
		})?;
		if !self.visited.insert(canonical) {
			return Err(ConfigError::Validation(format!(
				"{} was already loaded; includes must not form a cycle",
				path.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		let resolved = resolve_env_vars(&content)?;
		toml::from_str(&resolved).map_err(|e: toml::de::Error| {
			ConfigError::Parse(format!("{}: {}", path.display(), e.message()))
		})
	}

	/// Adds the sections of one file to the merged table.
	fn merge(&mut self, table: toml::Table, source: &Path) -> Result<(), ConfigError> {
		for (section, value) in table {
			if !SECTIONS.contains(&section.as_str()) {
				return Err(ConfigError::Validation(format!(
					"{}: unknown section '{}' (expected one of {})",
					source.display(),
					section,
					SECTIONS.join(", ")
				)));
			}
			if let Some(owner) = self.owners.get(&section) {
				return Err(ConfigError::Validation(format!(
					"Section '{}' is defined in both {} and {}",
					section,
					owner.display(),
					source.display()
				)));
			}
			self.owners.insert(section.clone(), source.to_path_buf());
			self.merged.insert(section, value);
		}
		Ok(())
	}
}

/// Removes the `include` entry from the main file and returns its paths.
fn take_includes(table: &mut toml::Table, source: &Path) -> Result<Vec<PathBuf>, ConfigError> {
	let invalid = || {
		ConfigError::Validation(format!(
			"{}: '{}' must be a string or an array of strings",
			source.display(),
			INCLUDE_KEY
		))
	};

	match table.remove(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.into_iter()
			.map(|item| match item {
				toml::Value::String(path) => Ok(PathBuf::from(path)),
				_ => Err(invalid()),
			})
			.collect(),
		Some(_) => Err(invalid()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::fs;
	use tempfile::TempDir;

	const SERVICE: &str = r#"
[service]
id = "storefront-test"
"#;

	const GATEWAY: &str = r#"
[gateway]
callback_base_url = "https://payments.example.com"
storefront_base_url = "https://shop.example.com"
"#;

	const STORAGE: &str = r#"
[storage]
primary = "memory"
cleanup_interval_seconds = 600
[storage.implementations.memory]
"#;

	#[tokio::test]
	async fn test_single_file_config() {
		let temp_dir = TempDir::new().unwrap();
		let config_path = temp_dir.path().join("config.toml");
		fs::write(&config_path, format!("{}{}{}", SERVICE, GATEWAY, STORAGE)).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config(&config_path).await.unwrap();

		assert_eq!(config.service.id, "storefront-test");
		assert_eq!(config.storage.cleanup_interval_seconds, 600);
	}

	#[tokio::test]
	async fn test_config_with_includes() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!(
			"include = [\"gateway.toml\", \"storage.toml\"]\n{}",
			SERVICE
		);

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("gateway.toml"), GATEWAY).unwrap();
		fs::write(temp_dir.path().join("storage.toml"), STORAGE).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let config = loader.load_config("main.toml").await.unwrap();

		assert_eq!(config.service.id, "storefront-test");
		assert_eq!(config.gateway.storefront_base_url, "https://shop.example.com");
		assert_eq!(config.storage.primary, "memory");
	}

	#[tokio::test]
	async fn test_single_string_include() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = \"rest.toml\"\n{}", SERVICE);

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(
			temp_dir.path().join("rest.toml"),
			format!("{}{}", GATEWAY, STORAGE),
		)
		.unwrap();

		let config = Config::from_file(temp_dir.path().join("main.toml").to_str().unwrap())
			.await
			.unwrap();
		assert_eq!(config.service.id, "storefront-test");
	}

	#[tokio::test]
	async fn test_duplicate_section_error() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = [\"duplicate.toml\"]\n{}", SERVICE);
		let duplicate_config = "[service]\nid = \"another\"\n";

		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("duplicate.toml"), duplicate_config).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("Section 'service' is defined in both"));
		assert!(error_msg.contains("duplicate.toml"));
	}

	#[tokio::test]
	async fn test_self_include_detection() {
		let temp_dir = TempDir::new().unwrap();
		let config = format!("include = [\"self.toml\"]\n{}", SERVICE);
		fs::write(temp_dir.path().join("self.toml"), config).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("self.toml").await;

		let error_msg = result.unwrap_err().to_string();
		assert!(error_msg.contains("already loaded"));
	}

	#[tokio::test]
	async fn test_missing_include_is_io_error() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = [\"absent.toml\"]\n{}", SERVICE);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let result = loader.load_config("main.toml").await;

		assert!(matches!(result, Err(ConfigError::Io(_))));
	}

	#[tokio::test]
	async fn test_non_string_include_rejected() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = [1]\n{}", SERVICE);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("array of strings"));
	}

	#[tokio::test]
	async fn test_unknown_section_names_file() {
		let temp_dir = TempDir::new().unwrap();
		let main_config = format!("include = [\"extra.toml\"]\n{}{}{}", SERVICE, GATEWAY, STORAGE);
		fs::write(temp_dir.path().join("main.toml"), main_config).unwrap();
		fs::write(temp_dir.path().join("extra.toml"), "[gatway]\nenvironment = \"sandbox\"\n").unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("unknown section 'gatway'"));
		assert!(error_msg.contains("extra.toml"));
	}

	#[tokio::test]
	async fn test_nested_include_rejected() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = [\"gateway.toml\"]\n{}{}", SERVICE, STORAGE),
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("gateway.toml"),
			format!("include = [\"more.toml\"]\n{}", GATEWAY),
		)
		.unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("only the main configuration file"));
	}

	#[tokio::test]
	async fn test_merged_config_is_validated() {
		let temp_dir = TempDir::new().unwrap();
		fs::write(
			temp_dir.path().join("main.toml"),
			format!("include = \"storage.toml\"\n{}{}", SERVICE, GATEWAY),
		)
		.unwrap();
		fs::write(
			temp_dir.path().join("storage.toml"),
			STORAGE.replace("primary = \"memory\"", "primary = \"file\""),
		)
		.unwrap();

		let loader = ConfigLoader::new(temp_dir.path());
		let error_msg = loader.load_config("main.toml").await.unwrap_err().to_string();
		assert!(error_msg.contains("Primary storage 'file'"));
	}
}
