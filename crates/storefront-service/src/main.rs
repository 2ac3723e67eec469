//! Main entry point for the storefront service.
//!
//! Loads configuration, wires the order and payment services onto the
//! configured storage backend and serves the HTTP API alongside the
//! engine's background maintenance.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use storefront_config::Config;
use storefront_core::{StorefrontBuilder, StorefrontEngine, StorefrontFactories};
use storefront_storage::implementations::file::create_storage as create_file_storage;
use storefront_storage::implementations::memory::create_storage as create_memory_storage;

mod apis;
mod server;

/// Command-line arguments for the storefront service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started storefront");

	let config_path = args
		.config
		.to_str()
		.ok_or("configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = Arc::new(build_engine(config.clone())?);

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine));

			tokio::select! {
				result = engine_task => {
					tracing::info!("Engine finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("API disabled, running engine only");
			engine.run().await?;
		},
	}

	tracing::info!("Stopped storefront");
	Ok(())
}

/// Creates a factory HashMap with the given function-pointer type.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Builds the engine with every storage backend this binary ships.
fn build_engine(config: Config) -> Result<StorefrontEngine, Box<dyn std::error::Error>> {
	let storage_factories = create_factory_map!(
		storefront_storage::StorageInterface,
		storefront_storage::StorageError,
		"file" => create_file_storage,
		"memory" => create_memory_storage,
	);

	Ok(StorefrontBuilder::new(config).build(StorefrontFactories { storage_factories })?)
}
