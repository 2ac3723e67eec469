//! Storefront engine.
//!
//! Owns the shared services and runs the background storage cleanup until
//! shutdown is requested.

use crate::orders::OrderService;
use crate::payments::PaymentGateway;
use crate::state::OrderStateMachine;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use storefront_config::Config;
use storefront_storage::StorageService;
use thiserror::Error;

/// Errors that can occur while the engine runs.
#[derive(Debug, Error)]
pub enum EngineError {
	/// The background cleanup task stopped before shutdown was requested.
	#[error("Cleanup task stopped: {0}")]
	Cleanup(String),
}

/// Shared services behind the HTTP API.
#[derive(Clone)]
pub struct StorefrontEngine {
	config: Config,
	storage: Arc<StorageService>,
	state_machine: Arc<OrderStateMachine>,
	orders: Arc<OrderService>,
	payments: Arc<PaymentGateway>,
}

impl StorefrontEngine {
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		state_machine: Arc<OrderStateMachine>,
		orders: Arc<OrderService>,
		payments: Arc<PaymentGateway>,
	) -> Self {
		Self {
			config,
			storage,
			state_machine,
			orders,
			payments,
		}
	}

	/// Runs storage cleanup every `cleanup_interval_seconds` until `shutdown`
	/// resolves.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let storage = self.storage.clone();
		let period = Duration::from_secs(self.config.storage.cleanup_interval_seconds);
		let mut cleanup_handle = tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			loop {
				interval.tick().await;
				match storage.cleanup_expired().await {
					Ok(count) if count > 0 => {
						tracing::debug!("Storage cleanup: removed {} expired entries", count);
					},
					Err(e) => {
						tracing::warn!("Storage cleanup failed: {}", e);
					},
					_ => {},
				}
			}
		});

		tokio::select! {
			_ = shutdown => {},
			result = &mut cleanup_handle => {
				let reason = match result {
					Ok(_) => "exited".to_string(),
					Err(e) => e.to_string(),
				};
				tracing::error!("Storage cleanup task stopped: {}", reason);
				return Err(EngineError::Cleanup(reason));
			},
		}

		tracing::info!("Shutting down storefront engine");
		cleanup_handle.abort();
		Ok(())
	}

	/// Runs until Ctrl+C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!("Failed to listen for shutdown signal: {}", e);
			}
		})
		.await
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	pub fn state_machine(&self) -> &Arc<OrderStateMachine> {
		&self.state_machine
	}

	pub fn orders(&self) -> &Arc<OrderService> {
		&self.orders
	}

	pub fn payments(&self) -> &Arc<PaymentGateway> {
		&self.payments
	}
}
