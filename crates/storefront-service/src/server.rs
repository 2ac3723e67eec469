//! HTTP server for the storefront API.
//!
//! JSON endpoints live under `/api`. The gateway talks to `/ecpay/*`, which
//! answers in the plain-text and redirect forms the gateway expects.

use axum::{
	extract::DefaultBodyLimit,
	http::{HeaderValue, Method},
	routing::{get, post},
	Router,
};
use std::sync::Arc;
use storefront_config::ApiConfig;
use storefront_core::StorefrontEngine;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
	cors::{AllowOrigin, Any, CorsLayer},
	trace::TraceLayer,
};

use crate::apis::{orders, payments};

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<StorefrontEngine>,
}

/// Builds the router with all routes and middleware.
pub fn build_router(api_config: &ApiConfig, engine: Arc<StorefrontEngine>) -> Router {
	let api = Router::new()
		.route(
			"/orders",
			post(orders::create_order).get(orders::list_orders),
		)
		.route("/orders/{id}", get(orders::get_order))
		.route("/orders/{id}/review", post(orders::review_order))
		.route(
			"/orders/{id}/registration-form",
			post(orders::resubmit_registration_form),
		)
		.route("/dashboard", get(orders::dashboard))
		.route("/payments", post(payments::create_payment));

	let gateway = Router::new()
		.route("/callback", post(payments::handle_callback))
		.route(
			"/return",
			get(payments::handle_return_query).post(payments::handle_return_form),
		);

	Router::new()
		.nest("/api", api)
		.nest("/ecpay", gateway)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors_layer(api_config))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(AppState { engine })
}

fn cors_layer(api_config: &ApiConfig) -> CorsLayer {
	match &api_config.cors {
		Some(cors) => {
			let origins: Vec<HeaderValue> = cors
				.allowed_origins
				.iter()
				.filter_map(|origin| match origin.parse() {
					Ok(value) => Some(value),
					Err(_) => {
						tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
						None
					},
				})
				.collect();
			CorsLayer::new()
				.allow_origin(AllowOrigin::list(origins))
				.allow_methods([Method::GET, Method::POST, Method::OPTIONS])
				.allow_headers(Any)
		},
		None => CorsLayer::permissive(),
	}
}

/// Binds to the configured address and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<StorefrontEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = build_router(&api_config, engine);

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Storefront API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}
