//! Core services of the storefront: orders, their review and payment state,
//! and the payment gateway integration.
//!
//! [`StorefrontBuilder`] assembles a [`StorefrontEngine`] from configuration;
//! the HTTP layer talks to [`OrderService`] and [`PaymentGateway`] through it.

pub mod builder;
pub mod engine;
pub mod orders;
pub mod payments;
pub mod state;
pub mod utils;

pub use builder::{BuilderError, StorefrontBuilder, StorefrontFactories};
pub use engine::{EngineError, StorefrontEngine};
pub use orders::{OrderService, OrderServiceError};
pub use payments::{CallbackOutcome, PaymentError, PaymentForm, PaymentGateway, PaymentRequest};
pub use state::{OrderStateError, OrderStateMachine};
