//! Common types for the storefront payment services.
//!
//! Shared by the signature engine, configuration, storage, core services and
//! the HTTP binary so every crate agrees on what an order looks like and how
//! its statuses are spelled on the wire.

/// API request/response types and HTTP error mapping.
pub mod api;
/// Orders, review and payment statuses, settlement details.
pub mod order;
/// Implementation registry trait for pluggable backends.
pub mod registry;
/// Redacting, zeroizing string for gateway credentials.
pub mod secret_string;
/// Storage namespaces.
pub mod storage;
/// Formatting and time helpers.
pub mod utils;
/// TOML schema validation for implementation sections.
pub mod validation;

pub use api::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::StorageKey;
pub use utils::{current_timestamp, current_timestamp_millis, truncate_id};
pub use validation::*;
