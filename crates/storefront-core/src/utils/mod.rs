//! Identifier helpers shared by the order and payment services.

pub mod ids;

pub use ids::{generate_order_id, random_code};
