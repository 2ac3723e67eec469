//! Small helpers shared by every storefront crate.

pub mod formatting;
pub mod helpers;

pub use formatting::truncate_id;
pub use helpers::{current_timestamp, current_timestamp_millis};
