//! Request handlers for the storefront API.

pub mod auth;
pub mod orders;
pub mod payments;
