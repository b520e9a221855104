//! Endpoint handlers.

pub mod analyze;
pub mod health;
