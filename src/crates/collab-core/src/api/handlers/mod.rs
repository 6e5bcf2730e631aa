//! API request handlers
//!
//! The HTTP surface is a health check; the socket handler lives under
//! `api::ws` and is wired directly into the router.

pub mod health;

pub use health::{health, health_detailed};
