//! Handshake-time services: JWT verification.

pub mod auth;

pub use auth::{AuthenticatedUser, JwtVerifier};
