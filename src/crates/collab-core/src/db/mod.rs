//! Database module for the collaboration core
//!
//! Provides database connectivity, models, repositories, and error handling
//! for persistent storage of collaboration-core entities.

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;

pub use connection::{DatabaseConnection, DatabasePool, PoolStatistics};
pub use error::{DatabaseError, DbResult};
