//! Real-time collaboration core for the graph-editing platform.
//!
//! Accepts graph-mutation operations from many clients, serializes them per
//! project, applies them to an authoritative snapshot, publishes the result to
//! connected peers, and tracks ephemeral presence (cursors, selections, user
//! lists) across one or many server instances.

pub mod access;
pub mod api;
pub mod bus;
pub mod config;
pub mod db;
pub mod graph;
pub mod presence;
pub mod serializer;
pub mod services;
pub mod session;
pub mod store;

use thiserror::Error;

/// Crate-wide error type composing every subsystem's own error enum.
///
/// Mirrors the error taxonomy of: auth failures close the socket,
/// access/validation/stale-version failures are reported back to the
/// submitter without affecting the connection, transient storage errors are
/// retried before surfacing, and everything else is logged as `internal`.
#[derive(Debug, Error)]
pub enum CollabError {
    /// No credential present on the handshake.
    #[error("authentication missing")]
    AuthMissing,

    /// Credential present but invalid (bad signature, unknown subject).
    #[error("authentication invalid: {0}")]
    AuthInvalid(String),

    /// Access gate denied the requested action.
    #[error("access denied")]
    AccessDenied,

    /// Referenced project or session does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Malformed event envelope or operation payload.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Storage layer error.
    #[error(transparent)]
    Store(#[from] db::error::DatabaseError),

    /// Retryable storage conflict exhausted its retry budget.
    #[error("transient storage conflict exhausted retries")]
    TransientStorage,

    /// Anything else; logged at `error!` and reported generically.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CollabError>;

/// Crate version, surfaced in health responses.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
