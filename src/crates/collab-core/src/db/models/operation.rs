//! Operation log row
//!
//! Append-only log of applied operations, indexed by `(project_id, version)`
//! so `getOperationsAfterVersion` can serve stale clients their missed batch.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OperationRow {
    pub id: String,
    pub project_id: String,
    pub r#type: String,
    pub timeline_id: String,
    pub layer_id: String,
    /// Serialized JSON payload.
    pub payload: String,
    pub timestamp: i64,
    pub user_id: Option<String>,
    pub device_id: String,
    pub version: i64,
}
