//! Per-timeline derived row
//!
//! Denormalized view of a single timeline's layers/metadata/variables, kept in
//! sync by the snapshot store's transactional write whenever a batch touches
//! that timeline.
//! Exists so timeline-scoped reads don't require deserializing the whole
//! project snapshot.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GraphSnapshotRow {
    /// Equals the owning timeline's id.
    pub id: String,
    pub project_id: String,
    pub layers: String,
    pub metadata: String,
    pub variables: String,
    pub name: String,
    pub order: i64,
    pub is_active: bool,
    pub version: i64,
    pub timestamp: i64,
    pub updated_at: String,
}
