//! Project and project-version rows
//!
//! `Project` holds the authoritative snapshot blob (serialized JSON); `version`
//! is tracked in a separate `ProjectVersion` row so the serializer can update
//! it independently of the blob write, as the logical txn requires.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Persisted project row. `data` is the serialized `Snapshot` JSON blob.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: String,
    pub data: String,
    pub creator_id: String,
    pub team_id: Option<String>,
    pub updated_at: String,
}

impl Project {
    pub fn new(id: impl Into<String>, data: impl Into<String>, creator_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            data: data.into(),
            creator_id: creator_id.into(),
            team_id: None,
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Monotonic per-project version counter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectVersion {
    pub project_id: String,
    pub version: i64,
    pub last_sync: String,
}

impl ProjectVersion {
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            version: 0,
            last_sync: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_new_starts_unversioned() {
        let project = Project::new("p1", "{}", "u1");
        assert_eq!(project.id, "p1");
        assert_eq!(project.creator_id, "u1");
        assert!(project.team_id.is_none());
    }

    #[test]
    fn test_project_version_starts_at_zero() {
        let v = ProjectVersion::new("p1");
        assert_eq!(v.version, 0);
    }
}
