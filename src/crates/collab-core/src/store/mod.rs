//! Snapshot Store: the facade the serializer calls for everything persistence
//! related. Composes the individual repositories (`db::repositories`) so
//! callers never touch `sqlx` directly.

use chrono::Utc;

use crate::db::connection::DatabasePool;
use crate::db::models::{GraphSnapshotRow, OperationRow};
use crate::db::repositories::{GraphSnapshotRepository, OperationRepository, ProjectRepository};
use crate::graph::payload::Operation;
use crate::graph::Snapshot;
use crate::Result;

pub struct SnapshotStore {
    pool: DatabasePool,
}

impl SnapshotStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DatabasePool {
        &self.pool
    }

    /// `getProjectSnapshot`: read the current snapshot and version,
    /// scaffolding an empty project on first access.
    pub async fn get_project_snapshot(&self, project_id: &str, creator_id: &str) -> Result<(Snapshot, i64)> {
        let existing = ProjectRepository::get(&self.pool, project_id).await?;
        let snapshot = match existing {
            Some(project) => parse_snapshot(project_id, &project.data)?,
            None => {
                let empty = Snapshot::empty(project_id);
                let json = serde_json::to_string(&empty)
                    .map_err(|e| crate::CollabError::Internal(format!("snapshot serialization failed: {e}")))?;
                ProjectRepository::create_scaffold(&self.pool, project_id, creator_id, &json).await?;
                empty
            }
        };
        let version = ProjectRepository::get_version(&self.pool, project_id).await?;
        Ok((snapshot, version))
    }

    pub async fn get_project_version(&self, project_id: &str) -> Result<i64> {
        Ok(ProjectRepository::get_version(&self.pool, project_id).await?)
    }

    /// `getOperationsAfterVersion`, ascending by version.
    pub async fn get_operations_after_version(&self, project_id: &str, after_version: i64) -> Result<Vec<OperationRow>> {
        Ok(OperationRepository::get_after_version(&self.pool, project_id, after_version).await?)
    }

    /// `saveChangesInTransaction`: atomically overwrite the snapshot, append
    /// every op tagged with the new version, bump `project.version`, and
    /// refresh the per-timeline derived rows touched by this batch.
    pub async fn save_changes_in_transaction(
        &self,
        project_id: &str,
        new_snapshot: &Snapshot,
        ops: &[Operation],
        user_id: &str,
        new_version: i64,
    ) -> Result<()> {
        let snapshot_json = serde_json::to_string(new_snapshot)
            .map_err(|e| crate::CollabError::Internal(format!("snapshot serialization failed: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(crate::db::error::DatabaseError::from)?;

        ProjectRepository::write_snapshot(&mut tx, project_id, &snapshot_json)
            .await
            .map_err(crate::db::error::DatabaseError::from)?;
        let bumped = ProjectRepository::bump_version(&mut tx, project_id)
            .await
            .map_err(crate::db::error::DatabaseError::from)?;
        if bumped != new_version {
            return Err(crate::CollabError::Internal(format!(
                "version mismatch: expected {new_version}, store produced {bumped}"
            )));
        }

        for op in ops {
            let row = OperationRow {
                id: op.id.clone(),
                project_id: project_id.to_string(),
                r#type: op.op_type.clone(),
                timeline_id: op.timeline_id.clone(),
                layer_id: op.layer_id.clone(),
                payload: serde_json::to_string(&op.payload).unwrap_or_else(|_| "{}".to_string()),
                timestamp: op.timestamp,
                user_id: Some(user_id.to_string()),
                device_id: op.device_id.clone(),
                version: new_version,
            };
            OperationRepository::insert(&mut tx, &row).await.map_err(crate::db::error::DatabaseError::from)?;
        }

        for row in derived_rows(project_id, new_snapshot, ops, new_version) {
            GraphSnapshotRepository::upsert(&mut tx, &row).await.map_err(crate::db::error::DatabaseError::from)?;
        }

        tx.commit().await.map_err(crate::db::error::DatabaseError::from)?;
        Ok(())
    }
}

fn parse_snapshot(project_id: &str, data: &str) -> Result<Snapshot> {
    let value: serde_json::Value = serde_json::from_str(data)
        .map_err(|e| crate::CollabError::Internal(format!("stored snapshot is not valid JSON: {e}")))?;
    if value.get("timelines").is_none() && value.get("layers").is_some() {
        tracing::warn!(project_id, "legacy-format snapshot detected, wrapping into base-timeline");
        return Snapshot::from_legacy_value(project_id, value)
            .map_err(|e| crate::CollabError::Internal(format!("legacy snapshot migration failed: {e}")));
    }
    serde_json::from_value(value).map_err(|e| crate::CollabError::Internal(format!("snapshot decode failed: {e}")))
}

fn derived_rows(
    project_id: &str,
    snapshot: &Snapshot,
    ops: &[Operation],
    version: i64,
) -> Vec<GraphSnapshotRow> {
    let touched: std::collections::HashSet<&str> = ops.iter().map(|o| o.timeline_id.as_str()).collect();
    let now = Utc::now();
    touched
        .into_iter()
        .filter_map(|timeline_id| {
            let timeline = snapshot.timelines.get(timeline_id)?;
            let meta = snapshot.timelines_metadata.iter().find(|m| m.id == timeline_id);
            Some(GraphSnapshotRow {
                id: timeline_id.to_string(),
                project_id: project_id.to_string(),
                layers: serde_json::to_string(&timeline.layers).unwrap_or_else(|_| "{}".to_string()),
                metadata: serde_json::to_string(&timeline.metadata).unwrap_or_else(|_| "{}".to_string()),
                variables: serde_json::to_string(&timeline.variables).unwrap_or_else(|_| "[]".to_string()),
                name: meta.map(|m| m.name.clone()).unwrap_or_else(|| timeline_id.to_string()),
                order: meta.map(|m| m.order).unwrap_or(0),
                is_active: meta.map(|m| m.is_active).unwrap_or(true),
                version,
                timestamp: snapshot.last_modified,
                updated_at: now.to_rfc3339(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        for stmt in include_str!("../../migrations/0001_collab_core.sql").split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await.unwrap();
            }
        }
        pool
    }

    #[tokio::test]
    async fn test_get_project_snapshot_scaffolds_empty_project() {
        let pool = setup_pool().await;
        let store = SnapshotStore::new(pool);
        let (snapshot, version) = store.get_project_snapshot("p1", "u1").await.unwrap();
        assert!(snapshot.timelines.is_empty());
        assert_eq!(version, 0);
    }

    #[tokio::test]
    async fn test_save_changes_bumps_version_by_exactly_one() {
        let pool = setup_pool().await;
        let store = SnapshotStore::new(pool);
        let (snapshot, _) = store.get_project_snapshot("p1", "u1").await.unwrap();

        let op = Operation {
            id: "op1".into(),
            op_type: "node.created".into(),
            timeline_id: "t1".into(),
            layer_id: "root".into(),
            payload: serde_json::json!({"id": "n1", "type": "narrative", "coordinates": {"x": 0.0, "y": 0.0}, "data": {}}),
            timestamp: 1000,
            user_id: Some("u1".into()),
            device_id: "d1".into(),
        };
        let new_snapshot = crate::graph::ops::apply(&snapshot, &[op.clone()]);
        store
            .save_changes_in_transaction("p1", &new_snapshot, &[op], "u1", 1)
            .await
            .unwrap();

        assert_eq!(store.get_project_version("p1").await.unwrap(), 1);
        let ops = store.get_operations_after_version("p1", 0).await.unwrap();
        assert_eq!(ops.len(), 1);
    }
}
