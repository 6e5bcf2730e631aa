//! Per-Project Serializer: the only path through which an
//! operation batch becomes a committed version bump. Enforces per-project
//! FIFO ordering, the stale-version gate, and retries transient storage
//! conflicts with exponential backoff.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::access;
use crate::bus::{BusEvent, CoordinationBus};
use crate::db::models::OperationRow;
use crate::graph::{ops, payload::Operation};
use crate::store::SnapshotStore;
use crate::{CollabError, Result};
use dashmap::DashMap;

/// A client-submitted batch.
#[derive(Debug, Clone)]
pub struct Batch {
    pub operations: Vec<Operation>,
    pub project_id: String,
    pub last_sync_version: i64,
    pub device_id: String,
}

/// Outcome of `process_batch`.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub success: bool,
    pub sync_version: i64,
    pub applied_operations: Vec<String>,
    pub conflicts: Option<Vec<Operation>>,
    pub server_operations: Option<Vec<OperationRow>>,
}

const INITIAL_BACKOFF_MS: u64 = 50;

/// `bus` carries the live `OPERATION_BROADCAST` fan-out (shared with the
/// connection hub's socket-broadcast backend) while `ordering_bus` carries
/// the durable per-project operation log; the two are selected
/// independently (`use_shared_sockets` vs `use_shared_ordering`).
pub struct ProjectSerializer {
    store: Arc<SnapshotStore>,
    bus: Arc<dyn CoordinationBus>,
    ordering_bus: Arc<dyn CoordinationBus>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_retries: u32,
    initial_backoff_ms: u64,
}

impl ProjectSerializer {
    pub fn new(
        store: Arc<SnapshotStore>,
        bus: Arc<dyn CoordinationBus>,
        ordering_bus: Arc<dyn CoordinationBus>,
        max_retries: u32,
    ) -> Self {
        Self { store, bus, ordering_bus, locks: DashMap::new(), max_retries, initial_backoff_ms: INITIAL_BACKOFF_MS }
    }

    pub fn with_backoff(
        store: Arc<SnapshotStore>,
        bus: Arc<dyn CoordinationBus>,
        ordering_bus: Arc<dyn CoordinationBus>,
        max_retries: u32,
        initial_backoff_ms: u64,
    ) -> Self {
        Self { store, bus, ordering_bus, locks: DashMap::new(), max_retries, initial_backoff_ms }
    }

    fn lock_for(&self, project_id: &str) -> Arc<Mutex<()>> {
        self.locks.entry(project_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Process one batch for `project_id` on behalf of `user_id`. Batches
    /// for the same project never run concurrently; batches for different
    /// projects may.
    pub async fn process_batch(
        &self,
        user_id: &str,
        project_id: &str,
        batch: Batch,
        submitting_socket: Option<&str>,
    ) -> Result<SyncResult> {
        let lock = self.lock_for(project_id);
        let _guard = lock.lock().await;

        access::require_edit_access(self.store.pool(), project_id, user_id).await?;

        let (snapshot, current_version) = self.store.get_project_snapshot(project_id, user_id).await?;

        if batch.last_sync_version < current_version {
            let server_operations = self
                .store
                .get_operations_after_version(project_id, batch.last_sync_version)
                .await?;
            return Ok(SyncResult {
                success: false,
                sync_version: current_version,
                applied_operations: Vec::new(),
                conflicts: Some(batch.operations),
                server_operations: Some(server_operations),
            });
        }

        let new_snapshot = ops::apply(&snapshot, &batch.operations);
        let new_version = current_version + 1;

        let tagged_ops: Vec<Operation> = batch
            .operations
            .iter()
            .cloned()
            .map(|mut op| {
                op.user_id = Some(user_id.to_string());
                op.device_id = if op.device_id.is_empty() { batch.device_id.clone() } else { op.device_id };
                op
            })
            .collect();

        self.commit_with_retry(project_id, &new_snapshot, &tagged_ops, user_id, new_version)
            .await?;

        let applied_operations: Vec<String> = tagged_ops.iter().map(|op| op.id.clone()).collect();

        self.broadcast_commit(project_id, user_id, &tagged_ops, new_version, submitting_socket)
            .await?;

        Ok(SyncResult {
            success: true,
            sync_version: new_version,
            applied_operations,
            conflicts: None,
            server_operations: None,
        })
    }

    /// Commit, retrying transient storage conflicts with exponential
    /// backoff + jitter (initial 50ms, doubling, up to `max_retries`
    /// attempts, step 8).
    async fn commit_with_retry(
        &self,
        project_id: &str,
        new_snapshot: &crate::graph::Snapshot,
        ops: &[Operation],
        user_id: &str,
        new_version: i64,
    ) -> Result<()> {
        let mut attempt = 0u32;
        let mut backoff_ms = self.initial_backoff_ms;
        loop {
            match self
                .store
                .save_changes_in_transaction(project_id, new_snapshot, ops, user_id, new_version)
                .await
            {
                Ok(()) => return Ok(()),
                Err(err) if is_transient(&err) && attempt < self.max_retries => {
                    attempt += 1;
                    let jitter = rand::thread_rng().gen_range(0..=backoff_ms / 2);
                    tokio::time::sleep(Duration::from_millis(backoff_ms + jitter)).await;
                    backoff_ms *= 2;
                }
                Err(_) => return Err(CollabError::TransientStorage),
            }
        }
    }

    async fn broadcast_commit(
        &self,
        project_id: &str,
        user_id: &str,
        ops: &[Operation],
        version: i64,
        submitting_socket: Option<&str>,
    ) -> Result<()> {
        for op in ops {
            self.ordering_bus
                .append_operation(project_id, &serde_json::to_string(op).unwrap_or_default())
                .await?;
            let payload = serde_json::json!({
                "operation": op,
                "version": version,
            });
            self.bus
                .publish_to_project(
                    project_id,
                    BusEvent::new(
                        "OPERATION_BROADCAST",
                        payload,
                        user_id,
                        project_id,
                        op.timestamp,
                        self.bus.instance_id(),
                    )
                    .excluding(submitting_socket.map(str::to_string)),
                )
                .await?;
        }
        Ok(())
    }
}

fn is_transient(err: &CollabError) -> bool {
    matches!(err, CollabError::Store(_))
}

pub fn new_operation_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::store::SnapshotStore;

    async fn setup() -> (Arc<SnapshotStore>, ProjectSerializer) {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        for stmt in include_str!("../../migrations/0001_collab_core.sql").split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await.unwrap();
            }
        }
        sqlx::query("INSERT INTO project (id, data, creator_id, team_id, updated_at) VALUES ('p1', '{}', 'u1', NULL, '2026-01-01')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO project_version (project_id, version, last_sync) VALUES ('p1', 0, '2026-01-01')")
            .execute(&pool)
            .await
            .unwrap();

        let store = Arc::new(SnapshotStore::new(pool));
        let bus = Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)));
        let ordering_bus = Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)));
        let serializer = ProjectSerializer::new(store.clone(), bus, ordering_bus, 5);
        (store, serializer)
    }

    fn create_node_op(id: &str) -> Operation {
        Operation {
            id: format!("op-{id}"),
            op_type: "node.created".into(),
            timeline_id: "t1".into(),
            layer_id: "root".into(),
            payload: serde_json::json!({"id": id, "type": "narrative", "coordinates": {"x": 0.0, "y": 0.0}, "data": {}}),
            timestamp: 1000,
            user_id: None,
            device_id: "d1".into(),
        }
    }

    #[tokio::test]
    async fn test_process_batch_commits_and_bumps_version_by_one() {
        let (store, serializer) = setup().await;
        let batch = Batch {
            operations: vec![create_node_op("n1")],
            project_id: "p1".into(),
            last_sync_version: 0,
            device_id: "d1".into(),
        };
        let result = serializer.process_batch("u1", "p1", batch, None).await.unwrap();
        assert!(result.success);
        assert_eq!(result.sync_version, 1);
        assert_eq!(store.get_project_version("p1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_stale_batch_is_rejected_without_applying() {
        let (store, serializer) = setup().await;
        let batch1 = Batch {
            operations: vec![create_node_op("n1")],
            project_id: "p1".into(),
            last_sync_version: 0,
            device_id: "d1".into(),
        };
        serializer.process_batch("u1", "p1", batch1, None).await.unwrap();

        let stale_batch = Batch {
            operations: vec![create_node_op("n2")],
            project_id: "p1".into(),
            last_sync_version: 0,
            device_id: "d1".into(),
        };
        let result = serializer.process_batch("u1", "p1", stale_batch, None).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.sync_version, 1);
        assert!(result.server_operations.unwrap().len() == 1);
        assert_eq!(store.get_project_version("p1").await.unwrap(), 1);
    }
}
