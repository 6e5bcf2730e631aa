//! Operation log repository
//!
//! Backs `getOperationsAfterVersion`, used both to serve stale clients their
//! missed batch and to reconstruct audit history.

use crate::db::connection::DatabasePool;
use crate::db::models::OperationRow;
use sqlx::{Sqlite, Transaction};

pub struct OperationRepository;

impl OperationRepository {
    /// Insert one operation row within an open transaction.
    pub async fn insert(
        tx: &mut Transaction<'_, Sqlite>,
        op: &OperationRow,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO operation (id, project_id, type, timeline_id, layer_id, payload, timestamp, user_id, device_id, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&op.id)
        .bind(&op.project_id)
        .bind(&op.r#type)
        .bind(&op.timeline_id)
        .bind(&op.layer_id)
        .bind(&op.payload)
        .bind(op.timestamp)
        .bind(&op.user_id)
        .bind(&op.device_id)
        .bind(op.version)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Operations with `version > after_version`, ascending by version.
    pub async fn get_after_version(
        pool: &DatabasePool,
        project_id: &str,
        after_version: i64,
    ) -> Result<Vec<OperationRow>, sqlx::Error> {
        sqlx::query_as::<_, OperationRow>(
            "SELECT * FROM operation WHERE project_id = ? AND version > ? ORDER BY version ASC",
        )
        .bind(project_id)
        .bind(after_version)
        .fetch_all(pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE operation (
                id TEXT PRIMARY KEY NOT NULL,
                project_id TEXT NOT NULL,
                type TEXT NOT NULL,
                timeline_id TEXT NOT NULL,
                layer_id TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                user_id TEXT,
                device_id TEXT NOT NULL,
                version INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn row(id: &str, version: i64) -> OperationRow {
        OperationRow {
            id: id.into(),
            project_id: "p1".into(),
            r#type: "node.added".into(),
            timeline_id: "t".into(),
            layer_id: "root".into(),
            payload: "{}".into(),
            timestamp: 1000,
            user_id: Some("u1".into()),
            device_id: "d1".into(),
            version,
        }
    }

    #[tokio::test]
    async fn test_get_after_version_is_ascending_and_exclusive() {
        let pool = setup_db().await;
        let mut tx = pool.begin().await.unwrap();
        OperationRepository::insert(&mut tx, &row("op1", 1)).await.unwrap();
        OperationRepository::insert(&mut tx, &row("op2", 2)).await.unwrap();
        OperationRepository::insert(&mut tx, &row("op3", 3)).await.unwrap();
        tx.commit().await.unwrap();

        let ops = OperationRepository::get_after_version(&pool, "p1", 1).await.unwrap();
        assert_eq!(ops.iter().map(|o| o.version).collect::<Vec<_>>(), vec![2, 3]);
    }
}
