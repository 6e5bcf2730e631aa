//! Project repository
//!
//! Backs `getProjectSnapshot`/`getProjectVersion` and the version-bump half of
//! `saveChangesInTransaction`. The snapshot write and version bump are
//! two statements inside the caller's transaction so they land atomically
//! with the operation-log insert.

use crate::db::connection::DatabasePool;
use crate::db::models::{Project, ProjectVersion};
use chrono::Utc;
use sqlx::{Sqlite, Transaction};

pub struct ProjectRepository;

impl ProjectRepository {
    /// Fetch a project row, if it exists.
    pub async fn get(pool: &DatabasePool, project_id: &str) -> Result<Option<Project>, sqlx::Error> {
        sqlx::query_as::<_, Project>("SELECT * FROM project WHERE id = ?")
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// Fetch the current version, defaulting to 0 for a project with no row yet.
    pub async fn get_version(pool: &DatabasePool, project_id: &str) -> Result<i64, sqlx::Error> {
        let row: Option<ProjectVersion> =
            sqlx::query_as("SELECT * FROM project_version WHERE project_id = ?")
                .bind(project_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|r| r.version).unwrap_or(0))
    }

    /// Create an empty scaffold project + version row if none exists yet.
    pub async fn create_scaffold(
        pool: &DatabasePool,
        project_id: &str,
        creator_id: &str,
        empty_snapshot_json: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT OR IGNORE INTO project (id, data, creator_id, team_id, updated_at) VALUES (?, ?, ?, NULL, ?)",
        )
        .bind(project_id)
        .bind(empty_snapshot_json)
        .bind(creator_id)
        .bind(&now)
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO project_version (project_id, version, last_sync) VALUES (?, 0, ?)",
        )
        .bind(project_id)
        .bind(&now)
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Overwrite the snapshot blob within an open transaction.
    pub async fn write_snapshot(
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &str,
        snapshot_json: &str,
    ) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("UPDATE project SET data = ?, updated_at = ? WHERE id = ?")
            .bind(snapshot_json)
            .bind(&now)
            .bind(project_id)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Bump `project_version` by exactly 1 and return the new value.
    pub async fn bump_version(
        tx: &mut Transaction<'_, Sqlite>,
        project_id: &str,
    ) -> Result<i64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE project_version SET version = version + 1, last_sync = ? WHERE project_id = ?",
        )
        .bind(&now)
        .bind(project_id)
        .execute(&mut **tx)
        .await?;

        let row: ProjectVersion = sqlx::query_as("SELECT * FROM project_version WHERE project_id = ?")
            .bind(project_id)
            .fetch_one(&mut **tx)
            .await?;
        Ok(row.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE project (
                id TEXT PRIMARY KEY NOT NULL,
                data TEXT NOT NULL,
                creator_id TEXT NOT NULL,
                team_id TEXT,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE project_version (
                project_id TEXT PRIMARY KEY NOT NULL,
                version INTEGER NOT NULL,
                last_sync TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_scaffold_starts_at_version_zero() {
        let pool = setup_db().await;
        ProjectRepository::create_scaffold(&pool, "p1", "u1", "{}").await.unwrap();
        assert_eq!(ProjectRepository::get_version(&pool, "p1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bump_version_increments_by_one() {
        let pool = setup_db().await;
        ProjectRepository::create_scaffold(&pool, "p1", "u1", "{}").await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        let v = ProjectRepository::bump_version(&mut tx, "p1").await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(v, 1);
        assert_eq!(ProjectRepository::get_version(&pool, "p1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_scaffold_is_idempotent() {
        let pool = setup_db().await;
        ProjectRepository::create_scaffold(&pool, "p1", "u1", "{}").await.unwrap();
        ProjectRepository::create_scaffold(&pool, "p1", "u1", "{\"ignored\":true}").await.unwrap();

        let project = ProjectRepository::get(&pool, "p1").await.unwrap().unwrap();
        assert_eq!(project.data, "{}");
    }
}
