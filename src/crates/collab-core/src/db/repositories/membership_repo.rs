//! Membership repository backing the access gate

use crate::db::connection::DatabasePool;
use crate::db::models::{ProjectMember, TeamMember, TeamProject, TeamRole};

pub struct MembershipRepository;

impl MembershipRepository {
    /// Direct project membership row, if any.
    pub async fn get_project_member(
        pool: &DatabasePool,
        project_id: &str,
        user_id: &str,
    ) -> Result<Option<ProjectMember>, sqlx::Error> {
        sqlx::query_as::<_, ProjectMember>(
            "SELECT * FROM project_member WHERE project_id = ? AND user_id = ?",
        )
        .bind(project_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }

    /// The team a project is attached to, if any.
    pub async fn get_team_for_project(
        pool: &DatabasePool,
        project_id: &str,
    ) -> Result<Option<TeamProject>, sqlx::Error> {
        sqlx::query_as::<_, TeamProject>("SELECT * FROM team_project WHERE project_id = ?")
            .bind(project_id)
            .fetch_optional(pool)
            .await
    }

    /// A user's role on a given team, if a member.
    pub async fn get_team_role(
        pool: &DatabasePool,
        team_id: &str,
        user_id: &str,
    ) -> Result<Option<TeamRole>, sqlx::Error> {
        let row: Option<TeamMember> =
            sqlx::query_as("SELECT * FROM team_member WHERE team_id = ? AND user_id = ?")
                .bind(team_id)
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        Ok(row.map(|m| m.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_db() -> DatabasePool {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE project_member (project_id TEXT NOT NULL, user_id TEXT NOT NULL, role TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE team_member (team_id TEXT NOT NULL, user_id TEXT NOT NULL, role TEXT NOT NULL)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query("CREATE TABLE team_project (team_id TEXT NOT NULL, project_id TEXT NOT NULL)")
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_get_team_role_for_member() {
        let pool = setup_db().await;
        sqlx::query("INSERT INTO team_member (team_id, user_id, role) VALUES ('team1', 'u1', 'MEMBER')")
            .execute(&pool)
            .await
            .unwrap();

        let role = MembershipRepository::get_team_role(&pool, "team1", "u1").await.unwrap();
        assert_eq!(role, Some(TeamRole::Member));
    }

    #[tokio::test]
    async fn test_get_project_member_absent() {
        let pool = setup_db().await;
        let member = MembershipRepository::get_project_member(&pool, "p1", "u1").await.unwrap();
        assert!(member.is_none());
    }
}
