//! Access gate: resolves whether a user may view or edit a
//! project, and at what effective role, by walking creator -> direct
//! membership -> team role -> deny.

use crate::db::connection::DatabasePool;
use crate::db::models::Project;
use crate::db::repositories::{MembershipRepository, ProjectRepository};
use crate::{CollabError, Result};

/// Effective access level a caller has on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccessLevel {
    /// Can join/observe a session and receive broadcasts, not mutate.
    View,
    /// Can submit operations and mutate the graph.
    Edit,
}

/// Resolve `user_id`'s access to `project_id`.
///
/// Order: creator always gets `Edit`; a direct project membership row
/// (other than an explicit `OBSERVER` role) grants `Edit`; failing that,
/// the project's team role is consulted (`ADMINISTRATOR`/`MANAGER`/`MEMBER`
/// grant `Edit`, `OBSERVER`-equivalent team roles grant `View`); otherwise
/// access is denied.
pub async fn resolve_access(
    pool: &DatabasePool,
    project_id: &str,
    user_id: &str,
) -> Result<AccessLevel> {
    let project = ProjectRepository::get(pool, project_id)
        .await?
        .ok_or_else(|| CollabError::NotFound(format!("project {project_id}")))?;

    if project_creator_matches(&project, user_id) {
        return Ok(AccessLevel::Edit);
    }

    if let Some(member) = MembershipRepository::get_project_member(pool, project_id, user_id).await? {
        return Ok(if member.role.grants_edit() {
            AccessLevel::Edit
        } else if member.role.grants_join() {
            AccessLevel::View
        } else {
            return Err(CollabError::AccessDenied);
        });
    }

    if let Some(team) = MembershipRepository::get_team_for_project(pool, project_id).await? {
        if let Some(role) = MembershipRepository::get_team_role(pool, &team.team_id, user_id).await? {
            return Ok(if role.grants_edit() {
                AccessLevel::Edit
            } else if role.grants_join() {
                AccessLevel::View
            } else {
                return Err(CollabError::AccessDenied);
            });
        }
    }

    Err(CollabError::AccessDenied)
}

/// Convenience check used by operation-submission paths, which require
/// `Edit` and treat anything less as denial.
pub async fn require_edit_access(pool: &DatabasePool, project_id: &str, user_id: &str) -> Result<()> {
    match resolve_access(pool, project_id, user_id).await? {
        AccessLevel::Edit => Ok(()),
        AccessLevel::View => Err(CollabError::AccessDenied),
    }
}

fn project_creator_matches(project: &Project, user_id: &str) -> bool {
    project.creator_id == user_id
}
