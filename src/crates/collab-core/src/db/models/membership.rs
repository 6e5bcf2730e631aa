//! Membership tables backing the access gate
//!
//! Schema is free per; only presence and role semantics matter. Kept
//! deliberately thin — three tables, one role enum shared by team membership
//! and team-project attachment.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A role a user holds on a team. `Viewer` never grants edit access;
/// `Observer` additionally grants join/read access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum TeamRole {
    Administrator,
    Manager,
    Member,
    Observer,
    Viewer,
}

impl TeamRole {
    /// Team roles that satisfy `canEdit`.
    pub fn grants_edit(self) -> bool {
        matches!(self, TeamRole::Administrator | TeamRole::Manager | TeamRole::Member)
    }

    /// Team roles that satisfy `canJoin` but not necessarily edit.
    pub fn grants_join(self) -> bool {
        self.grants_edit() || matches!(self, TeamRole::Observer)
    }
}

/// Direct project membership. A non-`VIEWER` role grants edit.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ProjectMember {
    pub project_id: String,
    pub user_id: String,
    pub role: TeamRole,
}

/// A user's role within a team.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamMember {
    pub team_id: String,
    pub user_id: String,
    pub role: TeamRole,
}

/// Attachment of a project to a team, enabling the team-role fallback.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TeamProject {
    pub team_id: String,
    pub project_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_viewer_does_not_grant_edit() {
        assert!(!TeamRole::Viewer.grants_edit());
    }

    #[test]
    fn test_observer_grants_join_not_edit() {
        assert!(!TeamRole::Observer.grants_edit());
        assert!(TeamRole::Observer.grants_join());
    }

    #[test]
    fn test_member_grants_both() {
        assert!(TeamRole::Member.grants_edit());
        assert!(TeamRole::Member.grants_join());
    }
}
