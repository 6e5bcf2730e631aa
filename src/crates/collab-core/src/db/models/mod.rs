//! Database models
//!
//! Core data models for persistent storage in the collaboration core.
//! All timestamp fields are stored as ISO8601 strings (TEXT in SQLite) due to
//! sqlx and SQLite type limitations with chrono::DateTime<Utc>.

pub mod graph_snapshot;
pub mod membership;
pub mod operation;
pub mod project;

pub use graph_snapshot::GraphSnapshotRow;
pub use membership::{ProjectMember, TeamMember, TeamProject, TeamRole};
pub use operation::OperationRow;
pub use project::{Project, ProjectVersion};
