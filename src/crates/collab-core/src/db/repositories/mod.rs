//! Repository pattern implementations for database access.
//!
//! One static-method repository per logical table family.

pub mod graph_snapshot_repo;
pub mod membership_repo;
pub mod operation_repo;
pub mod project_repo;

pub use graph_snapshot_repo::GraphSnapshotRepository;
pub use membership_repo::MembershipRepository;
pub use operation_repo::OperationRepository;
pub use project_repo::ProjectRepository;
