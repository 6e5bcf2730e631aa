//! Cross-instance coordination bus.
//!
//! Abstracts the plane that must be shared across server instances: project
//! pub/sub, session/presence key-value storage, and the durable per-project
//! operation stream. Two implementations exist behind the same trait: an
//! in-process one for single-instance deployments and tests, and a
//! redis-backed one for horizontally scaled deployments.

pub mod event;
pub mod in_process;
pub mod redis_backend;

pub use event::BusEvent;
pub use in_process::InProcessBus;
pub use redis_backend::RedisBus;

use async_trait::async_trait;
use std::sync::Arc;

use crate::Result;

/// A handler invoked for every event published to a subscribed project.
pub type EventHandler = Arc<dyn Fn(BusEvent) + Send + Sync>;

#[async_trait]
pub trait CoordinationBus: Send + Sync {
    /// This instance's identity, stamped onto every event this process
    /// publishes so subscribers can detect and ignore their own echoes.
    fn instance_id(&self) -> &str;

    async fn publish_to_project(&self, project_id: &str, event: BusEvent) -> Result<()>;
    async fn subscribe_to_project(&self, project_id: &str, handler: EventHandler) -> Result<()>;
    async fn unsubscribe_from_project(&self, project_id: &str) -> Result<()>;

    async fn save_session(
        &self,
        session_id: &str,
        user_id: &str,
        project_id: &str,
        session_json: &str,
    ) -> Result<()>;
    async fn get_session(&self, session_id: &str) -> Result<Option<String>>;
    async fn remove_session(&self, session_id: &str, user_id: &str, project_id: &str) -> Result<()>;
    async fn get_project_sessions(&self, project_id: &str) -> Result<Vec<String>>;
    async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<String>>;

    async fn set_socket_session_mapping(&self, socket_id: &str, session_id: &str) -> Result<()>;
    async fn get_session_id_by_socket(&self, socket_id: &str) -> Result<Option<String>>;
    async fn remove_socket_session_mapping(&self, socket_id: &str) -> Result<()>;

    /// Append one committed operation record to the durable per-project
    /// stream.
    async fn append_operation(&self, project_id: &str, op_record_json: &str) -> Result<()>;
}
