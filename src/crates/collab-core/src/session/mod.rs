//! Session Registry: tracks active `CollaborationSession`s, enforcing at
//! most one session per socket and at most one per `(userId, projectId)`.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::bus::{BusEvent, CoordinationBus};
use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Awareness {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_picture: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<serde_json::Value>,
    pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollaborationSession {
    pub id: String,
    pub user_id: String,
    pub project_id: String,
    pub socket_id: String,
    pub awareness: Awareness,
    pub joined_at: i64,
    pub last_activity: i64,
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// In-process session registry. `bus` carries presence/awareness fan-out
/// (shared with the connection hub's socket-broadcast backend) while
/// `session_store` carries the actual session key-value mirroring; the two
/// are selected independently (`use_shared_sockets` vs `use_shared_sessions`)
/// so either can run in-process while the other runs against the shared
/// backend.
pub struct SessionRegistry {
    sessions: DashMap<String, CollaborationSession>,
    by_socket: DashMap<String, String>,
    by_user_project: DashMap<(String, String), String>,
    by_project: DashMap<String, Vec<String>>,
    bus: Arc<dyn CoordinationBus>,
    session_store: Arc<dyn CoordinationBus>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(bus: Arc<dyn CoordinationBus>, session_store: Arc<dyn CoordinationBus>, idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            by_socket: DashMap::new(),
            by_user_project: DashMap::new(),
            by_project: DashMap::new(),
            bus,
            session_store,
            idle_timeout,
        }
    }

    /// Create a session for `(userId, projectId, socketId)`. Idempotent on
    /// `socketId`; supersedes any pre-existing session for `(userId,
    /// projectId)`, broadcasting `USER_LEAVE` for the superseded one.
    pub async fn create_session(
        &self,
        user_id: &str,
        user_name: &str,
        project_id: &str,
        socket_id: &str,
    ) -> Result<CollaborationSession> {
        if let Some(existing_id) = self.by_socket.get(socket_id).map(|e| e.clone()) {
            if let Some(existing) = self.sessions.get(&existing_id) {
                return Ok(existing.clone());
            }
        }

        let key = (user_id.to_string(), project_id.to_string());
        if let Some(old_session_id) = self.by_user_project.get(&key).map(|e| e.clone()) {
            self.end_session(&old_session_id).await?;
        }

        let now = now_ms();
        let session = CollaborationSession {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            project_id: project_id.to_string(),
            socket_id: socket_id.to_string(),
            awareness: Awareness {
                user_id: user_id.to_string(),
                user_name: user_name.to_string(),
                user_picture: None,
                cursor: None,
                selection: None,
                last_seen: now,
            },
            joined_at: now,
            last_activity: now,
        };

        self.sessions.insert(session.id.clone(), session.clone());
        self.by_socket.insert(socket_id.to_string(), session.id.clone());
        self.by_user_project.insert(key, session.id.clone());
        self.by_project.entry(project_id.to_string()).or_default().push(session.id.clone());

        if let Ok(session_json) = serde_json::to_string(&session) {
            self.session_store.save_session(&session.id, user_id, project_id, &session_json).await?;
        }
        self.session_store.set_socket_session_mapping(socket_id, &session.id).await?;

        self.bus
            .publish_to_project(
                project_id,
                BusEvent::new(
                    "USER_JOIN",
                    serde_json::to_value(&session.awareness).unwrap_or_default(),
                    user_id,
                    project_id,
                    now,
                    self.bus.instance_id(),
                )
                .excluding(Some(socket_id.to_string())),
            )
            .await?;

        Ok(session)
    }

    /// End a session: broadcast `USER_LEAVE` before removing it from every
    /// index.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let Some((_, session)) = self.sessions.remove(session_id) else {
            return Ok(());
        };

        self.bus
            .publish_to_project(
                &session.project_id,
                BusEvent::new(
                    "USER_LEAVE",
                    serde_json::json!({ "userId": session.user_id, "sessionId": session.id }),
                    &session.user_id,
                    &session.project_id,
                    now_ms(),
                    self.bus.instance_id(),
                ),
            )
            .await?;

        self.by_socket.remove(&session.socket_id);
        self.by_user_project.remove(&(session.user_id.clone(), session.project_id.clone()));
        if let Some(mut ids) = self.by_project.get_mut(&session.project_id) {
            ids.retain(|id| id != session_id);
        }

        self.session_store.remove_session(&session.id, &session.user_id, &session.project_id).await?;
        self.session_store.remove_socket_session_mapping(&session.socket_id).await?;

        Ok(())
    }

    /// Shallow-merge `patch` into the session's `awareness`, bump
    /// `last_seen`/`last_activity`, and broadcast `AWARENESS_UPDATE`.
    pub async fn update_awareness(&self, session_id: &str, patch: serde_json::Value) -> Result<()> {
        let now = now_ms();
        let (project_id, user_id, merged) = {
            let mut session = match self.sessions.get_mut(session_id) {
                Some(s) => s,
                None => return Ok(()),
            };
            if let (Some(obj), Some(patch_obj)) =
                (serde_json::to_value(&session.awareness).ok().and_then(|v| v.as_object().cloned()), patch.as_object())
            {
                let mut merged_map = obj;
                for (k, v) in patch_obj {
                    merged_map.insert(k.clone(), v.clone());
                }
                merged_map.insert("lastSeen".to_string(), serde_json::json!(now));
                if let Ok(awareness) = serde_json::from_value(serde_json::Value::Object(merged_map.clone())) {
                    session.awareness = awareness;
                }
            }
            session.last_activity = now;
            (session.project_id.clone(), session.user_id.clone(), session.awareness.clone())
        };

        self.bus
            .publish_to_project(
                &project_id,
                BusEvent::new(
                    "AWARENESS_UPDATE",
                    serde_json::to_value(&merged).unwrap_or_default(),
                    &user_id,
                    &project_id,
                    now,
                    self.bus.instance_id(),
                ),
            )
            .await?;
        Ok(())
    }

    /// Local sessions for `project_id`, plus any sessions other instances
    /// have mirrored through the bus that this process doesn't hold
    /// locally (relevant only when the bus is a shared backend).
    pub async fn get_project_sessions(&self, project_id: &str) -> Result<Vec<CollaborationSession>> {
        let mut sessions: Vec<CollaborationSession> = self
            .by_project
            .get(project_id)
            .map(|ids| ids.iter().filter_map(|id| self.sessions.get(id).map(|s| s.clone())).collect())
            .unwrap_or_default();

        let known: std::collections::HashSet<String> = sessions.iter().map(|s| s.id.clone()).collect();
        for remote_id in self.session_store.get_project_sessions(project_id).await? {
            if known.contains(&remote_id) {
                continue;
            }
            if let Some(json) = self.session_store.get_session(&remote_id).await? {
                if let Ok(session) = serde_json::from_str::<CollaborationSession>(&json) {
                    sessions.push(session);
                }
            }
        }
        Ok(sessions)
    }

    pub async fn get_session_by_socket_id(&self, socket_id: &str) -> Result<Option<CollaborationSession>> {
        if let Some(session_id) = self.by_socket.get(socket_id).map(|e| e.clone()) {
            if let Some(session) = self.sessions.get(&session_id) {
                return Ok(Some(session.clone()));
            }
        }
        let Some(session_id) = self.session_store.get_session_id_by_socket(socket_id).await? else {
            return Ok(None);
        };
        let Some(json) = self.session_store.get_session(&session_id).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&json).ok())
    }

    /// End every session whose `last_activity` predates the idle timeout
    ///.
    pub async fn cleanup_inactive_sessions(&self) -> Result<usize> {
        let now = now_ms();
        let cutoff = self.idle_timeout.as_millis() as i64;
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|entry| now - entry.last_activity > cutoff)
            .map(|entry| entry.key().clone())
            .collect();
        let count = stale.len();
        for session_id in stale {
            self.end_session(&session_id).await?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;

    fn bus() -> Arc<dyn CoordinationBus> {
        Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)))
    }

    #[tokio::test]
    async fn test_create_session_is_idempotent_on_socket() {
        let registry = SessionRegistry::new(bus(), bus(), Duration::from_secs(300));
        let s1 = registry.create_session("u1", "Alice", "p1", "sock1").await.unwrap();
        let s2 = registry.create_session("u1", "Alice", "p1", "sock1").await.unwrap();
        assert_eq!(s1.id, s2.id);
    }

    #[tokio::test]
    async fn test_reconnect_supersedes_old_session_i5() {
        let registry = SessionRegistry::new(bus(), bus(), Duration::from_secs(300));
        let s1 = registry.create_session("u1", "Alice", "p1", "sock1").await.unwrap();
        let s2 = registry.create_session("u1", "Alice", "p1", "sock2").await.unwrap();
        assert_ne!(s1.id, s2.id);
        assert!(registry.get_session_by_socket_id("sock1").await.unwrap().is_none());
        let sessions = registry.get_project_sessions("p1").await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, s2.id);
    }

    #[tokio::test]
    async fn test_end_session_removes_from_all_indexes() {
        let registry = SessionRegistry::new(bus(), bus(), Duration::from_secs(300));
        let session = registry.create_session("u1", "Alice", "p1", "sock1").await.unwrap();
        registry.end_session(&session.id).await.unwrap();
        assert!(registry.get_session_by_socket_id("sock1").await.unwrap().is_none());
        assert!(registry.get_project_sessions("p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_inactive_sessions_ends_stale_ones() {
        let registry = SessionRegistry::new(bus(), bus(), Duration::from_millis(1));
        registry.create_session("u1", "Alice", "p1", "sock1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let ended = registry.cleanup_inactive_sessions().await.unwrap();
        assert_eq!(ended, 1);
        assert!(registry.get_project_sessions("p1").await.unwrap().is_empty());
    }
}
