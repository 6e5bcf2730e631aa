//! In-process `CoordinationBus` implementation.
//!
//! Used for single-instance deployments and tests. All state lives in
//! local maps; `publish_to_project` delivers synchronously to local
//! subscribers since there is no other instance to hear the event.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use super::{BusEvent, CoordinationBus, EventHandler};
use crate::Result;

struct TtlEntry {
    value: String,
    inserted_at: Instant,
}

pub struct InProcessBus {
    instance_id: String,
    session_ttl: Duration,
    sessions: DashMap<String, TtlEntry>,
    socket_to_session: DashMap<String, TtlEntry>,
    project_sessions: DashMap<String, HashSet<String>>,
    user_sessions: DashMap<String, HashSet<String>>,
    subscribers: DashMap<String, Mutex<Vec<EventHandler>>>,
    operation_streams: DashMap<String, Vec<String>>,
}

impl InProcessBus {
    pub fn new(instance_id: impl Into<String>, session_ttl: Duration) -> Self {
        Self {
            instance_id: instance_id.into(),
            session_ttl,
            sessions: DashMap::new(),
            socket_to_session: DashMap::new(),
            project_sessions: DashMap::new(),
            user_sessions: DashMap::new(),
            subscribers: DashMap::new(),
            operation_streams: DashMap::new(),
        }
    }

    fn is_expired(&self, entry: &TtlEntry) -> bool {
        entry.inserted_at.elapsed() > self.session_ttl
    }
}

#[async_trait]
impl CoordinationBus for InProcessBus {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn publish_to_project(&self, project_id: &str, event: BusEvent) -> Result<()> {
        if let Some(handlers) = self.subscribers.get(project_id) {
            for handler in handlers.lock().iter() {
                handler(event.clone());
            }
        }
        Ok(())
    }

    async fn subscribe_to_project(&self, project_id: &str, handler: EventHandler) -> Result<()> {
        self.subscribers
            .entry(project_id.to_string())
            .or_insert_with(|| Mutex::new(Vec::new()))
            .lock()
            .push(handler);
        Ok(())
    }

    async fn unsubscribe_from_project(&self, project_id: &str) -> Result<()> {
        self.subscribers.remove(project_id);
        Ok(())
    }

    async fn save_session(
        &self,
        session_id: &str,
        user_id: &str,
        project_id: &str,
        session_json: &str,
    ) -> Result<()> {
        self.sessions.insert(
            session_id.to_string(),
            TtlEntry { value: session_json.to_string(), inserted_at: Instant::now() },
        );
        self.project_sessions.entry(project_id.to_string()).or_default().insert(session_id.to_string());
        self.user_sessions.entry(user_id.to_string()).or_default().insert(session_id.to_string());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<String>> {
        Ok(self.sessions.get(session_id).and_then(|e| {
            if self.is_expired(&e) {
                None
            } else {
                Some(e.value.clone())
            }
        }))
    }

    async fn remove_session(&self, session_id: &str, user_id: &str, project_id: &str) -> Result<()> {
        self.sessions.remove(session_id);
        if let Some(mut ids) = self.project_sessions.get_mut(project_id) {
            ids.remove(session_id);
        }
        if let Some(mut ids) = self.user_sessions.get_mut(user_id) {
            ids.remove(session_id);
        }
        Ok(())
    }

    async fn get_project_sessions(&self, project_id: &str) -> Result<Vec<String>> {
        Ok(self
            .project_sessions
            .get(project_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .user_sessions
            .get(user_id)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_socket_session_mapping(&self, socket_id: &str, session_id: &str) -> Result<()> {
        self.socket_to_session.insert(
            socket_id.to_string(),
            TtlEntry { value: session_id.to_string(), inserted_at: Instant::now() },
        );
        Ok(())
    }

    async fn get_session_id_by_socket(&self, socket_id: &str) -> Result<Option<String>> {
        Ok(self.socket_to_session.get(socket_id).and_then(|e| {
            if self.is_expired(&e) {
                None
            } else {
                Some(e.value.clone())
            }
        }))
    }

    async fn remove_socket_session_mapping(&self, socket_id: &str) -> Result<()> {
        self.socket_to_session.remove(socket_id);
        Ok(())
    }

    async fn append_operation(&self, project_id: &str, op_record_json: &str) -> Result<()> {
        self.operation_streams
            .entry(project_id.to_string())
            .or_default()
            .push(op_record_json.to_string());
        Ok(())
    }
}
