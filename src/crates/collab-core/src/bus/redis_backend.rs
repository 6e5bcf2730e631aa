//! Redis-backed `CoordinationBus` implementation.
//!
//! Pub/sub for cross-instance fan-out, plain keys with `EXPIRE` for session
//! state and the socket→session reverse index, and a `RPUSH`-based list per
//! project for the durable operation stream.

use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::{BusEvent, CoordinationBus, EventHandler};
use crate::{CollabError, Result};

fn session_key(session_id: &str) -> String {
    format!("collab:session:{session_id}")
}

fn socket_key(socket_id: &str) -> String {
    format!("collab:socket:{socket_id}")
}

fn project_sessions_key(project_id: &str) -> String {
    format!("collab:project_sessions:{project_id}")
}

fn user_sessions_key(user_id: &str) -> String {
    format!("collab:user_sessions:{user_id}")
}

fn operation_stream_key(project_id: &str) -> String {
    format!("collab:ops:{project_id}")
}

fn project_channel(project_id: &str) -> String {
    format!("collab:channel:{project_id}")
}

pub struct RedisBus {
    instance_id: String,
    session_ttl: Duration,
    client: redis::Client,
    manager: redis::aio::ConnectionManager,
    subscriptions: DashMap<String, JoinHandle<()>>,
}

impl RedisBus {
    pub async fn connect(
        redis_url: &str,
        instance_id: impl Into<String>,
        session_ttl: Duration,
    ) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| CollabError::Internal(format!("invalid redis url: {e}")))?;
        let manager = client
            .get_tokio_connection_manager()
            .await
            .map_err(|e| CollabError::Internal(format!("redis connection failed: {e}")))?;
        Ok(Self {
            instance_id: instance_id.into(),
            session_ttl,
            client,
            manager,
            subscriptions: DashMap::new(),
        })
    }

    fn conn(&self) -> redis::aio::ConnectionManager {
        self.manager.clone()
    }
}

#[async_trait]
impl CoordinationBus for RedisBus {
    fn instance_id(&self) -> &str {
        &self.instance_id
    }

    async fn publish_to_project(&self, project_id: &str, event: BusEvent) -> Result<()> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| CollabError::Internal(format!("event serialization failed: {e}")))?;
        let mut conn = self.conn();
        conn.publish::<_, _, ()>(project_channel(project_id), payload)
            .await
            .map_err(|e| CollabError::Internal(format!("redis publish failed: {e}")))?;
        Ok(())
    }

    async fn subscribe_to_project(&self, project_id: &str, handler: EventHandler) -> Result<()> {
        let channel = project_channel(project_id);
        let instance_id = self.instance_id.clone();
        let client = self.client.clone();

        let task = tokio::spawn(async move {
            let mut pubsub = match client.get_async_pubsub().await {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(error = %e, "redis pubsub connection failed");
                    return;
                }
            };
            if let Err(e) = pubsub.subscribe(&channel).await {
                tracing::warn!(error = %e, channel, "redis subscribe failed");
                return;
            }
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next_message().await {
                let raw: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(_) => continue,
                };
                let event: BusEvent = match serde_json::from_str(&raw) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                if event.source_instance_id == instance_id {
                    continue;
                }
                handler(event);
            }
        });

        self.subscriptions.insert(project_id.to_string(), task);
        Ok(())
    }

    async fn unsubscribe_from_project(&self, project_id: &str) -> Result<()> {
        if let Some((_, task)) = self.subscriptions.remove(project_id) {
            task.abort();
        }
        Ok(())
    }

    async fn save_session(
        &self,
        session_id: &str,
        user_id: &str,
        project_id: &str,
        session_json: &str,
    ) -> Result<()> {
        let mut conn = self.conn();
        let ttl = self.session_ttl.as_secs();
        conn.set_ex::<_, _, ()>(session_key(session_id), session_json, ttl)
            .await
            .map_err(|e| CollabError::Internal(format!("redis set failed: {e}")))?;
        let project_key = project_sessions_key(project_id);
        conn.sadd::<_, _, ()>(&project_key, session_id)
            .await
            .map_err(|e| CollabError::Internal(format!("redis sadd failed: {e}")))?;
        conn.expire::<_, ()>(&project_key, ttl as i64)
            .await
            .map_err(|e| CollabError::Internal(format!("redis expire failed: {e}")))?;
        let user_key = user_sessions_key(user_id);
        conn.sadd::<_, _, ()>(&user_key, session_id)
            .await
            .map_err(|e| CollabError::Internal(format!("redis sadd failed: {e}")))?;
        conn.expire::<_, ()>(&user_key, ttl as i64)
            .await
            .map_err(|e| CollabError::Internal(format!("redis expire failed: {e}")))?;
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn
            .get(session_key(session_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis get failed: {e}")))?;
        Ok(value)
    }

    async fn remove_session(&self, session_id: &str, user_id: &str, project_id: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(session_key(session_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis del failed: {e}")))?;
        conn.srem::<_, _, ()>(project_sessions_key(project_id), session_id)
            .await
            .map_err(|e| CollabError::Internal(format!("redis srem failed: {e}")))?;
        conn.srem::<_, _, ()>(user_sessions_key(user_id), session_id)
            .await
            .map_err(|e| CollabError::Internal(format!("redis srem failed: {e}")))?;
        Ok(())
    }

    async fn get_project_sessions(&self, project_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn
            .smembers(project_sessions_key(project_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis smembers failed: {e}")))?;
        Ok(members)
    }

    async fn get_user_sessions(&self, user_id: &str) -> Result<Vec<String>> {
        let mut conn = self.conn();
        let members: Vec<String> = conn
            .smembers(user_sessions_key(user_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis smembers failed: {e}")))?;
        Ok(members)
    }

    async fn set_socket_session_mapping(&self, socket_id: &str, session_id: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.set_ex::<_, _, ()>(socket_key(socket_id), session_id, self.session_ttl.as_secs())
            .await
            .map_err(|e| CollabError::Internal(format!("redis set failed: {e}")))?;
        Ok(())
    }

    async fn get_session_id_by_socket(&self, socket_id: &str) -> Result<Option<String>> {
        let mut conn = self.conn();
        let value: Option<String> = conn
            .get(socket_key(socket_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis get failed: {e}")))?;
        Ok(value)
    }

    async fn remove_socket_session_mapping(&self, socket_id: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.del::<_, ()>(socket_key(socket_id))
            .await
            .map_err(|e| CollabError::Internal(format!("redis del failed: {e}")))?;
        Ok(())
    }

    async fn append_operation(&self, project_id: &str, op_record_json: &str) -> Result<()> {
        let mut conn = self.conn();
        conn.rpush::<_, _, ()>(operation_stream_key(project_id), op_record_json)
            .await
            .map_err(|e| CollabError::Internal(format!("redis rpush failed: {e}")))?;
        Ok(())
    }
}
