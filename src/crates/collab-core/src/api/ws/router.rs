//! Event Router: a static `eventType -> handler` table. Every validated
//! inbound event is classified (`events::classify`) and handed to the
//! matching handler: awareness (delegates to the session registry and
//! presence tracker), operation broadcast (delegates to the project
//! serializer), or AI relay (opaque rebroadcast).

use std::sync::Arc;

use super::events::{classify, Envelope, EventCategory};
use super::pool::ConnectionHub;
use crate::bus::BusEvent;
use crate::graph::payload::Operation;
use crate::presence::{Cursor, PresenceTracker};
use crate::serializer::{new_operation_id, Batch, ProjectSerializer};
use crate::session::SessionRegistry;

pub struct RouterContext {
    pub hub: Arc<ConnectionHub>,
    pub sessions: Arc<SessionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub serializer: Arc<ProjectSerializer>,
    pub instance_id: String,
}

/// Route one validated inbound event on behalf of the authenticated
/// `(user_id, user_name)`. Returns a reply to send back to `socket_id`
/// alone, if any; broadcasts to other sockets happen as a side effect via
/// the hub/session/presence/serializer components themselves.
pub async fn route(
    ctx: &RouterContext,
    socket_id: &str,
    session_id: Option<&str>,
    user_id: &str,
    user_name: &str,
    envelope: Envelope,
) -> Option<serde_json::Value> {
    if !envelope.is_valid() {
        return Some(error_reply(&envelope.event_type, "malformed event envelope"));
    }

    match classify(&envelope.event_type) {
        EventCategory::Awareness => {
            handle_awareness(ctx, socket_id, session_id, user_id, user_name, envelope).await;
            None
        }
        EventCategory::OperationBroadcast => {
            Some(handle_operation_broadcast(ctx, socket_id, user_id, envelope).await)
        }
        EventCategory::AiRelay => {
            handle_ai_relay(ctx, socket_id, user_id, envelope).await;
            None
        }
        EventCategory::Unknown => {
            Some(error_reply(&envelope.event_type, "unrecognized event type"))
        }
    }
}

fn error_reply(event_type: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "type": "error", "message": message, "eventType": event_type })
}

/// `LAYER_CURSOR_UPDATE`/`SELECTION_CHANGE`/`NODE_DRAG_PREVIEW` plus their
/// close cousins (`CURSOR_MOVE` legacy alias, `LAYER_CURSOR_LEAVE`,
/// `AWARENESS_UPDATE`). Drag previews rebroadcast unchanged except the
/// `userId` is overwritten with the authenticated one.
async fn handle_awareness(
    ctx: &RouterContext,
    socket_id: &str,
    session_id: Option<&str>,
    user_id: &str,
    user_name: &str,
    envelope: Envelope,
) {
    let project_id = envelope.project_id.clone();
    match envelope.event_type.as_str() {
        "LAYER_CURSOR_UPDATE" | "CURSOR_MOVE" => {
            let Some(session_id) = session_id else { return };
            let (timeline_id, layer_id) = match (payload_str(&envelope, "timelineId"), payload_str(&envelope, "layerId")) {
                (Some(t), Some(l)) => (t, l),
                _ => return,
            };
            let x = envelope.payload.get("x").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let y = envelope.payload.get("y").and_then(|v| v.as_f64()).unwrap_or(0.0);
            let cursor = Cursor { x, y, timestamp: envelope.timestamp };
            let _ = ctx.presence.update_cursor(user_id, user_name, &project_id, &timeline_id, &layer_id, cursor, session_id).await;
        }
        "LAYER_CURSOR_LEAVE" => {
            let (timeline_id, layer_id) = match (payload_str(&envelope, "timelineId"), payload_str(&envelope, "layerId")) {
                (Some(t), Some(l)) => (t, l),
                _ => return,
            };
            let _ = ctx.presence.leave_layer(user_id, &project_id, &timeline_id, &layer_id).await;
        }
        "SELECTION_CHANGE" | "AWARENESS_UPDATE" => {
            let Some(session_id) = session_id else { return };
            let _ = ctx.sessions.update_awareness(session_id, envelope.payload.clone()).await;
        }
        "NODE_DRAG_PREVIEW" => {
            let event = BusEvent::new(
                envelope.event_type.clone(),
                envelope.payload.clone(),
                user_id,
                &project_id,
                envelope.timestamp,
                ctx.instance_id.clone(),
            )
            .excluding(Some(socket_id.to_string()));
            let _ = ctx.hub.emit_to_project(&project_id, event).await;
        }
        _ => {}
    }
}

/// `OPERATION_BROADCAST`: the client-supplied `userId` is always replaced
/// with the authenticated one, the payload's operation(s) are submitted to
/// the project serializer, and the outcome is reported back to the
/// submitter as `operation_result`/`operation_error`.
async fn handle_operation_broadcast(ctx: &RouterContext, socket_id: &str, user_id: &str, envelope: Envelope) -> serde_json::Value {
    let operation_id = envelope
        .payload
        .get("operation")
        .and_then(|op| op.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_default();

    let batch = match parse_batch(&envelope, user_id) {
        Ok(batch) => batch,
        Err(message) => {
            return serde_json::json!({ "type": "operation_error", "operationId": operation_id, "error": message })
        }
    };

    match ctx.serializer.process_batch(user_id, &envelope.project_id, batch, Some(socket_id)).await {
        Ok(result) => serde_json::json!({
            "type": "operation_result",
            "operationId": operation_id,
            "success": result.success,
            "syncVersion": result.sync_version,
            "conflicts": result.conflicts,
        }),
        Err(err) => serde_json::json!({ "type": "operation_error", "operationId": operation_id, "error": err.to_string() }),
    }
}

/// `AI_PIPELINE_*`: opaque passthrough, no state change.
async fn handle_ai_relay(ctx: &RouterContext, socket_id: &str, user_id: &str, envelope: Envelope) {
    let event = BusEvent::new(
        envelope.event_type.clone(),
        envelope.payload.clone(),
        user_id,
        &envelope.project_id,
        envelope.timestamp,
        ctx.instance_id.clone(),
    )
    .excluding(Some(socket_id.to_string()));
    let _ = ctx.hub.emit_to_project(&envelope.project_id, event).await;
}

fn payload_str(envelope: &Envelope, key: &str) -> Option<String> {
    envelope.payload.get(key).and_then(|v| v.as_str()).map(str::to_string)
}

fn parse_batch(envelope: &Envelope, user_id: &str) -> Result<Batch, String> {
    let device_id = envelope.payload.get("deviceId").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let last_sync_version = envelope.payload.get("lastSyncVersion").and_then(|v| v.as_i64()).unwrap_or(0);

    let mut operations = Vec::new();
    if let Some(ops) = envelope.payload.get("operations").and_then(|v| v.as_array()) {
        for op in ops {
            operations.push(parse_operation(op, user_id)?);
        }
    } else if let Some(op) = envelope.payload.get("operation") {
        operations.push(parse_operation(op, user_id)?);
    } else {
        return Err("operation payload missing".to_string());
    }

    Ok(Batch { operations, project_id: envelope.project_id.clone(), last_sync_version, device_id })
}

fn parse_operation(value: &serde_json::Value, user_id: &str) -> Result<Operation, String> {
    let op_type = value.get("type").and_then(|v| v.as_str()).ok_or("operation missing type")?.to_string();
    let id = value.get("id").and_then(|v| v.as_str()).map(str::to_string).unwrap_or_else(new_operation_id);
    let timeline_id = value.get("timelineId").and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let layer_id = value.get("layerId").and_then(|v| v.as_str()).unwrap_or_else(|| crate::graph::ROOT_LAYER_ID).to_string();
    let payload = value.get("payload").cloned().unwrap_or_else(|| serde_json::json!({}));
    let timestamp = value.get("timestamp").and_then(|v| v.as_i64()).unwrap_or(0);
    let device_id = value.get("deviceId").and_then(|v| v.as_str()).unwrap_or_default().to_string();

    Ok(Operation { id, op_type, timeline_id, layer_id, payload, timestamp, user_id: Some(user_id.to_string()), device_id })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use crate::store::SnapshotStore;
    use std::time::Duration;

    async fn context() -> RouterContext {
        let pool = sqlx::sqlite::SqlitePool::connect("sqlite::memory:").await.unwrap();
        for stmt in include_str!("../../../migrations/0001_collab_core.sql").split(';') {
            let stmt = stmt.trim();
            if !stmt.is_empty() {
                sqlx::query(stmt).execute(&pool).await.unwrap();
            }
        }
        sqlx::query("INSERT INTO project (id, data, creator_id, team_id, updated_at) VALUES ('p1', '{}', 'u1', NULL, '2026-01-01')")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("INSERT INTO project_version (project_id, version, last_sync) VALUES ('p1', 0, '2026-01-01')")
            .execute(&pool)
            .await
            .unwrap();

        let bus: Arc<dyn crate::bus::CoordinationBus> = Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)));
        let store = Arc::new(SnapshotStore::new(pool));
        RouterContext {
            hub: Arc::new(ConnectionHub::new(bus.clone())),
            sessions: Arc::new(SessionRegistry::new(bus.clone(), bus.clone(), Duration::from_secs(300))),
            presence: Arc::new(PresenceTracker::new(bus.clone())),
            serializer: Arc::new(ProjectSerializer::new(store, bus.clone(), bus.clone(), 5)),
            instance_id: "inst-a".to_string(),
        }
    }

    #[tokio::test]
    async fn test_invalid_envelope_replies_with_error() {
        let ctx = context().await;
        let envelope = Envelope { event_type: "SELECTION_CHANGE".into(), payload: serde_json::json!({}), user_id: String::new(), project_id: "p1".into(), timestamp: 1000 };
        let reply = route(&ctx, "sock1", None, "u1", "Alice", envelope).await.unwrap();
        assert_eq!(reply["type"], "error");
    }

    #[tokio::test]
    async fn test_unknown_event_type_replies_with_error() {
        let ctx = context().await;
        let envelope = Envelope { event_type: "bogus".into(), payload: serde_json::json!({}), user_id: "u1".into(), project_id: "p1".into(), timestamp: 1000 };
        let reply = route(&ctx, "sock1", None, "u1", "Alice", envelope).await.unwrap();
        assert_eq!(reply["type"], "error");
    }

    #[tokio::test]
    async fn test_operation_broadcast_commits_and_replies_with_result() {
        let ctx = context().await;
        let envelope = Envelope {
            event_type: "OPERATION_BROADCAST".into(),
            payload: serde_json::json!({
                "operation": {
                    "id": "op-1",
                    "type": "node.created",
                    "timelineId": "t1",
                    "layerId": "root",
                    "payload": {"id": "n1", "type": "narrative", "coordinates": {"x": 0.0, "y": 0.0}, "data": {}},
                    "timestamp": 1000,
                },
            }),
            user_id: "u1".into(),
            project_id: "p1".into(),
            timestamp: 1000,
        };
        let reply = route(&ctx, "sock1", None, "u1", "Alice", envelope).await.unwrap();
        assert_eq!(reply["type"], "operation_result");
        assert_eq!(reply["success"], true);
        assert_eq!(reply["syncVersion"], 1);
    }

    #[tokio::test]
    async fn test_ai_relay_rebroadcasts_to_other_sockets() {
        let ctx = context().await;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ctx.hub.register("sock2", tx);
        ctx.hub.join_room("p1", "sock1").await.unwrap();
        ctx.hub.join_room("p1", "sock2").await.unwrap();

        let envelope = Envelope { event_type: "AI_PIPELINE_PROGRESS".into(), payload: serde_json::json!({"step": 1}), user_id: "u1".into(), project_id: "p1".into(), timestamp: 1000 };
        assert!(route(&ctx, "sock1", None, "u1", "Alice", envelope).await.is_none());
        assert!(rx.try_recv().is_ok());
    }
}
