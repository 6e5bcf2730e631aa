//! Connection Hub entry point: the `axum` WebSocket upgrade
//! handler. Authenticates the handshake, then loops reading client frames —
//! `join_project`/`leave_project`/any other event name — until the socket
//! closes, cleaning up sessions and room membership on the way out.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

use super::events::Envelope;
use super::router::{self, RouterContext};
use crate::api::routes::AppState;
use crate::services::auth::extract_bearer_token;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default)]
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JoinProjectPayload {
    #[serde(rename = "projectId")]
    project_id: String,
}

#[derive(Debug, Deserialize)]
struct LeaveProjectPayload {
    #[serde(rename = "projectId")]
    project_id: String,
}

/// `GET /ws`. Auth token may arrive as `?token=` or `Authorization:
/// Bearer` header; either satisfies the handshake.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: axum::http::HeaderMap,
) -> impl IntoResponse {
    let auth_header = headers.get(axum::http::header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let token = match extract_bearer_token(query.token.as_deref(), auth_header) {
        Ok(token) => token,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    let user = match state.jwt_verifier.verify(&token) {
        Ok(user) => user,
        Err(_) => return axum::http::StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: crate::services::auth::AuthenticatedUser) {
    let socket_id = uuid::Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    state.hub.register(&socket_id, tx);
    state.metrics.record_connection();
    state.timeouts.register_client(socket_id.clone());
    state.backpressure.get_client(&socket_id);

    let metrics = state.metrics.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Message::Text(ref text) = message {
                metrics.record_message_sent(text.len() as u64);
            }
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let ctx = RouterContext {
        hub: state.hub.clone(),
        sessions: state.sessions.clone(),
        presence: state.presence.clone(),
        serializer: state.serializer.clone(),
        instance_id: state.instance_id.clone(),
    };

    let mut current_project: Option<String> = None;
    let mut session_id: Option<String> = None;
    let idle_timeout = Duration::from_secs(state.timeouts.config().idle_timeout_secs);

    loop {
        let message = match tokio::time::timeout(idle_timeout, receiver.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(_))) | Ok(None) => break,
            Err(_) => {
                tracing::debug!(socket_id = %socket_id, "closing idle websocket connection");
                break;
            }
        };

        let Message::Text(text) = message else {
            if matches!(message, Message::Close(_)) {
                break;
            }
            continue;
        };

        state.metrics.record_message_received(text.len() as u64);
        state.timeouts.record_activity(&socket_id);

        if !state.rate_limiter.allow_message(&socket_id) {
            state.rate_limiter.record_violation(&socket_id);
            state.metrics.record_error();
            state.hub.emit_to_socket(&socket_id, &serde_json::json!({ "type": "rate_limit_exceeded" }));
            continue;
        }

        let raw: serde_json::Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(_) => continue,
        };

        match raw.get("type").and_then(|v| v.as_str()) {
            Some("join_project") => {
                let Ok(payload) = serde_json::from_value::<JoinProjectPayload>(raw.clone()) else { continue };
                handle_join(&state, &ctx, &socket_id, &user, &payload.project_id, &mut current_project, &mut session_id).await;
            }
            Some("leave_project") => {
                let Ok(payload) = serde_json::from_value::<LeaveProjectPayload>(raw.clone()) else { continue };
                handle_leave(&state, &ctx, &socket_id, &payload.project_id, &mut current_project, &mut session_id).await;
            }
            _ => {
                let mut envelope = match serde_json::from_value::<Envelope>(raw) {
                    Ok(e) => e,
                    Err(_) => continue,
                };
                envelope.user_id = user.user_id.clone();
                if let Some(reply) = router::route(&ctx, &socket_id, session_id.as_deref(), &user.user_id, &user.user_name, envelope).await {
                    state.hub.emit_to_socket(&socket_id, &reply);
                }
            }
        }
    }

    if let (Some(project_id), Some(session_id)) = (current_project, session_id) {
        let _ = ctx.sessions.end_session(&session_id).await;
        ctx.hub.leave_room(&project_id, &socket_id);
    }
    state.hub.unregister(&socket_id);
    state.metrics.record_disconnection();
    state.timeouts.unregister_client(&socket_id);
    state.backpressure.remove_client(&socket_id);
    state.rate_limiter.clear_client(&socket_id);
    forward_task.abort();
}

async fn handle_join(
    state: &AppState,
    ctx: &RouterContext,
    socket_id: &str,
    user: &crate::services::auth::AuthenticatedUser,
    project_id: &str,
    current_project: &mut Option<String>,
    session_id: &mut Option<String>,
) {
    match crate::access::resolve_access(state.db.pool(), project_id, &user.user_id).await {
        Ok(_) => {}
        Err(_) => {
            state.hub.emit_to_socket(
                socket_id,
                &serde_json::json!({ "type": "join_project_error", "error": "access_denied", "projectId": project_id }),
            );
            return;
        }
    }

    let session = match ctx.sessions.create_session(&user.user_id, &user.user_name, project_id, socket_id).await {
        Ok(session) => session,
        Err(err) => {
            state.hub.emit_to_socket(
                socket_id,
                &serde_json::json!({ "type": "join_project_error", "error": err.to_string(), "projectId": project_id }),
            );
            return;
        }
    };

    let _ = ctx.hub.join_room(project_id, socket_id).await;
    *current_project = Some(project_id.to_string());
    *session_id = Some(session.id.clone());

    let users: Vec<_> = ctx
        .sessions
        .get_project_sessions(project_id)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|s| s.awareness)
        .collect();
    state.hub.emit_to_socket(socket_id, &serde_json::json!({ "type": "project_users", "users": users }));

    state.hub.emit_to_socket(
        socket_id,
        &serde_json::json!({
            "type": "join_project_success",
            "projectId": project_id,
            "userId": user.user_id,
            "timestamp": chrono::Utc::now().timestamp_millis(),
            "success": true,
            "roomClients": ctx.hub.room_size(project_id),
        }),
    );
}

async fn handle_leave(
    state: &AppState,
    ctx: &RouterContext,
    socket_id: &str,
    project_id: &str,
    current_project: &mut Option<String>,
    session_id: &mut Option<String>,
) {
    if let Some(sid) = session_id.take() {
        let _ = ctx.sessions.end_session(&sid).await;
    }
    ctx.hub.leave_room(project_id, socket_id);
    *current_project = None;
    let _ = state;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_project_payload_parses_project_id() {
        let value = serde_json::json!({ "type": "join_project", "projectId": "p1", "teamId": "t1" });
        let payload: JoinProjectPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.project_id, "p1");
    }
}
