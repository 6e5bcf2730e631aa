//! Connection Hub: tracks live sockets, their room membership
//! (`project:<projectId>`), and the fan-out API (`emitToSocket`,
//! `emitToProject`) the rest of the collaboration core calls into.

use axum::extract::ws::Message;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::bus::{BusEvent, CoordinationBus, EventHandler};
use crate::Result;

fn event_to_json(event: &BusEvent) -> String {
    serde_json::to_string(&serde_json::json!({
        "type": event.event_type,
        "payload": event.payload,
        "userId": event.user_id,
        "projectId": event.project_id,
        "timestamp": event.timestamp,
    }))
    .unwrap_or_default()
}

pub struct ConnectionHub {
    bus: Arc<dyn CoordinationBus>,
    sockets: Arc<DashMap<String, mpsc::UnboundedSender<Message>>>,
    rooms: Arc<DashMap<String, HashSet<String>>>,
    subscribed_projects: Arc<DashMap<String, ()>>,
}

impl ConnectionHub {
    pub fn new(bus: Arc<dyn CoordinationBus>) -> Self {
        Self {
            bus,
            sockets: Arc::new(DashMap::new()),
            rooms: Arc::new(DashMap::new()),
            subscribed_projects: Arc::new(DashMap::new()),
        }
    }

    pub fn register(&self, socket_id: &str, sender: mpsc::UnboundedSender<Message>) {
        self.sockets.insert(socket_id.to_string(), sender);
    }

    /// Drop a socket from every room it was in and stop tracking it.
    pub fn unregister(&self, socket_id: &str) {
        self.sockets.remove(socket_id);
        for mut room in self.rooms.iter_mut() {
            room.remove(socket_id);
        }
    }

    /// Add `socket_id` to `project:<projectId>`'s room. The first socket to
    /// join a project subscribes this instance to that project's bus
    /// channel, so cross-instance broadcasts reach locally-held sockets too.
    pub async fn join_room(&self, project_id: &str, socket_id: &str) -> Result<()> {
        self.rooms.entry(project_id.to_string()).or_default().insert(socket_id.to_string());

        if self.subscribed_projects.insert(project_id.to_string(), ()).is_some() {
            return Ok(());
        }

        let sockets = self.sockets.clone();
        let rooms = self.rooms.clone();
        let instance_id = self.bus.instance_id().to_string();
        let handler: EventHandler = Arc::new(move |event: BusEvent| {
            if event.source_instance_id == instance_id {
                return;
            }
            let Some(room) = rooms.get(&event.project_id) else { return };
            let text = event_to_json(&event);
            for member in room.iter() {
                if Some(member.as_str()) == event.exclude_socket_id.as_deref() {
                    continue;
                }
                if let Some(sender) = sockets.get(member) {
                    let _ = sender.send(Message::Text(text.clone()));
                }
            }
        });
        self.bus.subscribe_to_project(project_id, handler).await
    }

    pub fn leave_room(&self, project_id: &str, socket_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(project_id) {
            room.remove(socket_id);
        }
    }

    pub fn room_size(&self, project_id: &str) -> usize {
        self.rooms.get(project_id).map(|room| room.len()).unwrap_or(0)
    }

    /// Send a value to exactly one socket. Returns `false` if the socket is
    /// unknown or its channel is closed.
    pub fn emit_to_socket(&self, socket_id: &str, value: &serde_json::Value) -> bool {
        let Some(sender) = self.sockets.get(socket_id) else { return false };
        let Ok(text) = serde_json::to_string(value) else { return false };
        sender.send(Message::Text(text)).is_ok()
    }

    /// Publish `event` through the coordination bus (marked with this instance's id so other
    /// instances' hubs can dedupe) and deliver it locally to every room
    /// member except `event.exclude_socket_id`.
    pub async fn emit_to_project(&self, project_id: &str, event: BusEvent) -> Result<()> {
        let text = event_to_json(&event);
        let exclude = event.exclude_socket_id.clone();
        self.bus.publish_to_project(project_id, event).await?;

        if let Some(room) = self.rooms.get(project_id) {
            for member in room.iter() {
                if Some(member.as_str()) == exclude.as_deref() {
                    continue;
                }
                if let Some(sender) = self.sockets.get(member) {
                    let _ = sender.send(Message::Text(text.clone()));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;
    use std::time::Duration;

    fn bus() -> Arc<dyn CoordinationBus> {
        Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)))
    }

    #[tokio::test]
    async fn test_emit_to_socket_delivers_to_registered_sender() {
        let hub = ConnectionHub::new(bus());
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.register("sock1", tx);
        assert!(hub.emit_to_socket("sock1", &serde_json::json!({"hello": "world"})));
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, Message::Text(text) if text.contains("world")));
    }

    #[tokio::test]
    async fn test_emit_to_socket_unknown_returns_false() {
        let hub = ConnectionHub::new(bus());
        assert!(!hub.emit_to_socket("ghost", &serde_json::json!({})));
    }

    #[tokio::test]
    async fn test_join_room_then_emit_to_project_excludes_sender() {
        let hub = ConnectionHub::new(bus());
        let (tx1, mut rx1) = mpsc::unbounded_channel();
        let (tx2, mut rx2) = mpsc::unbounded_channel();
        hub.register("sock1", tx1);
        hub.register("sock2", tx2);
        hub.join_room("p1", "sock1").await.unwrap();
        hub.join_room("p1", "sock2").await.unwrap();

        let event = BusEvent::new("SELECTION_CHANGE", serde_json::json!({}), "u1", "p1", 1000, "inst-a")
            .excluding(Some("sock1".to_string()));
        hub.emit_to_project("p1", event).await.unwrap();

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unregister_removes_from_rooms() {
        let hub = ConnectionHub::new(bus());
        let (tx, _rx) = mpsc::unbounded_channel();
        hub.register("sock1", tx);
        hub.join_room("p1", "sock1").await.unwrap();
        assert_eq!(hub.room_size("p1"), 1);
        hub.unregister("sock1");
        assert_eq!(hub.room_size("p1"), 0);
    }
}
