//! Presence Tracker: per-layer cursor/selection state with TTL
//! eviction and stable per-user color assignment.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::bus::{BusEvent, CoordinationBus};
use crate::Result;

/// Fixed 15-entry palette. Colors are plain hex strings so they can
/// be dropped straight into client CSS.
pub const PALETTE: [&str; 15] = [
    "#e6194b", "#3cb44b", "#ffe119", "#4363d8", "#f58231", "#911eb4", "#46f0f0", "#f032e6",
    "#bcf60c", "#fabebe", "#008080", "#e6beff", "#9a6324", "#800000", "#808000",
];

pub const PRESENCE_TTL: Duration = Duration::from_secs(30);

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_millis() as i64
}

/// Stable color for a user: `PALETTE[abs(hash(userId)) % len(PALETTE)]`.
pub fn stable_color(user_id: &str) -> &'static str {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    user_id.hash(&mut hasher);
    let idx = (hasher.finish() as usize) % PALETTE.len();
    PALETTE[idx]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cursor {
    pub x: f64,
    pub y: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LayerPresence {
    pub user_id: String,
    pub user_name: String,
    pub user_color: String,
    pub cursor: Cursor,
    pub last_seen: i64,
    pub session_id: String,
}

fn layer_key(project_id: &str, timeline_id: &str, layer_id: &str) -> String {
    format!("{project_id}:{timeline_id}:{layer_id}")
}

pub struct PresenceTracker {
    layers: DashMap<String, DashMap<String, LayerPresence>>,
    bus: Arc<dyn CoordinationBus>,
    ttl: Duration,
}

impl PresenceTracker {
    pub fn new(bus: Arc<dyn CoordinationBus>) -> Self {
        Self { layers: DashMap::new(), bus, ttl: PRESENCE_TTL }
    }

    pub fn with_ttl(bus: Arc<dyn CoordinationBus>, ttl: Duration) -> Self {
        Self { layers: DashMap::new(), bus, ttl }
    }

    /// Update (or create) cursor presence for `userId` in a layer. Publishes
    /// `LAYER_CURSOR_ENTER` on first appearance, `LAYER_CURSOR_UPDATE`
    /// otherwise.
    pub async fn update_cursor(
        &self,
        user_id: &str,
        user_name: &str,
        project_id: &str,
        timeline_id: &str,
        layer_id: &str,
        cursor: Cursor,
        session_id: &str,
    ) -> Result<()> {
        let key = layer_key(project_id, timeline_id, layer_id);
        let bucket = self.layers.entry(key).or_default();
        let is_new = !bucket.contains_key(user_id);

        let presence = LayerPresence {
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            user_color: stable_color(user_id).to_string(),
            cursor,
            last_seen: now_ms(),
            session_id: session_id.to_string(),
        };
        bucket.insert(user_id.to_string(), presence.clone());
        drop(bucket);

        let event_type = if is_new { "LAYER_CURSOR_ENTER" } else { "LAYER_CURSOR_UPDATE" };
        self.bus
            .publish_to_project(
                project_id,
                BusEvent::new(
                    event_type,
                    serde_json::to_value(&presence).unwrap_or_default(),
                    user_id,
                    project_id,
                    presence.last_seen,
                    self.bus.instance_id(),
                ),
            )
            .await?;
        Ok(())
    }

    /// Remove a user's presence in a layer, publishing `LAYER_CURSOR_LEAVE`.
    pub async fn leave_layer(
        &self,
        user_id: &str,
        project_id: &str,
        timeline_id: &str,
        layer_id: &str,
    ) -> Result<()> {
        let key = layer_key(project_id, timeline_id, layer_id);
        let removed = self.layers.get(&key).and_then(|bucket| bucket.remove(user_id));
        if removed.is_some() {
            self.bus
                .publish_to_project(
                    project_id,
                    BusEvent::new(
                        "LAYER_CURSOR_LEAVE",
                        serde_json::json!({ "userId": user_id }),
                        user_id,
                        project_id,
                        now_ms(),
                        self.bus.instance_id(),
                    ),
                )
                .await?;
        }
        Ok(())
    }

    /// Live presence entries in a layer, excluding anything stale
    ///.
    pub fn get_layer_presence(&self, project_id: &str, timeline_id: &str, layer_id: &str) -> Vec<LayerPresence> {
        let key = layer_key(project_id, timeline_id, layer_id);
        let now = now_ms();
        let ttl_ms = self.ttl.as_millis() as i64;
        self.layers
            .get(&key)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter(|e| now - e.last_seen < ttl_ms)
                    .map(|e| e.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Evict entries older than the TTL and drop empty layer buckets.
    /// Intended to run on a 10s interval.
    pub fn cleanup(&self) {
        let now = now_ms();
        let ttl_ms = self.ttl.as_millis() as i64;
        self.layers.retain(|_, bucket| {
            bucket.retain(|_, presence| now - presence.last_seen < ttl_ms);
            !bucket.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::InProcessBus;

    fn bus() -> Arc<dyn CoordinationBus> {
        Arc::new(InProcessBus::new("inst-a", Duration::from_secs(45)))
    }

    #[test]
    fn test_stable_color_is_deterministic() {
        assert_eq!(stable_color("u1"), stable_color("u1"));
    }

    #[test]
    fn test_stable_color_within_palette() {
        assert!(PALETTE.contains(&stable_color("arbitrary-user")));
    }

    #[tokio::test]
    async fn test_update_cursor_then_get_presence() {
        let tracker = PresenceTracker::new(bus());
        tracker
            .update_cursor("u1", "Alice", "p1", "t1", "root", Cursor { x: 1.0, y: 2.0, timestamp: 1000 }, "s1")
            .await
            .unwrap();
        let presence = tracker.get_layer_presence("p1", "t1", "root");
        assert_eq!(presence.len(), 1);
        assert_eq!(presence[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_leave_layer_removes_presence() {
        let tracker = PresenceTracker::new(bus());
        tracker
            .update_cursor("u1", "Alice", "p1", "t1", "root", Cursor { x: 1.0, y: 2.0, timestamp: 1000 }, "s1")
            .await
            .unwrap();
        tracker.leave_layer("u1", "p1", "t1", "root").await.unwrap();
        assert!(tracker.get_layer_presence("p1", "t1", "root").is_empty());
    }

    #[test]
    fn test_cleanup_drops_empty_buckets() {
        let tracker = PresenceTracker::new(bus());
        tracker.layers.insert("p1:t1:root".to_string(), DashMap::new());
        tracker.cleanup();
        assert!(tracker.layers.is_empty());
    }
}
