//! The bus-level event envelope, distinct from the socket wire
//! envelope only in that it carries `sourceInstanceId` for loop prevention.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub user_id: String,
    pub project_id: String,
    pub timestamp: i64,
    /// Instance that originated this event. A subscriber whose own
    /// `instance_id()` matches this ignores the event — the local delivery
    /// path already handled it.
    pub source_instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_socket_id: Option<String>,
}

impl BusEvent {
    pub fn new(
        event_type: impl Into<String>,
        payload: serde_json::Value,
        user_id: impl Into<String>,
        project_id: impl Into<String>,
        timestamp: i64,
        source_instance_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            user_id: user_id.into(),
            project_id: project_id.into(),
            timestamp,
            source_instance_id: source_instance_id.into(),
            exclude_socket_id: None,
        }
    }

    pub fn excluding(mut self, socket_id: Option<String>) -> Self {
        self.exclude_socket_id = socket_id;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_roundtrips_through_json() {
        let event = BusEvent::new("USER_JOIN", serde_json::json!({}), "u1", "p1", 1000, "inst-a");
        let json = serde_json::to_string(&event).unwrap();
        let back: BusEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
