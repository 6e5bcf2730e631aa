//! Wire-level event envelope and the Event Router classification
//! table: a static mapping from an inbound event's `type` to the
//! handler family responsible for it.

use serde::{Deserialize, Serialize};

/// Inbound/outbound event envelope. Every socket message, in either
/// direction, takes this shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(rename = "projectId", default)]
    pub project_id: String,
    #[serde(default)]
    pub timestamp: i64,
}

impl Envelope {
    /// `{type, userId, projectId, timestamp, payload}` all present. `payload`
    /// may legitimately be `null` for some awareness events, so it is not
    /// required to be non-null.
    pub fn is_valid(&self) -> bool {
        !self.event_type.is_empty() && !self.user_id.is_empty() && !self.project_id.is_empty() && self.timestamp != 0
    }
}

/// Which handler family owns an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    Awareness,
    OperationBroadcast,
    AiRelay,
    Unknown,
}

const AWARENESS_TYPES: &[&str] = &[
    "CURSOR_MOVE",
    "LAYER_CURSOR_UPDATE",
    "LAYER_CURSOR_ENTER",
    "LAYER_CURSOR_LEAVE",
    "SELECTION_CHANGE",
    "AWARENESS_UPDATE",
    "NODE_DRAG_PREVIEW",
];

const AI_RELAY_TYPES: &[&str] = &[
    "AI_PIPELINE_STARTED",
    "AI_PIPELINE_PROGRESS",
    "AI_PIPELINE_STEP_COMPLETED",
    "AI_PIPELINE_COMPLETED",
    "AI_PIPELINE_ERROR",
];

/// Classify `event_type` per the static eventType -> handler table.
pub fn classify(event_type: &str) -> EventCategory {
    if event_type == "OPERATION_BROADCAST" {
        EventCategory::OperationBroadcast
    } else if AWARENESS_TYPES.contains(&event_type) {
        EventCategory::Awareness
    } else if AI_RELAY_TYPES.contains(&event_type) {
        EventCategory::AiRelay
    } else {
        EventCategory::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_awareness() {
        assert_eq!(classify("LAYER_CURSOR_UPDATE"), EventCategory::Awareness);
        assert_eq!(classify("NODE_DRAG_PREVIEW"), EventCategory::Awareness);
    }

    #[test]
    fn test_classify_operation_broadcast() {
        assert_eq!(classify("OPERATION_BROADCAST"), EventCategory::OperationBroadcast);
    }

    #[test]
    fn test_classify_ai_relay() {
        assert_eq!(classify("AI_PIPELINE_PROGRESS"), EventCategory::AiRelay);
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(classify("bogus"), EventCategory::Unknown);
    }

    #[test]
    fn test_envelope_validity() {
        let valid = Envelope {
            event_type: "SELECTION_CHANGE".into(),
            payload: serde_json::json!({}),
            user_id: "u1".into(),
            project_id: "p1".into(),
            timestamp: 1000,
        };
        assert!(valid.is_valid());

        let missing_project = Envelope { project_id: String::new(), ..valid.clone() };
        assert!(!missing_project.is_valid());
    }
}
