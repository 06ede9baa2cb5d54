//! The Event Log's unit of record: one append-only line in a task's
//! JSON-lines journal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kinds the daemon and pipeline stages append. Not exhaustive —
/// stages may append other tagged kinds via `TaskEvent`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    AgentSessionStart,
    AgentSessionEnd,
    SubtaskUpdated,
    PhaseCompleted,
    QaPassed,
    QaFailed,
    TaskEvent,
}

/// One line of a task's event log. `sequence` strictly increases and has
/// no gaps within a single task; readers may resume from a checkpoint by
/// sequence number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub sequence: u64,
    pub timestamp: String,
    pub kind: EventKind,
    #[serde(default = "default_payload")]
    pub payload: Value,
}

fn default_payload() -> Value {
    Value::Object(Default::default())
}

impl Event {
    pub fn new(sequence: u64, kind: EventKind, payload: Value) -> Self {
        Self {
            sequence,
            timestamp: chrono::Utc::now().to_rfc3339(),
            kind,
            payload,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serializes_kind_as_screaming_snake_case() {
        let event = Event::new(1, EventKind::AgentSessionStart, serde_json::json!({}));
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"AGENT_SESSION_START\""));
    }

    #[test]
    fn payload_defaults_to_empty_object_when_absent() {
        let event: Event =
            serde_json::from_str(r#"{"sequence":1,"timestamp":"2026-01-01T00:00:00Z","kind":"TASK_EVENT"}"#).unwrap();
        assert_eq!(event.payload, serde_json::json!({}));
    }
}
