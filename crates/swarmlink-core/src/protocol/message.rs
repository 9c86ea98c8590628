//! Message types for agent-to-agent communication.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of a unicast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Agent-originated message
    Direct,
    /// Broker-originated notification (handoff requests/responses)
    System,
}

/// A unicast message between two agents.
///
/// Immutable once created; `id` and `timestamp` are assigned by the broker
/// at send time, never by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Unique message ID
    pub id: String,
    /// Sender agent ID
    pub from: String,
    /// Recipient agent ID
    pub to: String,
    /// Message body
    pub content: serde_json::Value,
    /// Message kind
    pub kind: MessageKind,
    /// Broker-assigned creation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    /// Create a message with a fresh id and timestamp.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        content: serde_json::Value,
        kind: MessageKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            content,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Kind of a broadcast message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastKind {
    /// General announcement
    Announcement,
    /// Urgent, requires attention
    Alert,
    /// Informational only
    Info,
}

/// A message multicast to all current subscribers of a channel.
///
/// Fire-and-forget: subscribers that connect later do not receive past
/// broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastMessage {
    /// Unique message ID
    pub id: String,
    /// Sender agent ID
    pub from: String,
    /// Target channel name
    pub channel: String,
    /// Message body
    pub content: serde_json::Value,
    /// Broadcast kind
    pub kind: BroadcastKind,
    /// Broker-assigned creation timestamp
    pub timestamp: DateTime<Utc>,
}

impl BroadcastMessage {
    /// Create a broadcast with a fresh id and timestamp.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        channel: impl Into<String>,
        content: serde_json::Value,
        kind: BroadcastKind,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            channel: channel.into(),
            content,
            kind,
            timestamp: Utc::now(),
        }
    }
}

/// Kind of a lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Agent status changed
    StatusChange,
    /// Agent picked up a task
    TaskStarted,
    /// Agent finished a task
    TaskCompleted,
    /// Agent hit an error
    Error,
    /// Application-defined
    Custom,
}

/// A fire-and-forget lifecycle notification, never acknowledged.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event ID
    pub id: String,
    /// Agent the event is about
    pub agent_id: String,
    /// Event kind
    pub kind: EventKind,
    /// Event payload
    pub data: serde_json::Value,
    /// Component that emitted the event
    pub source: String,
    /// Broker-assigned creation timestamp
    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    /// Create an event with a fresh id and timestamp.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        kind: EventKind,
        data: serde_json::Value,
        source: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id: agent_id.into(),
            kind,
            data,
            source: source.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_gets_id_and_timestamp() {
        let msg = AgentMessage::new(
            "agent-1",
            "agent-2",
            serde_json::json!("hi"),
            MessageKind::Direct,
        );
        assert!(!msg.id.is_empty());
        assert_eq!(msg.from, "agent-1");
        assert_eq!(msg.to, "agent-2");
    }

    #[test]
    fn test_message_ids_are_unique() {
        let a = AgentMessage::new("a", "b", serde_json::json!(null), MessageKind::Direct);
        let b = AgentMessage::new("a", "b", serde_json::json!(null), MessageKind::Direct);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let kind = serde_json::to_string(&MessageKind::System).unwrap();
        assert_eq!(kind, "\"system\"");
        let kind = serde_json::to_string(&EventKind::StatusChange).unwrap();
        assert_eq!(kind, "\"status_change\"");
    }
}
