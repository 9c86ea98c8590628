//! Standard channel and key naming.

/// Pub/sub channel names.
pub struct ChannelPatterns;

impl ChannelPatterns {
    /// Private channel for an agent (direct messages and handoff
    /// notifications).
    #[must_use]
    pub fn agent_messages(agent_id: &str) -> String {
        format!("agents:{agent_id}:messages")
    }

    /// A named broadcast channel.
    #[must_use]
    pub fn broadcast(channel: &str) -> String {
        format!("broadcast:{channel}")
    }

    /// System-wide lifecycle events.
    #[must_use]
    pub fn events() -> &'static str {
        "agents:events"
    }
}

/// Key/value store key names.
pub struct KeyPatterns;

impl KeyPatterns {
    /// Bounded message history for an agent, newest first.
    #[must_use]
    pub fn message_history(agent_id: &str) -> String {
        format!("history:messages:{agent_id}")
    }

    /// Bounded handoff history for an agent, newest first.
    #[must_use]
    pub fn handoff_history(agent_id: &str) -> String {
        format!("history:handoffs:{agent_id}")
    }

    /// A handoff record.
    #[must_use]
    pub fn handoff(handoff_id: &str) -> String {
        format!("handoff:{handoff_id}")
    }

    /// Marker for the (single) pending handoff of a task.
    #[must_use]
    pub fn pending_handoff(task_id: &str) -> String {
        format!("handoff:task:{task_id}")
    }

    /// Lock guarding handoff initiation for a task.
    #[must_use]
    pub fn handoff_lock(task_id: &str) -> String {
        format!("lock:handoff:task:{task_id}")
    }

    /// A persisted task record.
    #[must_use]
    pub fn task(task_id: &str) -> String {
        format!("task:{task_id}")
    }

    /// Rate-limit counter for an agent, operation and window bucket.
    #[must_use]
    pub fn rate_limit(agent_id: &str, operation: &str, window: u64) -> String {
        format!("ratelimit:{agent_id}:{operation}:{window}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_patterns() {
        assert_eq!(
            ChannelPatterns::agent_messages("agent-1"),
            "agents:agent-1:messages"
        );
        assert_eq!(ChannelPatterns::broadcast("ops"), "broadcast:ops");
        assert_eq!(ChannelPatterns::events(), "agents:events");
    }

    #[test]
    fn test_key_patterns() {
        assert_eq!(KeyPatterns::pending_handoff("t-1"), "handoff:task:t-1");
        assert_eq!(KeyPatterns::handoff_lock("t-1"), "lock:handoff:task:t-1");
        assert_eq!(
            KeyPatterns::rate_limit("agent-1", "send_message", 42),
            "ratelimit:agent-1:send_message:42"
        );
    }
}
