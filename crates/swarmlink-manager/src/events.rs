//! Process-local manager events.

/// Events observable by in-process components (logging, dashboards).
///
/// Delivered over an explicit broadcast subscription, never through
/// ambient global dispatch; drop the receiver to stop observing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A new agent registered
    AgentRegistered {
        /// The agent's ID
        agent_id: String,
    },
    /// An agent unregistered
    AgentUnregistered {
        /// The agent's ID
        agent_id: String,
    },
}
