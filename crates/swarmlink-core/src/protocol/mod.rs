//! Wire-level protocol types.

mod envelope;
mod message;
mod task;

pub use envelope::Envelope;
pub use message::{
    AgentEvent, AgentMessage, BroadcastKind, BroadcastMessage, EventKind, MessageKind,
};
pub use task::{HandoffPayload, HandoffStatus, Task, TaskHandoff, TaskPriority, TaskStatus};
