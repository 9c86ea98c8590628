//! Task and task-handoff types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Task priority levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low = 0,
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl Default for TaskPriority {
    fn default() -> Self {
        Self::Normal
    }
}

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

/// A unit of work owned by exactly one agent at a time.
///
/// Ownership transfers only through an accepted handoff; `created_by` never
/// changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: String,
    /// Short title
    pub title: String,
    /// Full description
    pub description: String,
    /// Priority level
    pub priority: TaskPriority,
    /// Lifecycle status
    pub status: TaskStatus,
    /// Agent that created the task
    pub created_by: String,
    /// Agent currently holding the task
    pub owner: String,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a task with a fresh id, owned by its creator.
    #[must_use]
    pub fn new(
        title: impl Into<String>,
        description: impl Into<String>,
        priority: TaskPriority,
        created_by: impl Into<String>,
    ) -> Self {
        let created_by = created_by.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: description.into(),
            priority,
            status: TaskStatus::Pending,
            owner: created_by.clone(),
            created_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status of a proposed task handoff.
///
/// Monotonic: `pending` may move to any of the other three states; none of
/// them may change afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffStatus {
    Pending,
    Accepted,
    Rejected,
    Expired,
}

impl HandoffStatus {
    /// A resolved handoff never transitions again.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for HandoffStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// Everything the receiving agent needs to pick up the task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoffPayload {
    /// The task being transferred
    pub task: Task,
    /// Working context accumulated by the current owner
    pub context: serde_json::Value,
    /// Files touched so far
    #[serde(default)]
    pub files: Vec<String>,
    /// Task ids this task depends on
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl HandoffPayload {
    /// Payload with just the task and context.
    #[must_use]
    pub fn new(task: Task, context: serde_json::Value) -> Self {
        Self {
            task,
            context,
            files: vec![],
            dependencies: vec![],
        }
    }

    /// Attach touched files.
    #[must_use]
    pub fn with_files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }

    /// Attach dependencies.
    #[must_use]
    pub fn with_dependencies(mut self, deps: Vec<String>) -> Self {
        self.dependencies = deps;
        self
    }
}

/// A proposed transfer of a task's ownership from one agent to another.
///
/// Immutable after creation except for `status`. At most one handoff may be
/// pending for a given task at a time; the broker enforces this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskHandoff {
    /// Unique handoff ID
    pub id: String,
    /// Current owner proposing the transfer
    pub from: String,
    /// Proposed new owner
    pub to: String,
    /// Task snapshot plus working context
    pub payload: HandoffPayload,
    /// Why the transfer is proposed
    pub reason: String,
    /// Current status
    pub status: HandoffStatus,
    /// Creation timestamp
    pub timestamp: DateTime<Utc>,
    /// Instant after which the handoff counts as expired
    pub expires_at: DateTime<Utc>,
}

impl TaskHandoff {
    /// Create a pending handoff expiring after `timeout`.
    #[must_use]
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        payload: HandoffPayload,
        reason: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            payload,
            reason: reason.into(),
            status: HandoffStatus::Pending,
            timestamp: now,
            expires_at: now
                + chrono::Duration::from_std(timeout).unwrap_or(chrono::Duration::zero()),
        }
    }

    /// Whether the expiry deadline has elapsed, regardless of the stored
    /// status field.
    #[must_use]
    pub fn is_past_deadline(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_task_owner_starts_as_creator() {
        let task = Task::new("t", "d", TaskPriority::Normal, "agent-1");
        assert_eq!(task.owner, "agent-1");
        assert_eq!(task.created_by, "agent-1");
        assert!(!task.id.is_empty());
    }

    #[test]
    fn test_handoff_starts_pending() {
        let task = Task::new("t", "d", TaskPriority::High, "agent-1");
        let handoff = TaskHandoff::new(
            "agent-1",
            "agent-2",
            HandoffPayload::new(task, serde_json::json!({})),
            "load balancing",
            Duration::from_secs(300),
        );
        assert_eq!(handoff.status, HandoffStatus::Pending);
        assert!(handoff.expires_at > handoff.timestamp);
        assert!(!handoff.is_past_deadline());
    }

    #[test]
    fn test_resolved_statuses() {
        assert!(!HandoffStatus::Pending.is_resolved());
        assert!(HandoffStatus::Accepted.is_resolved());
        assert!(HandoffStatus::Rejected.is_resolved());
        assert!(HandoffStatus::Expired.is_resolved());
    }

    #[test]
    fn test_zero_timeout_is_immediately_past_deadline() {
        let task = Task::new("t", "d", TaskPriority::Low, "a");
        let handoff = TaskHandoff::new(
            "a",
            "b",
            HandoffPayload::new(task, serde_json::json!({})),
            "r",
            Duration::ZERO,
        );
        assert!(handoff.is_past_deadline());
    }
}
