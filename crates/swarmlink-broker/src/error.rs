//! Broker error types.

use thiserror::Error;

use swarmlink_core::HandoffStatus;
use swarmlink_storage::StorageError;

/// Errors that can occur with broker operations.
///
/// Store errors pass through unmodified; adding caller context is the
/// manager's job.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Store-level failure, forwarded untranslated
    #[error(transparent)]
    Store(#[from] StorageError),

    /// A handoff is already pending for the task
    #[error("a handoff is already pending for task {task_id}")]
    HandoffConflict {
        /// Task with the outstanding handoff
        task_id: String,
    },

    /// The handoff's expiry deadline has elapsed (or its record has already
    /// been evicted by the store's TTL)
    #[error("handoff {handoff_id} has expired")]
    HandoffExpired {
        /// The stale handoff
        handoff_id: String,
    },

    /// The handoff was already resolved
    #[error("handoff {handoff_id} is not pending (status: {status})")]
    HandoffNotPending {
        /// The resolved handoff
        handoff_id: String,
        /// Its current status
        status: HandoffStatus,
    },

    /// The responder is not the handoff's target
    #[error("handoff {handoff_id} is not addressed to {responder}")]
    HandoffNotAddressed {
        /// The handoff being answered
        handoff_id: String,
        /// Who tried to answer it
        responder: String,
    },
}
