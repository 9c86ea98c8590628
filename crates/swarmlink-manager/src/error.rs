//! Manager error types.

use std::time::Duration;

use thiserror::Error;

use swarmlink_broker::BrokerError;
use swarmlink_storage::StorageError;

/// Errors surfaced to agents.
///
/// The manager is the only layer that adds caller context (which agent,
/// which operation); broker and store errors pass through it unmodified.
#[derive(Error, Debug)]
pub enum ManagerError {
    /// Broker-level failure, forwarded untranslated
    #[error(transparent)]
    Broker(#[from] BrokerError),

    /// Store-level failure on a manager-owned operation (rate limiting)
    #[error(transparent)]
    Store(#[from] StorageError),

    /// An operation named an agent this manager instance does not know
    #[error("agent {agent_id} is not registered")]
    AgentNotRegistered {
        /// The unknown agent
        agent_id: String,
    },

    /// The agent exhausted its rate-limit window
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the window resets
        retry_after: Duration,
    },
}
