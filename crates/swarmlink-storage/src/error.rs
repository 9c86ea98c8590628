//! Storage error types.

use thiserror::Error;

/// Errors that can occur with store operations.
///
/// Every operation fails with [`StorageError::Unavailable`] when the
/// underlying connection is down; callers decide whether to retry.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store is unreachable or the command failed at the transport level
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A value could not be serialized for storage
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored or received payload could not be deserialized
    #[error("deserialization error: {0}")]
    Deserialization(String),
}
