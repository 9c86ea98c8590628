//! Transport error types.

use thiserror::Error;

/// Errors that can occur with the transport client.
#[derive(Error, Debug)]
pub enum TransportError {
    /// No live connection; check again after a `Connected` event
    #[error("not connected")]
    NotConnected,

    /// An envelope could not be serialized for the wire
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The outbound queue is gone; the client was shut down
    #[error("client closed")]
    Closed,
}
