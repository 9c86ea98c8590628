//! # swarmlink-transport
//!
//! Client-side reconnection controller for the broker transport.
//!
//! Maintains a live WebSocket connection carrying JSON [`Envelope`]s,
//! authenticates first on every (re)connect, and applies exponential
//! backoff with jitter and a bounded retry budget when the connection
//! drops. Transparent to the layers above it: reconnection failures flip
//! observable state instead of surfacing as exceptions to in-flight
//! callers.
//!
//! [`Envelope`]: swarmlink_core::Envelope

mod backoff;
mod client;
mod error;

pub use backoff::backoff_delay;
pub use client::{ConnectionState, ReconnectingClient, TransportEvent};
pub use error::TransportError;
