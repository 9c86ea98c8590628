//! # swarmlink-storage
//!
//! Store client for the Swarmlink communication subsystem.
//!
//! Wraps a shared key/value + pub/sub store behind the [`StoreClient`]
//! trait with five primitive groups:
//! - connection lifecycle (`connect`/`disconnect`/`health_check`)
//! - pub/sub (`publish`/`subscribe`/`unsubscribe`)
//! - TTL'd key/value (`set_with_expiry`/`get`/`delete`)
//! - atomic increment-with-expiry (rate-limit counters)
//! - mutual-exclusion locks (`acquire_lock`/`release_lock`, compare-and-delete)
//!
//! No business logic lives here; the broker decides what keys and channels
//! mean. Two implementations ship: [`RedisStore`] against a real Redis and
//! [`MemoryStore`] for tests.

mod error;
mod memory;
mod redis_store;
mod traits;

pub use error::StorageError;
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use traits::{HealthStatus, MessageHandler, StoreClient, StoreHealth};
