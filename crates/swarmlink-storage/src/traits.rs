//! Store client trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageError;

/// Callback invoked with each deserialized payload received on a channel.
///
/// Payloads that fail to deserialize are logged and dropped before the
/// handler is ever called.
pub type MessageHandler = Arc<dyn Fn(Value) + Send + Sync>;

/// Liveness of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Result of a health probe.
#[derive(Debug, Clone)]
pub struct StoreHealth {
    /// Probe outcome
    pub status: HealthStatus,
    /// Round-trip latency of the probe
    pub latency_ms: u64,
}

impl StoreHealth {
    /// Whether the store answered the probe.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.status == HealthStatus::Healthy
    }
}

/// A shared key/value + pub/sub store.
///
/// All operations are asynchronous and may suspend on network I/O; none of
/// them retries internally. When the connection is down they fail with
/// [`StorageError::Unavailable`].
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Open the connection. Idempotent.
    async fn connect(&self) -> Result<(), StorageError>;

    /// Close the connection and drop all subscriptions.
    ///
    /// Never fails when called on a client that was not connected.
    async fn disconnect(&self) -> Result<(), StorageError>;

    /// Publish a JSON value on a channel.
    async fn publish(&self, channel: &str, value: &Value) -> Result<(), StorageError>;

    /// Subscribe to a channel.
    ///
    /// At most one subscription per channel per client; subscribing again
    /// replaces the previous handler.
    async fn subscribe(&self, channel: &str, handler: MessageHandler)
        -> Result<(), StorageError>;

    /// Drop the subscription on a channel, if any.
    async fn unsubscribe(&self, channel: &str) -> Result<(), StorageError>;

    /// Store a JSON value, optionally expiring after `ttl`.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>;

    /// Fetch a JSON value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Atomically increment a counter, starting its expiry window on
    /// creation. Returns the post-increment count.
    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, StorageError>;

    /// Try to take a mutual-exclusion lock.
    ///
    /// Returns the holder token, or `None` when the lock is already held.
    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError>;

    /// Release a lock via compare-and-delete; only the holder's token
    /// succeeds. Returns whether the lock was released.
    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StorageError>;

    /// Probe liveness. Bounded by the configured command timeout.
    async fn health_check(&self) -> StoreHealth;
}
