//! In-memory store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use crate::{
    error::StorageError,
    traits::{HealthStatus, MessageHandler, StoreClient, StoreHealth},
};

#[derive(Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

struct Lock {
    token: String,
    expires_at: Instant,
}

/// In-process store implementing the same five primitives as [`RedisStore`],
/// including real TTL behaviour, so broker and manager tests run without a
/// live dependency.
///
/// Starts connected; [`StoreClient::disconnect`] flips every subsequent
/// operation to [`StorageError::Unavailable`], which makes store-outage
/// paths testable.
pub struct MemoryStore {
    connected: AtomicBool,
    entries: Mutex<HashMap<String, Entry>>,
    locks: Mutex<HashMap<String, Lock>>,
    subscribers: Mutex<HashMap<String, MessageHandler>>,
}

impl MemoryStore {
    /// Create a connected store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            entries: Mutex::new(HashMap::new()),
            locks: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    fn ensure_connected(&self) -> Result<(), StorageError> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable("not connected".to_string()))
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn connect(&self) -> Result<(), StorageError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        self.connected.store(false, Ordering::SeqCst);
        self.subscribers.lock().await.clear();
        Ok(())
    }

    async fn publish(&self, channel: &str, value: &Value) -> Result<(), StorageError> {
        self.ensure_connected()?;
        let subscribers = self.subscribers.lock().await;
        if let Some(handler) = subscribers.get(channel) {
            handler(value.clone());
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> Result<(), StorageError> {
        self.ensure_connected()?;
        self.subscribers
            .lock()
            .await
            .insert(channel.to_string(), handler);
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StorageError> {
        self.subscribers.lock().await.remove(channel);
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.ensure_connected()?;
        self.entries.lock().await.insert(
            key.to_string(),
            Entry {
                value: value.clone(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        self.ensure_connected()?;
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.is_expired() => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.ensure_connected()?;
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, StorageError> {
        self.ensure_connected()?;
        let mut entries = self.entries.lock().await;

        let count = match entries.get(key) {
            Some(entry) if !entry.is_expired() => entry.value.as_u64().unwrap_or(0) + 1,
            _ => 1,
        };
        let expires_at = if count == 1 {
            Some(Instant::now() + window)
        } else {
            entries.get(key).and_then(|e| e.expires_at)
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::from(count),
                expires_at,
            },
        );
        Ok(count)
    }

    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        self.ensure_connected()?;
        let mut locks = self.locks.lock().await;

        if let Some(lock) = locks.get(key) {
            if Instant::now() < lock.expires_at {
                return Ok(None);
            }
        }

        let token = Uuid::new_v4().to_string();
        locks.insert(
            key.to_string(),
            Lock {
                token: token.clone(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StorageError> {
        self.ensure_connected()?;
        let mut locks = self.locks.lock().await;

        match locks.get(key) {
            Some(lock) if lock.token == token => {
                locks.remove(key);
                Ok(true)
            }
            Some(_) => {
                warn!(key = %key, "Lock release with stale token");
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn health_check(&self) -> StoreHealth {
        StoreHealth {
            status: if self.connected.load(Ordering::SeqCst) {
                HealthStatus::Healthy
            } else {
                HealthStatus::Unhealthy
            },
            latency_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_with_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set_with_expiry(
                "k",
                &serde_json::json!(42),
                Some(Duration::from_millis(30)),
            )
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(serde_json::json!(42)));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_increment_counts_within_window() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 1);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 2);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_increment_resets_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(30);
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 1);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.increment_with_expiry("c", window).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_lock_holder_only_release() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(5);

        let token = store.acquire_lock("l", ttl).await.unwrap().unwrap();
        assert!(store.acquire_lock("l", ttl).await.unwrap().is_none());

        assert!(!store.release_lock("l", "stale").await.unwrap());
        assert!(store.release_lock("l", &token).await.unwrap());
        assert!(store.acquire_lock("l", ttl).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_expired_lock_can_be_retaken() {
        let store = MemoryStore::new();
        store
            .acquire_lock("l", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store
            .acquire_lock("l", Duration::from_secs(5))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_publish_reaches_subscriber() {
        let store = MemoryStore::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        store
            .subscribe(
                "ch",
                Arc::new(move |value| {
                    let _ = tx.send(value);
                }),
            )
            .await
            .unwrap();

        store.publish("ch", &serde_json::json!("hi")).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), serde_json::json!("hi"));
    }

    #[tokio::test]
    async fn test_operations_fail_after_disconnect() {
        let store = MemoryStore::new();
        store.disconnect().await.unwrap();

        let err = store.get("k").await.unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
        assert!(!store.health_check().await.is_healthy());

        // disconnect is idempotent and never errors
        store.disconnect().await.unwrap();
    }
}
