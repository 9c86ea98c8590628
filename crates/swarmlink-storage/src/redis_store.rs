//! Redis store implementation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use swarmlink_core::StoreConfig;

use crate::{
    error::StorageError,
    traits::{HealthStatus, MessageHandler, StoreClient, StoreHealth},
};

/// Lua compare-and-delete so only the lock holder can release.
const RELEASE_LOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Redis-backed store client.
///
/// Commands run over a shared [`ConnectionManager`]; each subscription runs
/// on its own pub/sub connection in a background task.
pub struct RedisStore {
    config: StoreConfig,
    client: Client,
    conn: RwLock<Option<ConnectionManager>>,
    subscriptions: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl RedisStore {
    /// Create a client for the configured store. Does not connect.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection URL is malformed.
    pub fn new(config: StoreConfig) -> Result<Self, StorageError> {
        let client =
            Client::open(config.url()).map_err(|e| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            config,
            client,
            conn: RwLock::new(None),
            subscriptions: Mutex::new(HashMap::new()),
        })
    }

    /// Create and connect in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect_with(config: StoreConfig) -> Result<Self, StorageError> {
        let store = Self::new(config)?;
        store.connect().await?;
        Ok(store)
    }

    async fn manager(&self) -> Result<ConnectionManager, StorageError> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| StorageError::Unavailable("not connected".to_string()))
    }

    async fn command<T>(
        &self,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T, StorageError> {
        tokio::time::timeout(self.config.command_timeout, fut)
            .await
            .map_err(|_| StorageError::Unavailable("command timed out".to_string()))?
            .map_err(|e| StorageError::Unavailable(e.to_string()))
    }
}

#[async_trait]
impl StoreClient for RedisStore {
    async fn connect(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.write().await;
        if conn.is_some() {
            return Ok(());
        }

        info!(url = %self.config.url(), "Connecting to Redis");

        let manager = ConnectionManager::new(self.client.clone())
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        *conn = Some(manager);

        info!("Connected to Redis");
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.lock().await;
        for (channel, handle) in subscriptions.drain() {
            debug!(channel = %channel, "Dropping subscription");
            handle.abort();
        }

        let mut conn = self.conn.write().await;
        if conn.take().is_some() {
            info!("Disconnected from Redis");
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, value: &Value) -> Result<(), StorageError> {
        let mut conn = self.manager().await?;
        let payload =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;

        debug!(channel = %channel, "Publishing");
        self.command(conn.publish::<_, _, ()>(channel, payload)).await
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: MessageHandler,
    ) -> Result<(), StorageError> {
        {
            let conn = self.conn.read().await;
            if conn.is_none() {
                return Err(StorageError::Unavailable("not connected".to_string()));
            }
        }

        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        debug!(channel = %channel, "Subscribed");

        let channel_name = channel.to_string();
        let handle = tokio::spawn(async move {
            let mut pubsub = pubsub;
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "Unreadable payload dropped");
                        continue;
                    }
                };
                match serde_json::from_str::<Value>(&payload) {
                    Ok(value) => handler(value),
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "Malformed payload dropped");
                    }
                }
            }
        });

        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(previous) = subscriptions.insert(channel.to_string(), handle) {
            previous.abort();
        }
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), StorageError> {
        let mut subscriptions = self.subscriptions.lock().await;
        if let Some(handle) = subscriptions.remove(channel) {
            debug!(channel = %channel, "Unsubscribed");
            handle.abort();
        }
        Ok(())
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut conn = self.manager().await?;
        let payload =
            serde_json::to_string(value).map_err(|e| StorageError::Serialization(e.to_string()))?;

        match ttl {
            Some(ttl) => {
                let secs = ttl.as_secs().max(1);
                self.command(conn.set_ex::<_, _, ()>(key, payload, secs)).await
            }
            None => self.command(conn.set::<_, _, ()>(key, payload)).await,
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let mut conn = self.manager().await?;
        let raw: Option<String> = self.command(conn.get(key)).await?;

        match raw {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| StorageError::Deserialization(e.to_string())),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.manager().await?;
        self.command(conn.del::<_, ()>(key)).await
    }

    async fn increment_with_expiry(
        &self,
        key: &str,
        window: Duration,
    ) -> Result<u64, StorageError> {
        let mut conn = self.manager().await?;
        let count: u64 = self.command(conn.incr(key, 1u64)).await?;

        // First increment created the key; start its window.
        if count == 1 {
            let secs = window.as_secs().max(1) as i64;
            let _: bool = self.command(conn.expire(key, secs)).await?;
        }
        Ok(count)
    }

    async fn acquire_lock(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<String>, StorageError> {
        let mut conn = self.manager().await?;
        let token = Uuid::new_v4().to_string();

        let acquired: Option<String> = self
            .command(
                redis::cmd("SET")
                    .arg(key)
                    .arg(&token)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn),
            )
            .await?;

        Ok(acquired.map(|_| token))
    }

    async fn release_lock(&self, key: &str, token: &str) -> Result<bool, StorageError> {
        let mut conn = self.manager().await?;
        let released: i64 = self
            .command(
                redis::Script::new(RELEASE_LOCK_SCRIPT)
                    .key(key)
                    .arg(token)
                    .invoke_async(&mut conn),
            )
            .await?;

        Ok(released == 1)
    }

    async fn health_check(&self) -> StoreHealth {
        let start = Instant::now();
        let mut conn = match self.manager().await {
            Ok(conn) => conn,
            Err(_) => {
                return StoreHealth {
                    status: HealthStatus::Unhealthy,
                    latency_ms: 0,
                }
            }
        };

        let pong: Result<String, StorageError> =
            self.command(redis::cmd("PING").query_async(&mut conn)).await;

        StoreHealth {
            status: match pong {
                Ok(ref p) if p == "PONG" => HealthStatus::Healthy,
                _ => HealthStatus::Unhealthy,
            },
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }
}

// These tests require a running Redis server
// Run with: docker run -d --name redis -p 6379:6379 redis:latest
