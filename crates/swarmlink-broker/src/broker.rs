//! Message broker implementation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use swarmlink_core::{
    AgentEvent, AgentMessage, BroadcastKind, BroadcastMessage, BrokerConfig, EventKind,
    HandoffPayload, HandoffStatus, MessageKind, TaskHandoff,
};
use swarmlink_storage::{StorageError, StoreClient, StoreHealth};

use crate::{
    error::BrokerError,
    patterns::{ChannelPatterns, KeyPatterns},
};

/// Guards the check-then-create window during handoff initiation; the
/// handoff's own pending marker takes over once it exists.
const HANDOFF_LOCK_TTL: Duration = Duration::from_secs(10);

/// Message broker over a shared key/value + pub/sub store.
///
/// One broker instance may serve many concurrent callers; there is no
/// broker-wide lock. Handoff initiation is serialized per task through a
/// distributed lock, nothing else is serialized at all.
pub struct MessageBroker<S: StoreClient> {
    store: Arc<S>,
    config: BrokerConfig,
}

impl<S: StoreClient> MessageBroker<S> {
    /// Create a broker on top of a store client.
    #[must_use]
    pub fn new(store: Arc<S>, config: BrokerConfig) -> Self {
        Self { store, config }
    }

    /// Send a direct message to an agent's private channel and record it in
    /// the recipient's bounded history.
    ///
    /// Publishes first: a publish failure returns before anything is
    /// persisted. A history failure after a successful publish is still an
    /// error; the message was delivered but not recorded.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated on publish or append failure.
    #[instrument(skip(self, content))]
    pub async fn send_message(
        &self,
        from: &str,
        to: &str,
        content: Value,
        kind: MessageKind,
    ) -> Result<AgentMessage, BrokerError> {
        let message = AgentMessage::new(from, to, content, kind);
        let value = to_value(&message)?;

        self.store
            .publish(&ChannelPatterns::agent_messages(to), &value)
            .await?;
        self.push_history(&KeyPatterns::message_history(to), value)
            .await?;

        debug!(message_id = %message.id, to = %to, "Message sent");
        Ok(message)
    }

    /// Publish a broadcast on a named channel.
    ///
    /// Fire-and-forget: nothing is persisted and subscribers that connect
    /// later never see it.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated on publish failure.
    #[instrument(skip(self, content))]
    pub async fn broadcast(
        &self,
        from: &str,
        channel: &str,
        content: Value,
        kind: BroadcastKind,
    ) -> Result<BroadcastMessage, BrokerError> {
        let message = BroadcastMessage::new(from, channel, content, kind);

        self.store
            .publish(&ChannelPatterns::broadcast(channel), &to_value(&message)?)
            .await?;

        debug!(message_id = %message.id, channel = %channel, "Broadcast sent");
        Ok(message)
    }

    /// Propose transferring a task to another agent.
    ///
    /// At most one handoff may be pending per task; a concurrent or
    /// outstanding initiation fails with [`BrokerError::HandoffConflict`].
    /// The record is stored with a TTL equal to the handoff timeout, so the
    /// store's own eviction is the primary expiry mechanism.
    ///
    /// # Errors
    ///
    /// [`BrokerError::HandoffConflict`] when a handoff is already pending
    /// for the task, or the store's error untranslated.
    #[instrument(skip(self, payload, reason), fields(task_id = %payload.task.id))]
    pub async fn initiate_handoff(
        &self,
        from: &str,
        to: &str,
        payload: HandoffPayload,
        reason: impl Into<String>,
    ) -> Result<TaskHandoff, BrokerError> {
        let task_id = payload.task.id.clone();
        let lock_key = KeyPatterns::handoff_lock(&task_id);

        let token = self
            .store
            .acquire_lock(&lock_key, HANDOFF_LOCK_TTL)
            .await?
            .ok_or_else(|| BrokerError::HandoffConflict {
                task_id: task_id.clone(),
            })?;

        let result = self
            .initiate_locked(from, to, payload, reason.into(), &task_id)
            .await;

        // The lock self-expires if this fails.
        if let Err(e) = self.store.release_lock(&lock_key, &token).await {
            warn!(task_id = %task_id, error = %e, "Handoff lock release failed");
        }
        result
    }

    async fn initiate_locked(
        &self,
        from: &str,
        to: &str,
        payload: HandoffPayload,
        reason: String,
        task_id: &str,
    ) -> Result<TaskHandoff, BrokerError> {
        let pending_key = KeyPatterns::pending_handoff(task_id);
        if self.store.get(&pending_key).await?.is_some() {
            return Err(BrokerError::HandoffConflict {
                task_id: task_id.to_string(),
            });
        }

        let handoff = TaskHandoff::new(from, to, payload, reason, self.config.handoff_timeout);
        let value = to_value(&handoff)?;

        self.store
            .set_with_expiry(
                &KeyPatterns::handoff(&handoff.id),
                &value,
                Some(self.config.handoff_timeout),
            )
            .await?;
        self.store
            .set_with_expiry(
                &pending_key,
                &json!(handoff.id),
                Some(self.config.handoff_timeout),
            )
            .await?;

        self.push_history(&KeyPatterns::handoff_history(from), value.clone())
            .await?;
        self.push_history(&KeyPatterns::handoff_history(to), value.clone())
            .await?;

        let notification = AgentMessage::new(
            from,
            to,
            json!({ "handoff_request": value }),
            MessageKind::System,
        );
        self.store
            .publish(&ChannelPatterns::agent_messages(to), &to_value(&notification)?)
            .await?;

        info!(handoff_id = %handoff.id, from = %from, to = %to, "Handoff initiated");
        Ok(handoff)
    }

    /// Accept or reject a pending handoff.
    ///
    /// On accept the task's owner becomes the responder and the updated
    /// task is persisted for the retention window. Either way the initiator
    /// is notified on its private channel.
    ///
    /// # Errors
    ///
    /// [`BrokerError::HandoffExpired`] when the record is gone (TTL
    /// eviction) or its deadline has elapsed,
    /// [`BrokerError::HandoffNotAddressed`] when `responder` is not the
    /// target, [`BrokerError::HandoffNotPending`] when already resolved, or
    /// the store's error untranslated.
    #[instrument(skip(self, reason))]
    pub async fn respond_to_handoff(
        &self,
        handoff_id: &str,
        responder: &str,
        accept: bool,
        reason: impl Into<String>,
    ) -> Result<TaskHandoff, BrokerError> {
        let key = KeyPatterns::handoff(handoff_id);

        // A missing record is indistinguishable from one the TTL evicted.
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| BrokerError::HandoffExpired {
                handoff_id: handoff_id.to_string(),
            })?;
        let mut handoff: TaskHandoff = from_value(value)?;

        if handoff.to != responder {
            return Err(BrokerError::HandoffNotAddressed {
                handoff_id: handoff_id.to_string(),
                responder: responder.to_string(),
            });
        }
        match handoff.status {
            HandoffStatus::Pending if handoff.is_past_deadline() => {
                return Err(BrokerError::HandoffExpired {
                    handoff_id: handoff_id.to_string(),
                });
            }
            HandoffStatus::Pending => {}
            status => {
                return Err(BrokerError::HandoffNotPending {
                    handoff_id: handoff_id.to_string(),
                    status,
                });
            }
        }

        handoff.status = if accept {
            HandoffStatus::Accepted
        } else {
            HandoffStatus::Rejected
        };

        if accept {
            let task = &mut handoff.payload.task;
            task.owner = responder.to_string();
            task.updated_at = chrono::Utc::now();
            self.store
                .set_with_expiry(
                    &KeyPatterns::task(&task.id),
                    &to_value(task)?,
                    Some(self.config.retention),
                )
                .await?;
        }

        self.store
            .set_with_expiry(&key, &to_value(&handoff)?, Some(self.config.retention))
            .await?;
        self.store
            .delete(&KeyPatterns::pending_handoff(&handoff.payload.task.id))
            .await?;

        self.update_history_status(&handoff.from, handoff_id, handoff.status)
            .await?;
        self.update_history_status(&handoff.to, handoff_id, handoff.status)
            .await?;

        let reason = reason.into();
        let notification = AgentMessage::new(
            &handoff.to,
            &handoff.from,
            json!({
                "handoff_response": {
                    "handoff_id": handoff_id,
                    "accepted": accept,
                    "reason": reason,
                }
            }),
            MessageKind::System,
        );
        self.store
            .publish(
                &ChannelPatterns::agent_messages(&handoff.from),
                &to_value(&notification)?,
            )
            .await?;

        info!(handoff_id = %handoff_id, accepted = %accept, "Handoff resolved");
        Ok(handoff)
    }

    /// Publish a lifecycle event on the well-known events channel.
    ///
    /// Purely live: only current subscribers observe it.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated on publish failure.
    pub async fn publish_event(
        &self,
        agent_id: &str,
        kind: EventKind,
        data: Value,
        source: &str,
    ) -> Result<AgentEvent, BrokerError> {
        let event = AgentEvent::new(agent_id, kind, data, source);
        self.store
            .publish(ChannelPatterns::events(), &to_value(&event)?)
            .await?;
        Ok(event)
    }

    /// Message history for an agent, newest first, at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn message_history(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, BrokerError> {
        let entries = self
            .read_history(&KeyPatterns::message_history(agent_id))
            .await?;

        let mut messages = Vec::new();
        for entry in entries.into_iter().take(limit) {
            match serde_json::from_value::<AgentMessage>(entry) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(agent_id = %agent_id, error = %e, "Corrupt history entry skipped"),
            }
        }
        Ok(messages)
    }

    /// Handoff history for an agent, newest first, at most `limit` entries.
    ///
    /// Records whose deadline elapsed while still stored as `pending` are
    /// reconciled to `expired` before being returned; the store's TTL
    /// eviction remains the primary expiry mechanism.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn handoff_history(
        &self,
        agent_id: &str,
        limit: usize,
    ) -> Result<Vec<TaskHandoff>, BrokerError> {
        let entries = self
            .read_history(&KeyPatterns::handoff_history(agent_id))
            .await?;

        let mut handoffs = Vec::new();
        for entry in entries.into_iter().take(limit) {
            match serde_json::from_value::<TaskHandoff>(entry) {
                Ok(mut handoff) => {
                    if handoff.status == HandoffStatus::Pending && handoff.is_past_deadline() {
                        handoff.status = HandoffStatus::Expired;
                    }
                    handoffs.push(handoff);
                }
                Err(e) => warn!(agent_id = %agent_id, error = %e, "Corrupt history entry skipped"),
            }
        }
        Ok(handoffs)
    }

    /// Subscribe to an agent's private channel.
    ///
    /// Malformed payloads are logged and dropped before reaching `handler`.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn subscribe_to_messages(
        &self,
        agent_id: &str,
        handler: impl Fn(AgentMessage) + Send + Sync + 'static,
    ) -> Result<(), BrokerError> {
        self.store
            .subscribe(
                &ChannelPatterns::agent_messages(agent_id),
                typed_handler(handler),
            )
            .await?;
        Ok(())
    }

    /// Subscribe to a broadcast channel.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn subscribe_to_broadcast(
        &self,
        channel: &str,
        handler: impl Fn(BroadcastMessage) + Send + Sync + 'static,
    ) -> Result<(), BrokerError> {
        self.store
            .subscribe(&ChannelPatterns::broadcast(channel), typed_handler(handler))
            .await?;
        Ok(())
    }

    /// Subscribe to the lifecycle events channel.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn subscribe_to_events(
        &self,
        handler: impl Fn(AgentEvent) + Send + Sync + 'static,
    ) -> Result<(), BrokerError> {
        self.store
            .subscribe(ChannelPatterns::events(), typed_handler(handler))
            .await?;
        Ok(())
    }

    /// Drop the subscription on an agent's private channel.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn unsubscribe_from_messages(&self, agent_id: &str) -> Result<(), BrokerError> {
        self.store
            .unsubscribe(&ChannelPatterns::agent_messages(agent_id))
            .await?;
        Ok(())
    }

    /// Drop the subscription on a broadcast channel.
    ///
    /// # Errors
    ///
    /// Returns the store's error untranslated.
    pub async fn unsubscribe_from_broadcast(&self, channel: &str) -> Result<(), BrokerError> {
        self.store
            .unsubscribe(&ChannelPatterns::broadcast(channel))
            .await?;
        Ok(())
    }

    /// Broker liveness: healthy exactly when the store is reachable.
    pub async fn health_check(&self) -> StoreHealth {
        self.store.health_check().await
    }

    async fn read_history(&self, key: &str) -> Result<Vec<Value>, BrokerError> {
        match self.store.get(key).await? {
            Some(Value::Array(entries)) => Ok(entries),
            Some(_) => {
                warn!(key = %key, "History key holds a non-list value");
                Ok(vec![])
            }
            None => Ok(vec![]),
        }
    }

    /// Prepend an entry and trim to the history cap; trimming is a side
    /// effect of every write, never a separate pass.
    async fn push_history(&self, key: &str, entry: Value) -> Result<(), BrokerError> {
        let mut entries = self.read_history(key).await?;
        entries.insert(0, entry);
        entries.truncate(self.config.history_limit);
        self.store
            .set_with_expiry(key, &Value::Array(entries), Some(self.config.retention))
            .await?;
        Ok(())
    }

    async fn update_history_status(
        &self,
        agent_id: &str,
        handoff_id: &str,
        status: HandoffStatus,
    ) -> Result<(), BrokerError> {
        let key = KeyPatterns::handoff_history(agent_id);
        let mut entries = self.read_history(&key).await?;
        let mut changed = false;

        for entry in &mut entries {
            if entry.get("id").and_then(Value::as_str) == Some(handoff_id) {
                entry["status"] = to_value(&status)?;
                changed = true;
            }
        }
        if changed {
            self.store
                .set_with_expiry(&key, &Value::Array(entries), Some(self.config.retention))
                .await?;
        }
        Ok(())
    }
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, StorageError> {
    serde_json::to_value(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn from_value<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, StorageError> {
    serde_json::from_value(value).map_err(|e| StorageError::Deserialization(e.to_string()))
}

fn typed_handler<T: serde::de::DeserializeOwned>(
    handler: impl Fn(T) + Send + Sync + 'static,
) -> swarmlink_storage::MessageHandler {
    Arc::new(move |value| match serde_json::from_value::<T>(value) {
        Ok(message) => handler(message),
        Err(e) => warn!(error = %e, "Malformed payload dropped"),
    })
}
