//! Communication manager implementation.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};

use swarmlink_broker::{BrokerError, KeyPatterns, MessageBroker};
use swarmlink_core::{
    BroadcastKind, BroadcastMessage, HandoffPayload, MessageKind, RateLimitConfig, Task,
};
use swarmlink_storage::{HealthStatus, StoreClient};

use crate::{error::ManagerError, events::ManagerEvent};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A registered agent, process-local only.
#[derive(Debug, Clone)]
pub struct AgentRegistration {
    /// The agent's ID
    pub agent_id: String,
    /// When it registered with this manager instance
    pub registered_at: DateTime<Utc>,
}

/// Read-only aggregate over the manager's state.
#[derive(Debug, Clone)]
pub struct Statistics {
    /// Agents currently registered with this instance
    pub active_agents: usize,
    /// Handoffs this instance initiated that have not been observed as
    /// resolved
    pub active_handoffs: usize,
    /// Messages sent through this instance
    pub messages_sent: u64,
    /// Current broker/store health
    pub system_health: HealthStatus,
}

/// The agent-facing facade over the broker.
///
/// Safe for many concurrent agents within one process: the registry is a
/// [`DashMap`] (per-entry locking) and the counters are atomics, so
/// unrelated agents' operations never contend on a single global lock.
pub struct CommunicationManager<S: StoreClient> {
    broker: Arc<MessageBroker<S>>,
    store: Arc<S>,
    rate_limit: RateLimitConfig,
    registry: DashMap<String, AgentRegistration>,
    events: broadcast::Sender<ManagerEvent>,
    pending_handoffs: AtomicI64,
    messages_sent: AtomicU64,
}

impl<S: StoreClient> CommunicationManager<S> {
    /// Create a manager delegating to `broker`, with rate-limit counters in
    /// `store`.
    #[must_use]
    pub fn new(broker: Arc<MessageBroker<S>>, store: Arc<S>, rate_limit: RateLimitConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            broker,
            store,
            rate_limit,
            registry: DashMap::new(),
            events,
            pending_handoffs: AtomicI64::new(0),
            messages_sent: AtomicU64::new(0),
        }
    }

    /// Observe registration events. Each receiver sees events sent after it
    /// subscribed.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<ManagerEvent> {
        self.events.subscribe()
    }

    /// Register an agent. Idempotent: re-registering an already-known id
    /// leaves exactly one entry and emits no second event.
    pub fn register_agent(&self, agent_id: impl Into<String>) {
        let agent_id = agent_id.into();
        let mut fresh = false;

        self.registry.entry(agent_id.clone()).or_insert_with(|| {
            fresh = true;
            AgentRegistration {
                agent_id: agent_id.clone(),
                registered_at: Utc::now(),
            }
        });

        if fresh {
            info!(agent_id = %agent_id, "Agent registered");
            let _ = self.events.send(ManagerEvent::AgentRegistered { agent_id });
        }
    }

    /// Unregister an agent. Unknown ids are a no-op.
    pub fn unregister_agent(&self, agent_id: &str) {
        if self.registry.remove(agent_id).is_some() {
            info!(agent_id = %agent_id, "Agent unregistered");
            let _ = self.events.send(ManagerEvent::AgentUnregistered {
                agent_id: agent_id.to_string(),
            });
        }
    }

    /// Whether an agent is registered with this instance.
    #[must_use]
    pub fn is_registered(&self, agent_id: &str) -> bool {
        self.registry.contains_key(agent_id)
    }

    /// Snapshot of the current registrations.
    #[must_use]
    pub fn registered_agents(&self) -> Vec<AgentRegistration> {
        self.registry.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Send a direct message from one registered agent to another.
    ///
    /// # Errors
    ///
    /// [`ManagerError::AgentNotRegistered`] naming whichever party is
    /// unknown, [`ManagerError::RateLimited`] before any broker call, or
    /// the broker's error untranslated.
    #[instrument(skip(self, content))]
    pub async fn send_message(
        &self,
        from: &str,
        to: &str,
        content: Value,
    ) -> Result<String, ManagerError> {
        self.ensure_registered(from)?;
        self.ensure_registered(to)?;
        self.check_rate_limit(from, "send_message").await?;

        let message = self
            .broker
            .send_message(from, to, content, MessageKind::Direct)
            .await?;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(message.id)
    }

    /// Broadcast on a named channel. Channels have no registration concept,
    /// so only `from` is checked.
    ///
    /// # Errors
    ///
    /// Same taxonomy as [`Self::send_message`].
    #[instrument(skip(self, content))]
    pub async fn broadcast(
        &self,
        from: &str,
        channel: &str,
        content: Value,
    ) -> Result<BroadcastMessage, ManagerError> {
        self.ensure_registered(from)?;
        self.check_rate_limit(from, "broadcast").await?;

        let message = self
            .broker
            .broadcast(from, channel, content, BroadcastKind::Announcement)
            .await?;
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
        Ok(message)
    }

    /// Propose handing a task off to another registered agent. Returns the
    /// handoff id.
    ///
    /// # Errors
    ///
    /// Registration and rate-limit errors as for [`Self::send_message`],
    /// plus the broker's handoff errors untranslated.
    #[instrument(skip(self, task, context, reason))]
    pub async fn handoff_task(
        &self,
        from: &str,
        to: &str,
        task: Task,
        context: Value,
        reason: &str,
    ) -> Result<String, ManagerError> {
        self.ensure_registered(from)?;
        self.ensure_registered(to)?;
        self.check_rate_limit(from, "handoff_task").await?;

        let handoff = self
            .broker
            .initiate_handoff(from, to, HandoffPayload::new(task, context), reason)
            .await?;
        self.pending_handoffs.fetch_add(1, Ordering::Relaxed);
        Ok(handoff.id)
    }

    /// Answer a pending handoff addressed to `responder`.
    ///
    /// # Errors
    ///
    /// Registration and rate-limit errors as for [`Self::send_message`],
    /// plus the broker's handoff errors untranslated.
    #[instrument(skip(self, reason))]
    pub async fn respond_to_handoff(
        &self,
        handoff_id: &str,
        responder: &str,
        accept: bool,
        reason: &str,
    ) -> Result<(), ManagerError> {
        self.ensure_registered(responder)?;
        self.check_rate_limit(responder, "respond_to_handoff").await?;

        let result = self
            .broker
            .respond_to_handoff(handoff_id, responder, accept, reason)
            .await;

        // Both a response and an observed expiry resolve the handoff for
        // accounting purposes.
        match &result {
            Ok(_) | Err(BrokerError::HandoffExpired { .. }) => {
                self.pending_handoffs.fetch_sub(1, Ordering::Relaxed);
            }
            Err(_) => {}
        }

        result?;
        Ok(())
    }

    /// Read-only aggregate of registry size, outstanding handoffs and
    /// broker health. Never mutates state.
    pub async fn statistics(&self) -> Statistics {
        let health = self.broker.health_check().await;
        Statistics {
            active_agents: self.registry.len(),
            active_handoffs: self.pending_handoffs.load(Ordering::Relaxed).max(0) as usize,
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            system_health: health.status,
        }
    }

    fn ensure_registered(&self, agent_id: &str) -> Result<(), ManagerError> {
        if self.registry.contains_key(agent_id) {
            Ok(())
        } else {
            Err(ManagerError::AgentNotRegistered {
                agent_id: agent_id.to_string(),
            })
        }
    }

    /// Fixed-window rate limit backed by the store, so the limit holds
    /// across every process sharing it. Fails before any broker call.
    async fn check_rate_limit(&self, agent_id: &str, operation: &str) -> Result<(), ManagerError> {
        let window_secs = self.rate_limit.window.as_secs().max(1);
        let now = Utc::now().timestamp() as u64;
        let bucket = now / window_secs;

        let key = KeyPatterns::rate_limit(agent_id, operation, bucket);
        let count = self
            .store
            .increment_with_expiry(&key, self.rate_limit.window)
            .await?;

        if count > self.rate_limit.max_operations {
            let retry_after = Duration::from_secs(window_secs - (now % window_secs));
            debug!(agent_id = %agent_id, operation = %operation, count = %count, "Rate limited");
            return Err(ManagerError::RateLimited { retry_after });
        }
        Ok(())
    }
}
