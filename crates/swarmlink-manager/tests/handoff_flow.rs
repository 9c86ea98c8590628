//! End-to-end flow: registration, messaging and a full handoff lifecycle
//! over the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;

use swarmlink_broker::{BrokerError, MessageBroker};
use swarmlink_core::{BrokerConfig, HandoffStatus, RateLimitConfig, Task, TaskPriority};
use swarmlink_manager::{CommunicationManager, ManagerError};
use swarmlink_storage::MemoryStore;

fn stack(
    broker_config: BrokerConfig,
) -> (
    Arc<MemoryStore>,
    Arc<MessageBroker<MemoryStore>>,
    CommunicationManager<MemoryStore>,
) {
    let store = Arc::new(MemoryStore::new());
    let broker = Arc::new(MessageBroker::new(store.clone(), broker_config));
    let manager =
        CommunicationManager::new(broker.clone(), store.clone(), RateLimitConfig::default());
    (store, broker, manager)
}

#[tokio::test]
async fn direct_message_reaches_subscriber_with_generated_id() {
    let (_, broker, manager) = stack(BrokerConfig::default());
    manager.register_agent("agent-1");
    manager.register_agent("agent-2");

    let (tx, mut rx) = mpsc::unbounded_channel();
    broker
        .subscribe_to_messages("agent-2", move |msg| {
            let _ = tx.send(msg);
        })
        .await
        .unwrap();

    manager
        .send_message("agent-1", "agent-2", json!("hi"))
        .await
        .unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.content, json!("hi"));
    assert!(!received.id.is_empty());
    assert_eq!(received.from, "agent-1");
}

#[tokio::test]
async fn handoff_lifecycle_accept_then_stale_response() {
    let (_, broker, manager) = stack(BrokerConfig::default());
    manager.register_agent("agent-1");
    manager.register_agent("agent-2");

    let task = Task::new("migrate", "move the data", TaskPriority::High, "agent-1");
    let task_id = task.id.clone();

    let handoff_id = manager
        .handoff_task("agent-1", "agent-2", task, json!({}), "load balancing")
        .await
        .unwrap();

    manager
        .respond_to_handoff(&handoff_id, "agent-2", true, "ok")
        .await
        .unwrap();

    // The responder now owns the task in its handoff history.
    let history = broker.handoff_history("agent-2", 10).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HandoffStatus::Accepted);
    assert_eq!(history[0].payload.task.id, task_id);

    // A second response is stale.
    let err = manager
        .respond_to_handoff(&handoff_id, "agent-2", true, "ok")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Broker(BrokerError::HandoffNotPending { .. })
    ));
}

#[tokio::test]
async fn handoff_expires_when_unanswered() {
    let (_, _, manager) = stack(
        BrokerConfig::default().with_handoff_timeout(Duration::from_millis(100)),
    );
    manager.register_agent("agent-1");
    manager.register_agent("agent-2");

    let task = Task::new("t", "d", TaskPriority::Normal, "agent-1");
    let handoff_id = manager
        .handoff_task("agent-1", "agent-2", task, json!({}), "r")
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;

    let err = manager
        .respond_to_handoff(&handoff_id, "agent-2", true, "too late")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Broker(BrokerError::HandoffExpired { .. })
    ));
}
